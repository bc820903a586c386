//! Logging setup: stdout plus an optional append-only log file.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Map a level name to a filter. CRITICAL has no tracing equivalent and maps to ERROR.
pub fn parse_level(name: &str) -> Result<LevelFilter, String> {
    match name.to_uppercase().as_str() {
        "CRITICAL" | "ERROR" => Ok(LevelFilter::ERROR),
        "WARNING" | "WARN" => Ok(LevelFilter::WARN),
        "INFO" => Ok(LevelFilter::INFO),
        "DEBUG" => Ok(LevelFilter::DEBUG),
        other => Err(format!("Invalid log level: {}", other)),
    }
}

/// Install the global subscriber.
pub fn setup_logging(level: &str, log_file: Option<&Path>) -> Result<(), String> {
    let level = parse_level(level)?;

    let mut filter = EnvFilter::new(level.to_string());
    if level != LevelFilter::DEBUG {
        let quiet = "oracle=warn".parse().map_err(|e| format!("{}", e))?;
        filter = filter.add_directive(quiet);
    }

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Cannot open log file {}: {}", path.display(), e))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_names() {
        assert_eq!(parse_level("CRITICAL").unwrap(), LevelFilter::ERROR);
        assert_eq!(parse_level("WARNING").unwrap(), LevelFilter::WARN);
        assert_eq!(parse_level("info").unwrap(), LevelFilter::INFO);
        assert_eq!(parse_level("DEBUG").unwrap(), LevelFilter::DEBUG);
        assert!(parse_level("LOUD").is_err());
    }
}
