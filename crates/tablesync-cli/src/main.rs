//! tablesync CLI - keep Oracle tables in sync, by full replace or by diff.

mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use clap::Parser;
use tablesync::{Config, OracleConnector, Orchestrator, SyncError, SyncJobConfig, SyncMode};
use tracing::info;

#[derive(Parser)]
#[command(name = "tablesync")]
#[command(about = "Synchronize Oracle tables by truncate or diff")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,

    /// Remote (source) table for a one-off sync
    #[arg(short = 'i', long = "input")]
    remote_table: Option<String>,

    /// Local (destination) table for a one-off sync
    #[arg(short = 'o', long = "output")]
    local_table: Option<String>,

    /// Local connection profile for a one-off sync
    #[arg(short = 'l', long = "local-conn", default_value = "pl_db")]
    local_conn: String,

    /// Remote connection profile for a one-off sync
    #[arg(short = 'r', long = "remote-conn", default_value = "prod")]
    remote_conn: String,

    /// Sync method for a one-off sync
    #[arg(short = 'm', long = "method-sync", default_value = "truncate", value_parser = ["truncate", "diff"])]
    method_sync: String,

    /// Only show table differences and DDL, write nothing
    #[arg(short = 's', long = "show-only", default_value = "no", value_parser = ["yes", "no"])]
    show_only: String,

    /// Override General.log_level
    #[arg(long, value_parser = ["CRITICAL", "ERROR", "WARNING", "INFO", "DEBUG"])]
    log_level: Option<String>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();
    let started = Local::now();
    let timer = Instant::now();

    let mut config = Config::load(&cli.config)?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.general.log_level.clone());
    logging::setup_logging(&level, config.general.log_file.as_deref()).map_err(SyncError::Config)?;

    info!(
        "================== the script started working {} ==================",
        started.format("%d/%m/%Y %H:%M")
    );
    info!("Loaded configuration from {:?}", cli.config);

    if let (Some(remote), Some(local)) = (&cli.remote_table, &cli.local_table) {
        let mode: SyncMode = cli.method_sync.parse().map_err(SyncError::Config)?;
        let job = SyncJobConfig::manual(&cli.local_conn, &cli.remote_conn, mode, local, remote);
        config = config.with_manual_job("manual_sync", job)?;
        info!("Manual sync {} <- {} ({})", local, remote, mode);
    }

    let show_only = cli.show_only == "yes";
    let orchestrator =
        Orchestrator::new(config, Arc::new(OracleConnector::new())).show_only(show_only);
    let report = orchestrator.run().await?;

    if cli.output_json {
        println!("{}", report.to_json()?);
    } else {
        let status_msg = if show_only { "Show-only run completed!" } else { "Sync completed!" };
        println!("\n{}", status_msg);
        println!("  Run ID: {}", report.run_id);
        println!("  Duration: {:.2}s", report.duration_seconds);
        println!("  Tables: {}/{}", report.tables_success, report.tables_total);
        println!("  Rows: {}", report.rows_written);
        for table in report.tables.iter().filter(|t| t.only_in_remote.is_some()) {
            println!(
                "  {}: total lines {}, only in remote {}",
                table.local_table,
                table.total_lines.unwrap_or_default(),
                table.only_in_remote.unwrap_or_default()
            );
        }
        let failed = report.failed_tables();
        if !failed.is_empty() {
            println!("  Failed tables: {:?}", failed);
        }
    }

    info!(
        "================== The script execution time was: {:.2?} ==================",
        timer.elapsed()
    );
    Ok(())
}
