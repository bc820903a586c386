//! Configuration validation.

use super::Config;
use crate::error::{Result, SyncError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // General validation - only check if explicitly set
    if let Some(0) = config.general.page_size {
        return Err(SyncError::Config(
            "General.page_size must be at least 1".into(),
        ));
    }
    if let Some(0) = config.general.batch_size {
        return Err(SyncError::Config(
            "General.batch_size must be at least 1".into(),
        ));
    }

    // Link profiles must point at an existing profile
    for (name, profile) in &config.connections {
        if let Some(via) = &profile.avail_from {
            if !config.connections.contains_key(via) {
                return Err(SyncError::Config(format!(
                    "Connections.{}.avail_from references unknown profile '{}'",
                    name, via
                )));
            }
        }
    }

    for entry in &config.sync {
        let job = &entry.job;
        for (field, profile) in [("local_db", &job.local_db), ("remote_db", &job.remote_db)] {
            if !config.connections.contains_key(profile) {
                return Err(SyncError::Config(format!(
                    "Sync.{}.{} references unknown profile '{}'",
                    entry.name, field, profile
                )));
            }
        }

        if job.tables.is_empty() {
            return Err(SyncError::Config(format!(
                "Sync.{}.tables must list at least one table",
                entry.name
            )));
        }

        if let Some(0) = job.rotate {
            return Err(SyncError::Config(format!(
                "Sync.{}.rotate must be at least 1 day",
                entry.name
            )));
        }

        for table in &job.tables {
            if let Some(keys) = &table.diff_key {
                if keys.is_empty() {
                    return Err(SyncError::Config(format!(
                        "Sync.{}: diff_key of table {} must not be empty",
                        entry.name, table.local
                    )));
                }
            }
        }
    }

    Ok(())
}
