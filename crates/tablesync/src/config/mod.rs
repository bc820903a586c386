//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Replace every configured job with a single ad-hoc job.
    pub fn with_manual_job(mut self, name: &str, job: SyncJobConfig) -> Result<Self> {
        self.sync = vec![JobEntry {
            name: name.to_string(),
            job,
        }];
        self.validate()?;
        Ok(self)
    }

    /// Look up a connection profile by name.
    pub fn profile(&self, name: &str) -> Option<&ConnectionProfile> {
        self.connections.get(name)
    }
}
