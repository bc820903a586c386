//! Error types for the synchronization library.

use thiserror::Error;

/// Main error type for synchronization operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing connection attribute, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Driver or network failure while opening an endpoint
    #[error("Connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    /// A statement was rejected or failed while executing
    #[error("Query failed: {message}\n  Statement: {statement}")]
    Query { statement: String, message: String },

    /// Column reconciliation could not produce a usable column set
    #[error("Reconciliation failed for table {table}: {message}")]
    Reconciliation { table: String, message: String },

    /// Mid-stream fetch or batch insert failure
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Backup snapshot could not be written or rotated
    #[error("Archive error: {0}")]
    Archive(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl SyncError {
    /// Create a Connection error for the given endpoint description
    pub fn connection(endpoint: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Connection {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Create a Query error carrying the offending statement
    pub fn query(statement: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Query {
            statement: statement.into(),
            message: message.to_string(),
        }
    }

    /// Create a Reconciliation error
    pub fn reconciliation(table: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Reconciliation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Transfer {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Wrap any error raised while moving rows of `table` into a Transfer error.
    ///
    /// Transfer errors pass through untouched so the innermost table name wins.
    pub fn into_transfer(self, table: &str) -> Self {
        match self {
            SyncError::Transfer { .. } => self,
            other => SyncError::transfer(table, other),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
