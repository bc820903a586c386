//! # tablesync
//!
//! Oracle table synchronization library.
//!
//! This library keeps a destination table in line with a source table, on the
//! same instance or across two instances, with support for:
//!
//! - **Truncate sync**: empty and repopulate, restoring the prior contents on failure
//! - **Diff sync**: insert only the source rows missing from the destination
//! - **Schema reconciliation** of identity columns, renamed columns and column subsets
//! - **Table creation** from catalog metadata when the destination is absent
//! - **Bounded-memory transfers** via paged cursors and batched inserts
//! - **CSV backups** of the destination with age-based retention
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tablesync::{Config, OracleConnector, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> tablesync::Result<()> {
//!     let config = Config::load("config.yml")?;
//!     let orchestrator = Orchestrator::new(config, Arc::new(OracleConnector::new()));
//!     let report = orchestrator.run().await?;
//!     println!("Wrote {} rows", report.rows_written);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod core;
pub mod ddl;
pub mod dialect;
pub mod drivers;
pub mod endpoint;
pub mod error;
pub mod introspect;
pub mod orchestrator;
pub mod sync;
pub mod transfer;

// Re-exports for convenient access
pub use archive::{ArchivalSink, CsvArchive};
pub use config::{Config, ConnectionProfile, GeneralConfig, SyncJobConfig, SyncMode, TableMapping};
pub use crate::core::{ColumnSet, Connector, Database, Row, TableRef, Value};
pub use drivers::{MemoryConnector, MemoryDatabase};
#[cfg(feature = "oracle")]
pub use drivers::OracleConnector;
pub use endpoint::Endpoint;
pub use error::{Result, SyncError};
pub use orchestrator::{Orchestrator, SyncReport, TableOutcome, TableStatus};
pub use sync::{strategy_for, DiffStrategy, SyncJob, SyncStrategy, TruncateStrategy};
pub use transfer::{TransferConfig, TransferStats};
