//! Synchronization strategies.
//!
//! A [`SyncJob`] describes one reconciled table pair. A [`SyncStrategy`]
//! moves its rows:
//!
//! - [`TruncateStrategy`]: empty the destination, copy everything, restore the
//!   previous contents if the copy fails;
//! - [`DiffStrategy`]: insert only source rows whose key is missing from the
//!   destination.
//!
//! When both endpoints are the same instance the data movement is pushed down
//! to the server; otherwise rows are streamed through this process.

mod diff;
mod snapshot;
mod truncate;

pub use diff::{count_missing, missing_rows, DiffStrategy};
pub use snapshot::Snapshot;
pub use truncate::TruncateStrategy;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SyncMode;
use crate::core::{ColumnSet, Database, Projection, SelectQuery, TableRef};
use crate::error::{Result, SyncError};
use crate::transfer::TransferConfig;

/// One table pair, reconciled and ready to run.
#[derive(Debug, Clone)]
pub struct SyncJob {
    /// Destination table.
    pub local: TableRef,

    /// Source table.
    pub remote: TableRef,

    /// Reconciled columns.
    pub columns: ColumnSet,

    /// Strategy kind.
    pub mode: SyncMode,

    /// Diff key (local names); all transferred columns when `None`.
    pub diff_key: Option<Vec<String>>,

    /// Snapshot the destination into the archival sink first.
    pub backup: bool,

    /// Snapshot retention in days.
    pub rotate: Option<u32>,

    /// Restore the destination if a truncate sync fails.
    pub restore_on_failure: bool,
}

impl SyncJob {
    /// `(local, remote)` column pairs that move data. Fails when none do.
    pub fn transfer_pairs(&self) -> Result<Vec<(String, String)>> {
        let pairs = self.columns.transfer_pairs();
        if pairs.is_empty() {
            return Err(SyncError::reconciliation(
                self.local.qualified(),
                format!("no columns in common with {}", self.remote.qualified()),
            ));
        }
        Ok(pairs)
    }

    /// Destination columns receiving data, in insert order.
    pub fn insert_columns(&self) -> Result<Vec<String>> {
        Ok(self.transfer_pairs()?.into_iter().map(|(l, _)| l).collect())
    }

    /// Source SELECT whose output columns carry destination names.
    pub fn source_query(&self) -> Result<SelectQuery> {
        let projection = self
            .transfer_pairs()?
            .iter()
            .map(|(local, remote)| {
                if local == remote {
                    Projection::column(remote)
                } else {
                    Projection::aliased(remote, local)
                }
            })
            .collect();
        Ok(SelectQuery::projected(&self.remote, projection))
    }
}

/// Live handles for a job's two endpoints.
#[derive(Clone)]
pub struct Endpoints {
    pub local: Arc<dyn Database>,
    pub remote: Arc<dyn Database>,

    /// Both handles reach the same physical instance.
    pub same_instance: bool,
}

/// A way of bringing the destination in line with the source.
#[async_trait]
pub trait SyncStrategy: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Run the job. Returns the number of rows written to the destination.
    async fn run(
        &self,
        job: &SyncJob,
        endpoints: &Endpoints,
        transfer: &TransferConfig,
    ) -> Result<u64>;
}

/// Strategy implementing `mode`.
pub fn strategy_for(mode: SyncMode) -> Box<dyn SyncStrategy> {
    match mode {
        SyncMode::Truncate => Box::new(TruncateStrategy),
        SyncMode::Diff => Box::new(DiffStrategy),
    }
}
