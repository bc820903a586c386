//! Full-replace synchronization.

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::{Endpoints, Snapshot, SyncJob, SyncStrategy};
use crate::core::{SelectQuery, Statement};
use crate::error::Result;
use crate::transfer::{fetch_paged, insert_batched, TransferConfig};

/// Truncate the destination and copy every source row.
///
/// If the copy fails after the truncate, the destination is truncated again
/// and refilled from a snapshot taken before the first truncate. The restore
/// is best effort and not atomic.
#[derive(Debug, Clone, Copy, Default)]
pub struct TruncateStrategy;

#[async_trait]
impl SyncStrategy for TruncateStrategy {
    fn name(&self) -> &'static str {
        "truncate"
    }

    async fn run(
        &self,
        job: &SyncJob,
        endpoints: &Endpoints,
        transfer: &TransferConfig,
    ) -> Result<u64> {
        let table = job.local.qualified();
        let pairs = job.transfer_pairs()?;
        let local_db = endpoints.local.as_ref();

        let snapshot = if job.restore_on_failure {
            let columns: Vec<String> = local_db
                .columns(&job.local)
                .await?
                .into_iter()
                .filter(|c| !c.identity)
                .map(|c| c.name)
                .collect();
            if columns.is_empty() {
                None
            } else {
                Some(Snapshot::capture(local_db, &job.local, &columns, transfer.page_size).await?)
            }
        } else {
            None
        };

        let truncate = Statement::Truncate {
            table: table.clone(),
        };
        local_db.execute(&truncate).await?;

        let copied = if endpoints.same_instance {
            let (locals, remotes): (Vec<String>, Vec<String>) = pairs.into_iter().unzip();
            local_db
                .execute(&Statement::InsertSelect {
                    table: table.clone(),
                    columns: locals,
                    query: SelectQuery::columns(&job.remote, &remotes),
                })
                .await
        } else {
            copy_streamed(job, endpoints, transfer).await
        };

        match copied {
            Ok(rows) => {
                info!("{}: {} rows copied", table, rows);
                Ok(rows)
            }
            Err(e) => {
                let e = e.into_transfer(&table);
                error!("{}", e);
                if let Some(snapshot) = snapshot {
                    warn!(
                        "{}: restoring {} rows from pre-sync snapshot",
                        table,
                        snapshot.len()
                    );
                    match restore(job, endpoints, transfer, &snapshot).await {
                        Ok(rows) => info!("{}: restored {} rows", table, rows),
                        Err(restore_err) => error!("{}: restore failed: {}", table, restore_err),
                    }
                }
                Err(e)
            }
        }
    }
}

async fn copy_streamed(
    job: &SyncJob,
    endpoints: &Endpoints,
    transfer: &TransferConfig,
) -> Result<u64> {
    let rows = fetch_paged(
        endpoints.remote.as_ref(),
        &job.source_query()?,
        transfer.page_size,
    )
    .await?;
    let stats = insert_batched(
        endpoints.local.as_ref(),
        &job.local.qualified(),
        &job.insert_columns()?,
        rows,
        transfer.batch_size,
    )
    .await?;
    Ok(stats.rows)
}

async fn restore(
    job: &SyncJob,
    endpoints: &Endpoints,
    transfer: &TransferConfig,
    snapshot: &Snapshot,
) -> Result<u64> {
    let table = job.local.qualified();
    let local_db = endpoints.local.as_ref();
    local_db
        .execute(&Statement::Truncate {
            table: table.clone(),
        })
        .await?;
    let stats = insert_batched(
        local_db,
        &table,
        snapshot.columns(),
        snapshot.rows().await?,
        transfer.batch_size,
    )
    .await?;
    Ok(stats.rows)
}
