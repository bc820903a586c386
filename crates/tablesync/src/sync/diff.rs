//! Incremental synchronization by set difference.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::future;
use futures::stream::{StreamExt, TryStreamExt};
use tracing::{debug, info};

use super::{Endpoints, SyncJob, SyncStrategy};
use crate::core::{SelectQuery, Value};
use crate::error::{Result, SyncError};
use crate::transfer::{fetch_paged, insert_batched, RowStream, TransferConfig};

/// Insert source rows whose key is absent from the destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffStrategy;

#[async_trait]
impl SyncStrategy for DiffStrategy {
    fn name(&self) -> &'static str {
        "diff"
    }

    async fn run(
        &self,
        job: &SyncJob,
        endpoints: &Endpoints,
        transfer: &TransferConfig,
    ) -> Result<u64> {
        let table = job.local.qualified();
        let rows = missing_rows(job, endpoints, transfer).await?;
        let stats = insert_batched(
            endpoints.local.as_ref(),
            &table,
            &job.insert_columns()?,
            rows,
            transfer.batch_size,
        )
        .await
        .map_err(|e| e.into_transfer(&table))?;

        info!("{}: {} missing rows inserted", table, stats.rows);
        Ok(stats.rows)
    }
}

/// Key column pairs as `(remote, local)`.
fn key_pairs(job: &SyncJob) -> Result<Vec<(String, String)>> {
    let pairs = job.transfer_pairs()?;
    match &job.diff_key {
        Some(keys) => keys
            .iter()
            .map(|key| {
                pairs
                    .iter()
                    .find(|(local, _)| local == key)
                    .map(|(local, remote)| (remote.clone(), local.clone()))
                    .ok_or_else(|| {
                        SyncError::reconciliation(
                            job.local.qualified(),
                            format!("diff key column {} is not transferred", key),
                        )
                    })
            })
            .collect(),
        None => Ok(pairs.into_iter().map(|(l, r)| (r, l)).collect()),
    }
}

/// Lazily yield source rows (destination column names) whose key is missing
/// from the destination.
///
/// On one instance the difference is computed by the server and streamed back.
/// Across instances the destination keys are loaded into memory, then the
/// source is streamed once and filtered against them.
pub async fn missing_rows(
    job: &SyncJob,
    endpoints: &Endpoints,
    transfer: &TransferConfig,
) -> Result<RowStream> {
    let keys = key_pairs(job)?;

    if endpoints.same_instance {
        let query = job.source_query()?.except(&job.local, keys);
        return fetch_paged(endpoints.local.as_ref(), &query, transfer.page_size).await;
    }

    let key_columns: Vec<String> = keys.into_iter().map(|(_, local)| local).collect();
    let existing: HashSet<Vec<Value>> = fetch_paged(
        endpoints.local.as_ref(),
        &SelectQuery::columns(&job.local, &key_columns),
        transfer.page_size,
    )
    .await?
    .map_ok(|row| row.into_values())
    .try_collect()
    .await?;
    debug!(
        "{}: {} distinct destination keys loaded",
        job.local.qualified(),
        existing.len()
    );

    let source = fetch_paged(
        endpoints.remote.as_ref(),
        &job.source_query()?,
        transfer.page_size,
    )
    .await?;

    Ok(source
        .try_filter(move |row| {
            let missing = row
                .project(&key_columns)
                .map(|key| !existing.contains(&key))
                .unwrap_or(true);
            future::ready(missing)
        })
        .boxed())
}

/// Count the rows a diff sync would insert, without writing anything.
pub async fn count_missing(
    job: &SyncJob,
    endpoints: &Endpoints,
    transfer: &TransferConfig,
) -> Result<u64> {
    missing_rows(job, endpoints, transfer)
        .await?
        .try_fold(0u64, |n, _| future::ready(Ok(n + 1)))
        .await
}
