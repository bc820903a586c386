//! Streaming transfer primitives.
//!
//! - [`fetch_paged`] pulls fixed-size pages from a server-side cursor and
//!   yields rows one at a time. Memory use is one page, whatever the table size.
//! - [`insert_batched`] groups rows into fixed-size batches, issues one
//!   array insert per batch and commits once at the end.
//!
//! Fetch and insert are not overlapped: a page is consumed before the next is
//! requested.

use std::time::{Duration, Instant};

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::debug;

use crate::config::{GeneralConfig, DEFAULT_CHUNK_ROWS};
use crate::core::{Database, Row, RowCursor, SelectQuery};
use crate::error::{Result, SyncError};

/// A finite, single-pass sequence of rows.
///
/// Dropping the stream releases the underlying cursor.
pub type RowStream = BoxStream<'static, Result<Row>>;

/// Page and batch sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// Rows per fetched page.
    pub page_size: usize,

    /// Rows per insert statement.
    pub batch_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_CHUNK_ROWS,
            batch_size: DEFAULT_CHUNK_ROWS,
        }
    }
}

impl From<&GeneralConfig> for TransferConfig {
    fn from(general: &GeneralConfig) -> Self {
        Self {
            page_size: general.get_page_size(),
            batch_size: general.get_batch_size(),
        }
    }
}

/// Statistics from one batched insert.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    /// Total rows inserted.
    pub rows: u64,

    /// Insert statements issued.
    pub batches: u64,

    /// Time spent waiting for source rows.
    pub read_time: Duration,

    /// Time spent inserting and committing.
    pub write_time: Duration,
}

struct PageState {
    cursor: Option<Box<dyn RowCursor>>,
    page: std::vec::IntoIter<Row>,
    page_size: usize,
}

/// Open a cursor over `query` and stream its rows page by page.
pub async fn fetch_paged(
    db: &dyn Database,
    query: &SelectQuery,
    page_size: usize,
) -> Result<RowStream> {
    let cursor = db.open_cursor(query, page_size).await?;
    debug!("Opened cursor on {} (page size {})", query.from, page_size);

    let state = PageState {
        cursor: Some(cursor),
        page: Vec::new().into_iter(),
        page_size,
    };

    Ok(stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(row) = state.page.next() {
                return Ok(Some((row, state)));
            }
            let Some(cursor) = state.cursor.as_mut() else {
                return Ok(None);
            };
            let page = cursor.fetch_page().await?;
            if page.len() < state.page_size {
                // Short page: the cursor is exhausted, release it now.
                state.cursor = None;
            }
            if page.is_empty() {
                return Ok(None);
            }
            state.page = page.into_iter();
        }
    })
    .boxed())
}

/// Insert `rows` into `table` in batches of `batch_size`, inside one transaction.
///
/// Each row is projected onto `columns` by name. On failure the writer is
/// dropped, which rolls back every uncommitted batch of this call.
pub async fn insert_batched(
    db: &dyn Database,
    table: &str,
    columns: &[String],
    mut rows: RowStream,
    batch_size: usize,
) -> Result<TransferStats> {
    let batch_size = batch_size.max(1);
    let mut writer = db.begin_insert(table, columns).await?;
    let mut stats = TransferStats::default();
    let mut batch = Vec::with_capacity(batch_size);

    loop {
        let read_start = Instant::now();
        let next = rows.try_next().await?;
        stats.read_time += read_start.elapsed();

        let Some(row) = next else { break };
        let values = row.project(columns).map_err(|missing| {
            SyncError::transfer(table, format!("source row has no column {}", missing))
        })?;
        batch.push(values);

        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            let write_start = Instant::now();
            stats.rows += writer.insert_batch(full).await?;
            stats.write_time += write_start.elapsed();
            stats.batches += 1;
            debug!("{}: {} rows inserted", table, stats.rows);
        }
    }

    let write_start = Instant::now();
    if !batch.is_empty() {
        stats.rows += writer.insert_batch(batch).await?;
        stats.batches += 1;
    }
    writer.commit().await?;
    stats.write_time += write_start.elapsed();

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CatalogColumn, TableRef, Value};
    use crate::drivers::MemoryDatabase;

    fn table_with_rows(db: &MemoryDatabase, name: &str, rows: i64) {
        db.create_table(
            name,
            vec![
                CatalogColumn::new("ID", "NUMBER", 1),
                CatalogColumn::new("NAME", "VARCHAR2", 2).with_length(20),
            ],
        );
        db.insert_rows(
            name,
            (0..rows).map(|i| vec![Value::Int(i), Value::Text(format!("row{}", i))]),
        );
    }

    fn id_name() -> Vec<String> {
        vec!["ID".to_string(), "NAME".to_string()]
    }

    #[tokio::test]
    async fn test_fetch_paged_counts_pages() {
        let db = MemoryDatabase::new("mem://a");
        table_with_rows(&db, "SRC", 12_001);

        let query = SelectQuery::columns(&TableRef::new("SRC", "", ""), &id_name());
        let rows: Vec<Row> = fetch_paged(&db, &query, 5_000)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(rows.len(), 12_001);
        assert_eq!(db.stats().page_fetches, 3);
        assert_eq!(rows[0].get("ID"), Some(&Value::Int(0)));
        assert_eq!(rows[12_000].get("ID"), Some(&Value::Int(12_000)));
    }

    #[tokio::test]
    async fn test_early_drop_releases_cursor() {
        let db = MemoryDatabase::new("mem://a");
        table_with_rows(&db, "SRC", 20);

        let query = SelectQuery::columns(&TableRef::new("SRC", "", ""), &id_name());
        let mut stream = fetch_paged(&db, &query, 5).await.unwrap();
        let first = stream.try_next().await.unwrap();
        assert!(first.is_some());
        assert_eq!(db.stats().open_cursors, 1);

        drop(stream);
        assert_eq!(db.stats().open_cursors, 0);
        assert_eq!(db.stats().page_fetches, 1);
    }

    #[tokio::test]
    async fn test_insert_batched_batch_sizes() {
        let src = MemoryDatabase::new("mem://a");
        let dst = MemoryDatabase::new("mem://b");
        table_with_rows(&src, "SRC", 10_000);
        table_with_rows(&dst, "DST", 0);

        let query = SelectQuery::columns(&TableRef::new("SRC", "", ""), &id_name());
        let rows = fetch_paged(&src, &query, 5_000).await.unwrap();
        let stats = insert_batched(&dst, "DST", &id_name(), rows, 5_000)
            .await
            .unwrap();

        assert_eq!(stats.rows, 10_000);
        assert_eq!(stats.batches, 2);
        assert_eq!(dst.stats().insert_batches, vec![5_000, 5_000]);
        assert_eq!(dst.row_total("DST"), 10_000);
    }

    #[tokio::test]
    async fn test_insert_batched_missing_column_rolls_back() {
        let src = MemoryDatabase::new("mem://a");
        let dst = MemoryDatabase::new("mem://b");
        table_with_rows(&src, "SRC", 10);
        table_with_rows(&dst, "DST", 0);

        let query = SelectQuery::columns(&TableRef::new("SRC", "", ""), &["ID".to_string()]);
        let rows = fetch_paged(&src, &query, 4).await.unwrap();
        let err = insert_batched(&dst, "DST", &id_name(), rows, 4)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Transfer { .. }));
        assert_eq!(dst.row_total("DST"), 0);
    }
}
