//! Restartable spool of a table's rows, used to restore a destination after a
//! failed truncate sync.

use std::io::SeekFrom;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, BufWriter, Lines};

use crate::core::{column_header, Database, Row, SelectQuery, TableRef, Value};
use crate::error::{Result, SyncError};
use crate::transfer::{fetch_paged, RowStream};

/// Rows spooled to an anonymous temporary file, one JSON array per line.
///
/// The file is removed by the OS when the snapshot is dropped.
#[derive(Debug)]
pub struct Snapshot {
    file: File,
    columns: Arc<[String]>,
    rows: u64,
}

impl Snapshot {
    /// Stream `columns` of `table` into a new spool.
    pub async fn capture(
        db: &dyn Database,
        table: &TableRef,
        columns: &[String],
        page_size: usize,
    ) -> Result<Self> {
        let query = SelectQuery::columns(table, columns);
        let mut source = fetch_paged(db, &query, page_size).await?;

        let file = tokio::task::spawn_blocking(tempfile::tempfile)
            .await
            .map_err(|e| SyncError::transfer("snapshot", e))??;
        let mut out = BufWriter::new(File::from_std(file));
        let mut rows = 0u64;
        while let Some(row) = source.try_next().await? {
            let mut line = serde_json::to_vec(row.values())?;
            line.push(b'\n');
            out.write_all(&line).await?;
            rows += 1;
        }
        out.flush().await?;

        Ok(Self {
            file: out.into_inner(),
            columns: column_header(columns),
            rows,
        })
    }

    /// Number of spooled rows.
    pub fn len(&self) -> u64 {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Spooled column names, in value order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Replay the spool from the beginning. Can be called any number of times,
    /// but not concurrently: replays share one file offset.
    pub async fn rows(&self) -> Result<RowStream> {
        let mut file = self.file.try_clone().await?;
        file.seek(SeekFrom::Start(0)).await?;

        let lines = BufReader::new(file).lines();
        let columns = self.columns.clone();
        Ok(stream::try_unfold((lines, columns), next_row).boxed())
    }
}

type SpoolLines = Lines<BufReader<File>>;

async fn next_row(
    (mut lines, columns): (SpoolLines, Arc<[String]>),
) -> Result<Option<(Row, (SpoolLines, Arc<[String]>))>> {
    let Some(line) = lines.next_line().await? else {
        return Ok(None);
    };
    let row = parse_row(&line, &columns)?;
    Ok(Some((row, (lines, columns))))
}

fn parse_row(line: &str, columns: &Arc<[String]>) -> Result<Row> {
    let values: Vec<Value> = serde_json::from_str(line)?;
    if values.len() != columns.len() {
        return Err(SyncError::transfer(
            "snapshot",
            format!("spooled row has {} values, expected {}", values.len(), columns.len()),
        ));
    }
    Ok(Row::new(columns.clone(), values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CatalogColumn;
    use crate::drivers::MemoryDatabase;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_snapshot_replays_twice() {
        let db = MemoryDatabase::new("mem://a");
        db.create_table(
            "T",
            vec![
                CatalogColumn::new("NAME", "VARCHAR2", 1).with_length(10),
                CatalogColumn::new("AMT", "NUMBER", 2).with_precision(10, Some(2)),
            ],
        );
        db.insert_rows(
            "T",
            vec![
                vec![Value::from("a"), Value::Decimal(Decimal::new(1050, 2))],
                vec![Value::Null, Value::Int(7)],
            ],
        );

        let columns = vec!["NAME".to_string(), "AMT".to_string()];
        let snapshot = Snapshot::capture(&db, &TableRef::new("T", "", ""), &columns, 1)
            .await
            .unwrap();
        assert_eq!(snapshot.len(), 2);

        for _ in 0..2 {
            let rows: Vec<Row> = snapshot.rows().await.unwrap().try_collect().await.unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].get("AMT"), Some(&Value::Decimal(Decimal::new(1050, 2))));
            assert_eq!(rows[1].get("NAME"), Some(&Value::Null));
        }
    }

    #[tokio::test]
    async fn test_snapshot_keeps_non_finite_floats() {
        let db = MemoryDatabase::new("mem://a");
        db.create_table(
            "T",
            vec![
                CatalogColumn::new("ID", "NUMBER", 1),
                CatalogColumn::new("RATIO", "BINARY_DOUBLE", 2),
            ],
        );
        db.insert_rows(
            "T",
            vec![
                vec![Value::Int(7), Value::Float(f64::NAN)],
                vec![Value::Int(8), Value::Float(f64::INFINITY)],
                vec![Value::Int(9), Value::Float(f64::NEG_INFINITY)],
            ],
        );

        let columns = vec!["ID".to_string(), "RATIO".to_string()];
        let snapshot = Snapshot::capture(&db, &TableRef::new("T", "", ""), &columns, 2)
            .await
            .unwrap();
        let rows: Vec<Row> = snapshot.rows().await.unwrap().try_collect().await.unwrap();

        assert_eq!(rows.len(), 3);
        assert!(matches!(rows[0].get("RATIO"), Some(Value::Float(f)) if f.is_nan()));
        assert_eq!(rows[1].get("RATIO"), Some(&Value::Float(f64::INFINITY)));
        assert_eq!(rows[2].get("RATIO"), Some(&Value::Float(f64::NEG_INFINITY)));
    }
}
