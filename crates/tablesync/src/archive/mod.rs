//! Pre-sync snapshots of destination tables.
//!
//! The engine feeds an [`ArchivalSink`] a header and a row stream; the sink
//! decides where and how they are persisted. [`CsvArchive`] writes one
//! semicolon-delimited file per snapshot under `<root>/<TABLE>/` and deletes
//! snapshots older than the retention window.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDateTime};
use futures::TryStreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::Value;
use crate::error::{Result, SyncError};
use crate::transfer::RowStream;

/// Snapshot file name format.
pub const SNAPSHOT_NAME_FORMAT: &str = "%Y-%m-%d_%H%M%S";

/// Rows buffered between the fetching task and the file writer.
const WRITER_QUEUE: usize = 1024;

/// Where pre-sync snapshots go.
#[async_trait]
pub trait ArchivalSink: Send + Sync {
    /// Persist `rows` (with header `columns`) as a snapshot of `table`.
    async fn archive(&self, table: &str, columns: &[String], rows: RowStream) -> Result<PathBuf>;

    /// Delete snapshots of `table` older than `days`. Returns how many were removed.
    async fn enforce_retention(&self, table: &str, days: u32) -> Result<usize>;
}

/// CSV snapshots on the local filesystem.
#[derive(Debug, Clone)]
pub struct CsvArchive {
    root: PathBuf,
}

impl CsvArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }

    /// Delete snapshots older than `deadline`.
    pub fn delete_before(&self, table: &str, deadline: NaiveDateTime) -> Result<usize> {
        let dir = self.table_dir(table);
        if !dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };

            match NaiveDateTime::parse_from_str(name, SNAPSHOT_NAME_FORMAT) {
                Ok(taken) if taken < deadline => {
                    fs::remove_file(entry.path())?;
                    debug!("Removed old backup {}", entry.path().display());
                    removed += 1;
                }
                Ok(_) => {}
                Err(_) => warn!("Skipping unrecognised file in backup directory: {}", name),
            }
        }
        Ok(removed)
    }
}

/// Create a new snapshot file in `dir`. When a snapshot already carries the
/// `taken` timestamp, the next free second is used so names stay parseable.
fn create_snapshot_file(dir: &Path, taken: NaiveDateTime) -> Result<(PathBuf, File)> {
    fs::create_dir_all(dir)?;
    let mut taken = taken;
    loop {
        let path = dir.join(taken.format(SNAPSHOT_NAME_FORMAT).to_string());
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                taken += Duration::seconds(1);
            }
            Err(e) => return Err(SyncError::Archive(format!("{}: {}", path.display(), e))),
        }
    }
}

/// Blocking half of [`CsvArchive::archive`]: drains `rows` into a new file.
fn write_snapshot(
    dir: &Path,
    taken: NaiveDateTime,
    columns: Vec<String>,
    mut rows: mpsc::Receiver<Vec<Value>>,
) -> Result<(PathBuf, u64)> {
    let (path, file) = create_snapshot_file(dir, taken)?;
    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_writer(file);

    writer.write_record(columns.iter().map(|c| c.to_uppercase()))?;
    let mut count = 0u64;
    while let Some(values) = rows.blocking_recv() {
        writer.write_record(values.iter().map(|v| v.to_string()))?;
        count += 1;
    }
    writer.flush()?;
    Ok((path, count))
}

#[async_trait]
impl ArchivalSink for CsvArchive {
    async fn archive(
        &self,
        table: &str,
        columns: &[String],
        mut rows: RowStream,
    ) -> Result<PathBuf> {
        let dir = self.table_dir(table);
        let taken = Local::now().naive_local();
        let header = columns.to_vec();
        let (tx, rx) = mpsc::channel(WRITER_QUEUE);
        let writer = tokio::task::spawn_blocking(move || write_snapshot(&dir, taken, header, rx));

        let mut fetch_error = None;
        loop {
            match rows.try_next().await {
                Ok(Some(row)) => {
                    // The writer only hangs up on failure; its error is reported below.
                    if tx.send(row.values().to_vec()).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    fetch_error = Some(e);
                    break;
                }
            }
        }
        drop(tx);

        let written = writer
            .await
            .map_err(|e| SyncError::Archive(format!("backup writer for {}: {}", table, e)))?;
        if let Some(e) = fetch_error {
            if let Ok((path, _)) = &written {
                let _ = tokio::fs::remove_file(path).await;
            }
            return Err(e);
        }
        let (path, count) = written?;

        info!("Backup of {} written to {} ({} rows)", table, path.display(), count);
        Ok(path)
    }

    async fn enforce_retention(&self, table: &str, days: u32) -> Result<usize> {
        let deadline = Local::now().naive_local() - Duration::days(i64::from(days));
        let archive = self.clone();
        let table = table.to_string();
        tokio::task::spawn_blocking(move || archive.delete_before(&table, deadline))
            .await
            .map_err(|e| SyncError::Archive(format!("backup rotation: {}", e)))?
    }
}
