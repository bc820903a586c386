//! Sync orchestrator - drives every configured job, one table at a time.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::archive::{ArchivalSink, CsvArchive};
use crate::config::{Config, JobEntry, SyncJobConfig, SyncMode, TableMapping};
use crate::core::{Connector, Database, SelectQuery, TableRef};
use crate::ddl;
use crate::endpoint::Endpoint;
use crate::error::{Result, SyncError};
use crate::introspect::reconcile;
use crate::sync::{count_missing, strategy_for, Endpoints, SyncJob};
use crate::transfer::{fetch_paged, TransferConfig};

/// Runs the `Sync` section of a configuration.
pub struct Orchestrator {
    config: Config,
    connector: Arc<dyn Connector>,
    archive: Arc<dyn ArchivalSink>,
    transfer: TransferConfig,
    show_only: bool,
}

/// Final status of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Data was moved (possibly zero rows).
    Synced,
    /// Show-only run; nothing was written.
    Previewed,
    /// The table was skipped after an error.
    Failed,
}

/// What happened to one table pair.
#[derive(Debug, Clone, Serialize)]
pub struct TableOutcome {
    /// Job name from the `Sync` section.
    pub job: String,

    /// Destination table.
    pub local_table: String,

    /// Source table.
    pub remote_table: String,

    pub mode: SyncMode,
    pub status: TableStatus,

    /// Rows written to the destination.
    pub rows_written: u64,

    /// Destination row count before the run (show-only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_lines: Option<i64>,

    /// Source rows missing from the destination (show-only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_in_remote: Option<u64>,

    /// DDL issued (or previewed) for an absent destination.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ddl: Vec<String>,

    /// Backup snapshot written before the sync.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_file: Option<PathBuf>,

    /// Error text when the table failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableOutcome {
    fn new(job: &str, mapping: &TableMapping, mode: SyncMode) -> Self {
        Self {
            job: job.to_string(),
            local_table: mapping.local.clone(),
            remote_table: mapping.remote.clone(),
            mode,
            status: TableStatus::Failed,
            rows_written: 0,
            total_lines: None,
            only_in_remote: None,
            ddl: Vec::new(),
            backup_file: None,
            error: None,
        }
    }

    fn failed(mut self, err: &SyncError) -> Self {
        self.status = TableStatus::Failed;
        self.error = Some(err.to_string());
        self
    }
}

/// Result of a sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total tables processed.
    pub tables_total: usize,

    /// Tables synced or previewed.
    pub tables_success: usize,

    /// Tables that failed.
    pub tables_failed: usize,

    /// Total rows written.
    pub rows_written: u64,

    /// Per-table outcomes in configuration order.
    pub tables: Vec<TableOutcome>,
}

impl SyncReport {
    /// Failed tables as `job/TABLE`.
    pub fn failed_tables(&self) -> Vec<String> {
        self.tables
            .iter()
            .filter(|t| t.status == TableStatus::Failed)
            .map(|t| format!("{}/{}", t.job, t.local_table))
            .collect()
    }

    /// Outcome for a destination table, first match across jobs.
    pub fn table(&self, local_table: &str) -> Option<&TableOutcome> {
        let wanted = local_table.to_uppercase();
        self.tables.iter().find(|t| t.local_table == wanted)
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Create an orchestrator writing backups under `General.backup_path`.
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Self {
        let archive = Arc::new(CsvArchive::new(config.general.backup_path.clone()));
        let transfer = TransferConfig::from(&config.general);
        Self {
            config,
            connector,
            archive,
            transfer,
            show_only: false,
        }
    }

    /// Replace the archival sink.
    pub fn with_archive(mut self, archive: Arc<dyn ArchivalSink>) -> Self {
        self.archive = archive;
        self
    }

    /// Report DDL and differences without writing anything.
    pub fn show_only(mut self, show_only: bool) -> Self {
        self.show_only = show_only;
        self
    }

    /// Run every job in configuration order.
    ///
    /// Per-table failures are logged and recorded in the report; they never
    /// abort the run.
    pub async fn run(&self) -> Result<SyncReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = Instant::now();

        info!("Starting sync run: {}", run_id);
        if self.show_only {
            info!("Show-only mode: no data will be written");
        }

        let mut tables = Vec::new();
        for entry in &self.config.sync {
            let span = info_span!("job", name = %entry.name);
            let outcomes = self.run_job(entry).instrument(span).await;
            tables.extend(outcomes);
        }

        let tables_failed = tables
            .iter()
            .filter(|t| t.status == TableStatus::Failed)
            .count();
        let report = SyncReport {
            run_id,
            status: if tables_failed == 0 {
                "completed".to_string()
            } else {
                "completed_with_errors".to_string()
            },
            duration_seconds: start.elapsed().as_secs_f64(),
            started_at,
            completed_at: Utc::now(),
            tables_total: tables.len(),
            tables_success: tables.len() - tables_failed,
            tables_failed,
            rows_written: tables.iter().map(|t| t.rows_written).sum(),
            tables,
        };

        info!(
            "Sync run {} finished: {}/{} tables ok, {} rows written in {:.1}s",
            report.run_id,
            report.tables_success,
            report.tables_total,
            report.rows_written,
            report.duration_seconds
        );
        Ok(report)
    }

    async fn run_job(&self, entry: &JobEntry) -> Vec<TableOutcome> {
        let job = &entry.job;

        let endpoints = match self.connect(job).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!(
                    "Failed to establish a connection to one of the databases for syncing {}: {}",
                    entry.name,
                    e.format_detailed()
                );
                return job
                    .tables
                    .iter()
                    .map(|m| TableOutcome::new(&entry.name, m, job.sync_type).failed(&e))
                    .collect();
            }
        };
        let (connected, local_ep, remote_ep) = endpoints;

        let mut outcomes = Vec::with_capacity(job.tables.len());
        for mapping in &job.tables {
            let local = local_ep.table(&mapping.local);
            let remote = remote_ep.table(&mapping.remote);
            let span = info_span!("table", local = %local.qualified(), remote = %remote.qualified());

            let outcome = TableOutcome::new(&entry.name, mapping, job.sync_type);
            let outcome = match self
                .sync_table(job, mapping, &connected, &local, &remote, outcome.clone())
                .instrument(span.clone())
                .await
            {
                Ok(done) => done,
                Err(e) => {
                    span.in_scope(|| {
                        error!(
                            "An error occurred while synchronizing the table {}: {}",
                            local.qualified(),
                            e.format_detailed()
                        )
                    });
                    outcome.failed(&e)
                }
            };
            outcomes.push(outcome);
        }

        connected.local.close().await;
        if !connected.same_instance {
            connected.remote.close().await;
        }
        outcomes
    }

    /// Resolve and open both endpoints of a job. One handle serves both
    /// sides when they are the same instance.
    async fn connect(&self, job: &SyncJobConfig) -> Result<(Endpoints, Endpoint, Endpoint)> {
        let local_ep = Endpoint::resolve(&job.local_db, &self.config.connections)?;
        let remote_ep = Endpoint::resolve(&job.remote_db, &self.config.connections)?;
        let same_instance = local_ep.same_instance(&remote_ep);

        let local = self.connector.connect(&local_ep).await?;
        let remote: Arc<dyn Database> = if same_instance {
            debug!("{} and {} are the same instance", job.local_db, job.remote_db);
            Arc::clone(&local)
        } else {
            self.connector.connect(&remote_ep).await?
        };
        info!("Connected: local {} / remote {}", local_ep, remote_ep);

        Ok((
            Endpoints {
                local,
                remote,
                same_instance,
            },
            local_ep,
            remote_ep,
        ))
    }

    async fn sync_table(
        &self,
        config: &SyncJobConfig,
        mapping: &TableMapping,
        endpoints: &Endpoints,
        local: &TableRef,
        remote: &TableRef,
        mut outcome: TableOutcome,
    ) -> Result<TableOutcome> {
        let local_db = endpoints.local.as_ref();
        let remote_db = endpoints.remote.as_ref();

        let mut columns = reconcile(mapping, local_db, local, remote_db, remote).await?;

        if !columns.local_exists() {
            if self.show_only {
                info!(
                    "The table {} is not in the database. To create it, the following query will be used:",
                    local.qualified()
                );
            }
            outcome.ddl = ddl::create_table(
                local_db,
                remote_db,
                &columns,
                local,
                remote,
                endpoints.same_instance,
                self.show_only,
            )
            .await?;
            if self.show_only {
                outcome.status = TableStatus::Previewed;
                return Ok(outcome);
            }
            columns = reconcile(mapping, local_db, local, remote_db, remote).await?;
        }

        let job = SyncJob {
            local: local.clone(),
            remote: remote.clone(),
            columns,
            mode: config.sync_type,
            diff_key: mapping.diff_key.clone(),
            backup: config.backup,
            rotate: config.rotate,
            restore_on_failure: config.restore_on_failure,
        };

        if self.show_only {
            let missing = count_missing(&job, endpoints, &self.transfer).await?;
            info!("diff results for {}", local.qualified());
            info!("Total lines: {}", job.columns.row_count);
            info!("Only in remote lines: {}", missing);
            outcome.total_lines = Some(job.columns.row_count);
            outcome.only_in_remote = Some(missing);
            outcome.status = TableStatus::Previewed;
            return Ok(outcome);
        }

        if job.backup {
            outcome.backup_file = Some(self.backup(&job, local_db).await?);
            if let Some(days) = job.rotate {
                match self.archive.enforce_retention(&job.local.name, days).await {
                    Ok(removed) if removed > 0 => {
                        info!("Removed {} backups of {} older than {} days", removed, job.local.name, days)
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Backup rotation for {} failed: {}", job.local.name, e),
                }
            }
        }

        let strategy = strategy_for(job.mode);
        info!("Synchronizing {} <- {} ({})", local.qualified(), remote.qualified(), strategy.name());
        outcome.rows_written = strategy.run(&job, endpoints, &self.transfer).await?;
        outcome.status = TableStatus::Synced;
        Ok(outcome)
    }

    /// Stream the destination's current rows into the archival sink.
    async fn backup(&self, job: &SyncJob, local_db: &dyn Database) -> Result<PathBuf> {
        let names: Vec<String> = local_db
            .columns(&job.local)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        let query = SelectQuery::columns(&job.local, &names);
        let rows = fetch_paged(local_db, &query, self.transfer.page_size).await?;
        self.archive
            .archive(&job.local.name, &names, rows)
            .await
            .map_err(|e| SyncError::Archive(format!("backup of {}: {}", job.local.qualified(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CatalogColumn, Value};
    use crate::drivers::{MemoryConnector, MemoryDatabase};

    const CONFIG: &str = r#"
General:
  backup_path: /nonexistent
Connections:
  pl_db:
    db_user: u
    db_password: p
    db_host: local
    db_name: PL
  prod:
    db_user: u
    db_password: p
    db_host: remote
    db_name: PROD
Sync:
  nightly:
    local_db: pl_db
    remote_db: prod
    sync_type: diff
    tables:
      - T: T
"#;

    fn databases() -> (MemoryDatabase, MemoryDatabase) {
        let cols = vec![
            CatalogColumn::new("ID", "NUMBER", 1),
            CatalogColumn::new("NAME", "VARCHAR2", 2).with_length(20),
        ];
        let local = MemoryDatabase::new("oracle://u@local:1521/PL");
        let remote = MemoryDatabase::new("oracle://u@remote:1521/PROD");
        local.create_table("T", cols.clone());
        remote.create_table("T", cols);
        local.insert_rows("T", vec![vec![Value::Int(1), Value::from("a")]]);
        remote.insert_rows(
            "T",
            vec![
                vec![Value::Int(1), Value::from("a")],
                vec![Value::Int(2), Value::from("b")],
            ],
        );
        (local, remote)
    }

    #[tokio::test]
    async fn test_report_counts_rows_and_tables() {
        let (local, remote) = databases();
        let connector = MemoryConnector::new()
            .with_database("pl_db", local.clone())
            .with_database("prod", remote);
        let config = Config::from_yaml(CONFIG).unwrap();

        let report = Orchestrator::new(config, Arc::new(connector))
            .run()
            .await
            .unwrap();

        assert_eq!(report.status, "completed");
        assert_eq!(report.tables_total, 1);
        assert_eq!(report.rows_written, 1);
        assert_eq!(report.table("t").unwrap().status, TableStatus::Synced);
        assert_eq!(local.row_total("T"), 2);

        let json = report.to_json().unwrap();
        assert!(json.contains("\"status\": \"synced\""));
        assert!(!json.contains("backup_file"));
    }

    #[tokio::test]
    async fn test_connection_failure_fails_every_table_of_job() {
        let (local, _) = databases();
        let connector = MemoryConnector::new().with_database("pl_db", local);
        let config = Config::from_yaml(CONFIG).unwrap();

        let report = Orchestrator::new(config, Arc::new(connector))
            .run()
            .await
            .unwrap();

        assert_eq!(report.status, "completed_with_errors");
        assert_eq!(report.failed_tables(), vec!["nightly/T"]);
        assert!(report.tables[0].error.is_some());
    }
}
