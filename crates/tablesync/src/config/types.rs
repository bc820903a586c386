//! Configuration type definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

/// Default Oracle listener port.
pub const DEFAULT_PORT: u16 = 1521;

/// Default rows per fetched page and per inserted batch.
pub const DEFAULT_CHUNK_ROWS: usize = 5_000;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Logging and backup settings.
    #[serde(rename = "General", default)]
    pub general: GeneralConfig,

    /// Named endpoint profiles.
    #[serde(rename = "Connections", default)]
    pub connections: BTreeMap<String, ConnectionProfile>,

    /// Named sync jobs, in document order.
    #[serde(rename = "Sync", default, deserialize_with = "ordered_jobs")]
    pub sync: Vec<JobEntry>,
}

/// General settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Log level name: CRITICAL, ERROR, WARNING, INFO or DEBUG.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional log file, appended to in addition to stdout.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Root directory for table snapshots.
    #[serde(default = "default_backup_path")]
    pub backup_path: PathBuf,

    /// Rows per fetched page.
    #[serde(default)]
    pub page_size: Option<usize>,

    /// Rows per insert batch.
    #[serde(default)]
    pub batch_size: Option<usize>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
            backup_path: default_backup_path(),
            page_size: None,
            batch_size: None,
        }
    }
}

impl GeneralConfig {
    pub fn get_page_size(&self) -> usize {
        self.page_size.unwrap_or(DEFAULT_CHUNK_ROWS)
    }

    pub fn get_batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_CHUNK_ROWS)
    }
}

/// A named connection profile. Every attribute is optional at parse time;
/// required ones are checked when the endpoint is connected.
#[derive(Clone, Default, Deserialize)]
pub struct ConnectionProfile {
    /// Username.
    #[serde(default)]
    pub db_user: Option<String>,

    /// Password.
    #[serde(default)]
    pub db_password: Option<String>,

    /// Database host.
    #[serde(default)]
    pub db_host: Option<String>,

    /// Listener port (default: 1521).
    #[serde(default)]
    pub db_port: Option<u16>,

    /// Service name.
    #[serde(default)]
    pub db_name: Option<String>,

    /// Schema that qualifies table names.
    #[serde(default)]
    pub scheme_name: Option<String>,

    /// Database link appended to table names.
    #[serde(default)]
    pub postfix: Option<String>,

    /// Whether this profile is only reachable through a database link.
    #[serde(default)]
    pub dblink: bool,

    /// Profile whose credentials reach the link.
    #[serde(default)]
    pub avail_from: Option<String>,
}

impl ConnectionProfile {
    /// Overlay every attribute `other` defines on top of this profile.
    pub fn merged_with(&self, other: &ConnectionProfile) -> ConnectionProfile {
        fn pick<T: Clone>(base: &Option<T>, over: &Option<T>) -> Option<T> {
            over.clone().or_else(|| base.clone())
        }

        ConnectionProfile {
            db_user: pick(&self.db_user, &other.db_user),
            db_password: pick(&self.db_password, &other.db_password),
            db_host: pick(&self.db_host, &other.db_host),
            db_port: pick(&self.db_port, &other.db_port),
            db_name: pick(&self.db_name, &other.db_name),
            scheme_name: pick(&self.scheme_name, &other.scheme_name),
            postfix: pick(&self.postfix, &other.postfix),
            dblink: self.dblink,
            avail_from: self.avail_from.clone(),
        }
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("db_user", &self.db_user)
            .field("db_password", &self.db_password.as_ref().map(|_| "[REDACTED]"))
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_name", &self.db_name)
            .field("scheme_name", &self.scheme_name)
            .field("postfix", &self.postfix)
            .field("dblink", &self.dblink)
            .field("avail_from", &self.avail_from)
            .finish()
    }
}

/// Synchronization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Empty the destination and repopulate it from the source.
    #[default]
    Truncate,

    /// Insert only source rows whose key is missing in the destination.
    Diff,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Truncate => f.write_str("truncate"),
            SyncMode::Diff => f.write_str("diff"),
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "truncate" => Ok(SyncMode::Truncate),
            "diff" => Ok(SyncMode::Diff),
            other => Err(format!(
                "unknown sync mode '{}', expected 'truncate' or 'diff'",
                other
            )),
        }
    }
}

/// A sync job together with its configured name.
#[derive(Debug, Clone)]
pub struct JobEntry {
    pub name: String,
    pub job: SyncJobConfig,
}

/// One entry of the `Sync` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncJobConfig {
    /// Destination profile name.
    pub local_db: String,

    /// Source profile name.
    pub remote_db: String,

    /// Strategy (default: truncate).
    #[serde(default)]
    pub sync_type: SyncMode,

    /// Snapshot the destination before syncing (default: false).
    #[serde(default)]
    pub backup: bool,

    /// Keep snapshots for this many days.
    #[serde(default)]
    pub rotate: Option<u32>,

    /// Restore the destination if a truncate sync fails midway (default: true).
    #[serde(default = "default_true")]
    pub restore_on_failure: bool,

    /// Table pairs to synchronize.
    #[serde(default)]
    pub tables: Vec<TableMapping>,
}

impl SyncJobConfig {
    /// Ad-hoc single-table job used by the command-line override.
    pub fn manual(
        local_db: &str,
        remote_db: &str,
        sync_type: SyncMode,
        local_table: &str,
        remote_table: &str,
    ) -> Self {
        Self {
            local_db: local_db.to_string(),
            remote_db: remote_db.to_string(),
            sync_type,
            backup: true,
            rotate: Some(1),
            restore_on_failure: true,
            tables: vec![TableMapping::new(local_table, remote_table)],
        }
    }
}

/// A `{LOCAL: REMOTE}` table pair with optional diff key and column renames.
///
/// Written in YAML as a single mapping where every key except the reserved
/// ones (`diff_key`, `map_columns`, `only_mapped`) names the table pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Mapping")]
pub struct TableMapping {
    /// Destination table name.
    pub local: String,

    /// Source table name.
    pub remote: String,

    /// Key columns (local names) used by the diff strategy.
    pub diff_key: Option<Vec<String>>,

    /// Column renames as `(local, remote)` pairs, in document order.
    pub map_columns: Vec<(String, String)>,

    /// Transfer only the mapped columns.
    pub only_mapped: bool,
}

impl TableMapping {
    /// A plain table pair without key or renames.
    pub fn new(local: &str, remote: &str) -> Self {
        Self {
            local: local.to_uppercase(),
            remote: remote.to_uppercase(),
            diff_key: None,
            map_columns: Vec::new(),
            only_mapped: false,
        }
    }
}

impl TryFrom<Mapping> for TableMapping {
    type Error = String;

    fn try_from(map: Mapping) -> Result<Self, Self::Error> {
        let mut pair: Option<(String, String)> = None;
        let mut diff_key = None;
        let mut map_columns = Vec::new();
        let mut only_mapped = false;

        for (key, value) in map {
            let key = key
                .as_str()
                .ok_or_else(|| "table entry keys must be strings".to_string())?
                .to_string();

            match key.as_str() {
                "diff_key" | "diff_keys" => {
                    let keys: Vec<String> = serde_yaml::from_value(value)
                        .map_err(|e| format!("{}: {}", key, e))?;
                    diff_key = Some(keys.iter().map(|k| k.to_uppercase()).collect());
                }
                "map_columns" => {
                    let renames: Mapping = serde_yaml::from_value(value)
                        .map_err(|e| format!("map_columns: {}", e))?;
                    for (local, remote) in renames {
                        match (local.as_str(), remote.as_str()) {
                            (Some(l), Some(r)) => {
                                map_columns.push((l.to_uppercase(), r.to_uppercase()))
                            }
                            _ => return Err("map_columns entries must be strings".into()),
                        }
                    }
                }
                "only_mapped" => {
                    only_mapped = serde_yaml::from_value(value)
                        .map_err(|e| format!("only_mapped: {}", e))?;
                }
                _ => {
                    let remote = value
                        .as_str()
                        .ok_or_else(|| format!("table '{}' must map to a table name", key))?;
                    if let Some((existing, _)) = &pair {
                        return Err(format!(
                            "table entry names two tables: '{}' and '{}'",
                            existing, key
                        ));
                    }
                    pair = Some((key.clone(), remote.to_string()));
                }
            }
        }

        let (local, remote) =
            pair.ok_or_else(|| "table entry has no LOCAL: REMOTE pair".to_string())?;

        Ok(Self {
            diff_key,
            map_columns,
            only_mapped,
            ..TableMapping::new(&local, &remote)
        })
    }
}

/// Deserialize the `Sync` mapping preserving document order.
fn ordered_jobs<'de, D>(deserializer: D) -> Result<Vec<JobEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    struct JobsVisitor;

    impl<'de> Visitor<'de> for JobsVisitor {
        type Value = Vec<JobEntry>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping of job names to sync jobs")
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut jobs = Vec::new();
            while let Some((name, job)) = map.next_entry::<String, SyncJobConfig>()? {
                jobs.push(JobEntry { name, job });
            }
            Ok(jobs)
        }
    }

    deserializer.deserialize_any(JobsVisitor)
}

// Default value functions for serde
fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_backup_path() -> PathBuf {
    PathBuf::from("./backup")
}

fn default_true() -> bool {
    true
}
