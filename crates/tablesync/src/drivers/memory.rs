//! In-process driver.
//!
//! [`MemoryDatabase`] keeps tables in memory and evaluates the typed queries
//! and statements the engine issues, with the same observable contract as a
//! real endpoint: paged cursors, identity generation, transactional batch
//! writers. It also counts fetches and insert batches and can be told to fail
//! at a chosen point, which is what the engine's tests rely on.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::core::{
    column_header, BatchWriter, CatalogColumn, Connector, Constraint, Database, Row, RowCursor,
    SelectQuery, Statement, TableRef, Value,
};
use crate::endpoint::Endpoint;
use crate::error::{Result, SyncError};

/// A failure to inject. Each one fires once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The next `insert_batch` after this many successful ones fails.
    InsertAfterBatches(usize),

    /// The next page fetch after this many successful ones fails.
    FetchAfterPages(usize),

    /// The next `TRUNCATE` fails.
    Truncate,

    /// The next `INSERT ... SELECT` fails.
    InsertSelect,
}

/// Counters observed by tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    /// Page fetches across all cursors.
    pub page_fetches: usize,

    /// Cursors currently open.
    pub open_cursors: usize,

    /// Row count of every `insert_batch` call, in order.
    pub insert_batches: Vec<usize>,

    /// Committed writer transactions.
    pub commits: usize,

    /// Statements executed, in order.
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Default)]
struct MemTable {
    columns: Vec<CatalogColumn>,
    constraints: Vec<Constraint>,
    rows: Vec<Vec<Value>>,
    next_identity: i64,
}

impl MemTable {
    fn position(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))
    }

    /// Append rows whose values follow `positions`; other columns get
    /// generated identities or NULL.
    fn append(&mut self, positions: &[usize], rows: Vec<Vec<Value>>) {
        for values in rows {
            let mut full = vec![Value::Null; self.columns.len()];
            for (i, col) in self.columns.iter().enumerate() {
                if col.identity && !positions.contains(&i) {
                    self.next_identity += 1;
                    full[i] = Value::Int(self.next_identity);
                }
            }
            for (pos, value) in positions.iter().zip(values) {
                full[*pos] = value;
            }
            self.rows.push(full);
        }
    }
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, MemTable>,
    stats: MemoryStats,
    fail_insert_after: Option<usize>,
    fail_fetch_after: Option<usize>,
    fail_truncate: bool,
    fail_insert_select: bool,
}

impl State {
    fn table(&self, name: &str) -> Result<&MemTable> {
        self.tables
            .get(&name.to_uppercase())
            .ok_or_else(|| missing_table(name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable> {
        self.tables
            .get_mut(&name.to_uppercase())
            .ok_or_else(|| missing_table(name))
    }

    /// Evaluate a SELECT into its header and rows.
    fn select(&self, query: &SelectQuery) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
        let source = self.table(&query.from)?;
        let positions = query
            .projection
            .iter()
            .map(|p| {
                source
                    .position(&p.column)
                    .ok_or_else(|| invalid_identifier(&query.from, &p.column))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut rows: Vec<Vec<Value>> = source.rows.clone();

        if let Some(anti) = &query.except {
            let other = self.table(&anti.table)?;
            let mut src_pos = Vec::new();
            let mut dst_pos = Vec::new();
            for (src, dst) in &anti.keys {
                src_pos.push(
                    source
                        .position(src)
                        .ok_or_else(|| invalid_identifier(&query.from, src))?,
                );
                dst_pos.push(
                    other
                        .position(dst)
                        .ok_or_else(|| invalid_identifier(&anti.table, dst))?,
                );
            }
            let existing: HashSet<Vec<Value>> = other
                .rows
                .iter()
                .map(|r| dst_pos.iter().map(|&i| r[i].clone()).collect())
                .collect();
            rows.retain(|r| {
                let key: Vec<Value> = src_pos.iter().map(|&i| r[i].clone()).collect();
                !existing.contains(&key)
            });
        }

        let mut projected: Vec<Vec<Value>> = rows
            .into_iter()
            .map(|r| positions.iter().map(|&i| r[i].clone()).collect())
            .collect();

        if query.is_full_row_difference() {
            // MINUS is a set operation
            let mut seen = HashSet::new();
            projected.retain(|r| seen.insert(r.clone()));
        }

        Ok((query.output_names(), projected))
    }
}

fn missing_table(name: &str) -> SyncError {
    SyncError::query(name, "ORA-00942: table or view does not exist")
}

fn invalid_identifier(table: &str, column: &str) -> SyncError {
    SyncError::query(
        table,
        format!("ORA-00904: \"{}\": invalid identifier", column),
    )
}

/// An in-memory database endpoint.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    dsn: String,
    state: Arc<Mutex<State>>,
}

impl MemoryDatabase {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create (or replace) a table. `name` is the fully qualified name.
    pub fn create_table(&self, name: &str, columns: Vec<CatalogColumn>) {
        self.state().tables.insert(
            name.to_uppercase(),
            MemTable {
                columns,
                ..Default::default()
            },
        );
    }

    /// Attach a constraint to an existing table.
    pub fn add_constraint(&self, name: &str, constraint: Constraint) {
        if let Ok(table) = self.state().table_mut(name) {
            table.constraints.push(constraint);
        }
    }

    /// Append full rows (every column, in catalog order) to a table.
    pub fn insert_rows<I>(&self, name: &str, rows: I)
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let mut state = self.state();
        if let Ok(table) = state.table_mut(name) {
            let all: Vec<usize> = (0..table.columns.len()).collect();
            for row in rows {
                for (col, value) in table.columns.iter().zip(&row) {
                    if let (true, Value::Int(id)) = (col.identity, value) {
                        table.next_identity = table.next_identity.max(*id);
                    }
                }
                table.append(&all, vec![row]);
            }
        }
    }

    /// Whether a table exists.
    pub fn has_table(&self, name: &str) -> bool {
        self.state().tables.contains_key(&name.to_uppercase())
    }

    /// Current rows of a table, empty if unknown.
    pub fn rows(&self, name: &str) -> Vec<Vec<Value>> {
        self.state()
            .table(name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Values of one column, empty if unknown.
    pub fn column_values(&self, name: &str, column: &str) -> Vec<Value> {
        let state = self.state();
        match state.table(name) {
            Ok(table) => match table.position(column) {
                Some(i) => table.rows.iter().map(|r| r[i].clone()).collect(),
                None => Vec::new(),
            },
            Err(_) => Vec::new(),
        }
    }

    /// Number of rows in a table, zero if unknown.
    pub fn row_total(&self, name: &str) -> usize {
        self.state().table(name).map(|t| t.rows.len()).unwrap_or(0)
    }

    /// Catalog columns of a table.
    pub fn catalog(&self, name: &str) -> Vec<CatalogColumn> {
        self.state()
            .table(name)
            .map(|t| t.columns.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> MemoryStats {
        self.state().stats.clone()
    }

    /// Arm a one-shot failure.
    pub fn fail(&self, failure: Failure) {
        let mut state = self.state();
        match failure {
            Failure::InsertAfterBatches(n) => state.fail_insert_after = Some(n),
            Failure::FetchAfterPages(n) => state.fail_fetch_after = Some(n),
            Failure::Truncate => state.fail_truncate = true,
            Failure::InsertSelect => state.fail_insert_select = true,
        }
    }

    fn apply(&self, statement: &Statement) -> Result<u64> {
        let mut state = self.state();
        state.stats.statements.push(statement.clone());

        match statement {
            Statement::Truncate { table } => {
                if std::mem::take(&mut state.fail_truncate) {
                    return Err(SyncError::query(
                        format!("TRUNCATE TABLE {}", table),
                        "ORA-00054: resource busy",
                    ));
                }
                state.table_mut(table)?.rows.clear();
                Ok(0)
            }
            Statement::CreateTable { table, columns } => {
                if state.tables.contains_key(&table.to_uppercase()) {
                    return Err(SyncError::query(
                        format!("CREATE TABLE {}", table),
                        "ORA-00955: name is already used by an existing object",
                    ));
                }
                let mut columns = columns.clone();
                columns.sort_by_key(|c| c.column_id);
                state.tables.insert(
                    table.to_uppercase(),
                    MemTable {
                        columns,
                        ..Default::default()
                    },
                );
                Ok(0)
            }
            Statement::CreateTableAs { table, query } => {
                if state.tables.contains_key(&table.to_uppercase()) {
                    return Err(SyncError::query(
                        format!("CREATE TABLE {}", table),
                        "ORA-00955: name is already used by an existing object",
                    ));
                }
                let source = state.table(&query.from)?.columns.clone();
                let (names, rows) = state.select(query)?;
                let columns = query
                    .projection
                    .iter()
                    .zip(&names)
                    .enumerate()
                    .map(|(i, (p, name))| {
                        let mut col = source
                            .iter()
                            .find(|c| c.name.eq_ignore_ascii_case(&p.column))
                            .cloned()
                            .unwrap_or_else(|| CatalogColumn::new(name, "VARCHAR2", 0));
                        col.name = name.clone();
                        col.column_id = i as i64 + 1;
                        col.identity = false;
                        col
                    })
                    .collect();
                let count = rows.len() as u64;
                state.tables.insert(
                    table.to_uppercase(),
                    MemTable {
                        columns,
                        rows,
                        ..Default::default()
                    },
                );
                Ok(count)
            }
            Statement::RenameColumn { table, from, to } => {
                let target = state.table_mut(table)?;
                let pos = target
                    .position(from)
                    .ok_or_else(|| invalid_identifier(table, from))?;
                target.columns[pos].name = to.to_uppercase();
                Ok(0)
            }
            Statement::InsertSelect {
                table,
                columns,
                query,
            } => {
                if std::mem::take(&mut state.fail_insert_select) {
                    return Err(SyncError::query(
                        format!("INSERT INTO {}", table),
                        "ORA-01722: invalid number",
                    ));
                }
                let (_, rows) = state.select(query)?;
                let target = state.table_mut(table)?;
                let positions = columns
                    .iter()
                    .map(|c| target.position(c).ok_or_else(|| invalid_identifier(table, c)))
                    .collect::<Result<Vec<_>>>()?;
                let count = rows.len() as u64;
                target.append(&positions, rows);
                Ok(count)
            }
        }
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn dsn(&self) -> &str {
        &self.dsn
    }

    async fn columns(&self, table: &TableRef) -> Result<Vec<CatalogColumn>> {
        let mut columns = self.catalog(&table.qualified());
        columns.sort_by_key(|c| c.column_id);
        Ok(columns)
    }

    async fn constraints(&self, table: &TableRef) -> Result<Vec<Constraint>> {
        Ok(self
            .state()
            .table(&table.qualified())
            .map(|t| t.constraints.clone())
            .unwrap_or_default())
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        Ok(self.has_table(&table.qualified()))
    }

    async fn row_count(&self, table: &TableRef) -> Result<i64> {
        Ok(self.state().table(&table.qualified())?.rows.len() as i64)
    }

    async fn open_cursor(
        &self,
        query: &SelectQuery,
        page_size: usize,
    ) -> Result<Box<dyn RowCursor>> {
        let mut state = self.state();
        let (names, rows) = state.select(query)?;
        state.stats.open_cursors += 1;
        debug!("{}: cursor opened over {}", self.dsn, query.from);

        Ok(Box::new(MemoryCursor {
            db: self.clone(),
            columns: column_header(&names),
            rows: rows.into_iter(),
            page_size: page_size.max(1),
        }))
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        self.apply(statement)
    }

    async fn begin_insert(&self, table: &str, columns: &[String]) -> Result<Box<dyn BatchWriter>> {
        let state = self.state();
        let target = state.table(table)?;
        for column in columns {
            if target.position(column).is_none() {
                return Err(invalid_identifier(table, column));
            }
        }
        drop(state);

        Ok(Box::new(MemoryWriter {
            db: self.clone(),
            table: table.to_string(),
            columns: columns.to_vec(),
            pending: Vec::new(),
        }))
    }
}

struct MemoryCursor {
    db: MemoryDatabase,
    columns: Arc<[String]>,
    rows: std::vec::IntoIter<Vec<Value>>,
    page_size: usize,
}

#[async_trait]
impl RowCursor for MemoryCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn fetch_page(&mut self) -> Result<Vec<Row>> {
        {
            let mut state = self.db.state();
            state.stats.page_fetches += 1;
            match state.fail_fetch_after {
                Some(0) => {
                    state.fail_fetch_after = None;
                    return Err(SyncError::query(
                        "FETCH",
                        "ORA-03113: end-of-file on communication channel",
                    ));
                }
                Some(n) => state.fail_fetch_after = Some(n - 1),
                None => {}
            }
        }

        Ok(self
            .rows
            .by_ref()
            .take(self.page_size)
            .map(|values| Row::new(self.columns.clone(), values))
            .collect())
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        let mut state = self.db.state();
        state.stats.open_cursors = state.stats.open_cursors.saturating_sub(1);
    }
}

struct MemoryWriter {
    db: MemoryDatabase,
    table: String,
    columns: Vec<String>,
    pending: Vec<Vec<Value>>,
}

#[async_trait]
impl BatchWriter for MemoryWriter {
    async fn insert_batch(&mut self, rows: Vec<Vec<Value>>) -> Result<u64> {
        let mut state = self.db.state();
        state.stats.insert_batches.push(rows.len());
        match state.fail_insert_after {
            Some(0) => {
                state.fail_insert_after = None;
                return Err(SyncError::query(
                    format!("INSERT INTO {}", self.table),
                    "ORA-12899: value too large for column",
                ));
            }
            Some(n) => state.fail_insert_after = Some(n - 1),
            None => {}
        }
        let count = rows.len() as u64;
        self.pending.extend(rows);
        Ok(count)
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        let mut state = self.db.state();
        let target = state.table_mut(&self.table)?;
        let positions = self
            .columns
            .iter()
            .map(|c| {
                target
                    .position(c)
                    .ok_or_else(|| invalid_identifier(&self.table, c))
            })
            .collect::<Result<Vec<_>>>()?;
        target.append(&positions, pending);
        state.stats.commits += 1;
        Ok(())
    }
}

/// Connector handing out registered [`MemoryDatabase`]s by profile name.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    databases: HashMap<String, MemoryDatabase>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the database behind a connection profile.
    pub fn with_database(mut self, profile: &str, db: MemoryDatabase) -> Self {
        self.databases.insert(profile.to_string(), db);
        self
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Database>> {
        endpoint.validate()?;
        let db = self
            .databases
            .get(&endpoint.profile)
            .cloned()
            .ok_or_else(|| {
                SyncError::connection(endpoint.to_string(), "no in-memory database registered")
            })?;
        Ok(Arc::new(db))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Projection;

    fn people() -> MemoryDatabase {
        let db = MemoryDatabase::new("mem://people");
        db.create_table(
            "PEOPLE",
            vec![
                CatalogColumn::new("ID", "NUMBER", 1).identity(),
                CatalogColumn::new("NAME", "VARCHAR2", 2).with_length(20),
            ],
        );
        db.insert_rows(
            "PEOPLE",
            vec![
                vec![Value::Int(1), Value::from("ann")],
                vec![Value::Int(2), Value::from("bob")],
            ],
        );
        db
    }

    #[tokio::test]
    async fn test_writer_generates_identity_on_commit() {
        let db = people();
        let mut writer = db
            .begin_insert("PEOPLE", &["NAME".to_string()])
            .await
            .unwrap();
        writer.insert_batch(vec![vec![Value::from("cid")]]).await.unwrap();
        assert_eq!(db.row_total("PEOPLE"), 2);

        writer.commit().await.unwrap();
        assert_eq!(
            db.column_values("PEOPLE", "ID"),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }

    #[tokio::test]
    async fn test_dropped_writer_rolls_back() {
        let db = people();
        {
            let mut writer = db
                .begin_insert("PEOPLE", &["NAME".to_string()])
                .await
                .unwrap();
            writer.insert_batch(vec![vec![Value::from("x")]]).await.unwrap();
        }
        assert_eq!(db.row_total("PEOPLE"), 2);
        assert_eq!(db.stats().commits, 0);
    }

    #[tokio::test]
    async fn test_select_with_alias_and_except() {
        let db = people();
        db.create_table("SEEN", vec![CatalogColumn::new("NAME", "VARCHAR2", 1)]);
        db.insert_rows("SEEN", vec![vec![Value::from("ann")]]);

        let query = SelectQuery::projected(
            &TableRef::new("PEOPLE", "", ""),
            vec![Projection::aliased("NAME", "WHO")],
        )
        .except(&TableRef::new("SEEN", "", ""), vec![("NAME".into(), "NAME".into())]);

        let mut cursor = db.open_cursor(&query, 10).await.unwrap();
        assert_eq!(cursor.columns(), &["WHO".to_string()]);
        let page = cursor.fetch_page().await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].get("WHO"), Some(&Value::from("bob")));
    }

    #[tokio::test]
    async fn test_unknown_table_is_query_error() {
        let db = MemoryDatabase::new("mem://x");
        let err = db.row_count(&TableRef::new("NOPE", "", "")).await.unwrap_err();
        assert!(matches!(err, SyncError::Query { .. }));
        assert!(db.columns(&TableRef::new("NOPE", "", "")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_truncate_failure_fires_once() {
        let db = people();
        db.fail(Failure::Truncate);
        let stmt = Statement::Truncate {
            table: "PEOPLE".into(),
        };
        assert!(db.execute(&stmt).await.is_err());
        assert!(db.execute(&stmt).await.is_ok());
        assert_eq!(db.row_total("PEOPLE"), 0);
    }
}
