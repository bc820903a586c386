//! Oracle driver built on the `oracle` crate (ODPI-C).
//!
//! The crate is blocking, so every call runs on tokio's blocking pool.
//! Cursors are served by a producer task that fills one page at a time and
//! hands it over a channel of capacity one; dropping the cursor closes the
//! channel, the producer stops and its session goes back to the pool.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use oracle::pool::{Pool, PoolBuilder};
use oracle::sql_type::{OracleType, ToSql};
use oracle::Connection;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::core::{
    column_header, BatchWriter, CatalogColumn, Connector, Constraint, ConstraintKind, Database,
    Row, RowCursor, SelectQuery, Statement, TableRef, Value,
};
use crate::dialect::{CatalogQuery, OracleDialect};
use crate::endpoint::Endpoint;
use crate::error::{Result, SyncError};

/// Sessions per endpoint pool.
const POOL_SIZE: u32 = 4;

/// Decimals are bound as text; pin the separator so they parse the same everywhere.
const SESSION_INIT: &str = "ALTER SESSION SET NLS_NUMERIC_CHARACTERS = '.,'";

/// Opens session pools for resolved endpoints.
#[derive(Debug, Clone, Default)]
pub struct OracleConnector;

impl OracleConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for OracleConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Database>> {
        endpoint.validate()?;

        let label = endpoint.to_string();
        let user = endpoint.user.clone();
        let password = endpoint.password.clone();
        let connect_string = endpoint.connect_string();

        let pool = tokio::task::spawn_blocking(move || {
            PoolBuilder::new(user, password, connect_string)
                .max_connections(POOL_SIZE)
                .build()
        })
        .await
        .map_err(|e| SyncError::connection(&label, e))?
        .map_err(|e| SyncError::connection(&label, e))?;

        debug!("Connected to {}", label);
        Ok(Arc::new(OracleDatabase {
            dsn: endpoint.dsn(),
            label,
            pool,
            dialect: OracleDialect::new(),
        }))
    }
}

/// A pooled Oracle endpoint.
pub struct OracleDatabase {
    dsn: String,
    label: String,
    pool: Pool,
    dialect: OracleDialect,
}

impl OracleDatabase {
    /// Run `f` with a pooled session on the blocking pool.
    async fn with_session<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        let label = self.label.clone();
        tokio::task::spawn_blocking(move || {
            let conn = checkout(&pool, &label)?;
            f(&conn)
        })
        .await
        .map_err(|e| SyncError::connection(&self.label, e))?
    }

    async fn catalog_rows<T, F>(&self, query: CatalogQuery, map: F) -> Result<Vec<T>>
    where
        F: Fn(&oracle::Row) -> oracle::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        debug!("{}", query.sql);
        self.with_session(move |conn| {
            let binds: Vec<&dyn ToSql> = query.binds.iter().map(|b| b as &dyn ToSql).collect();
            let rows = conn
                .query(&query.sql, &binds)
                .map_err(|e| SyncError::query(&query.sql, e))?;
            rows.map(|row| row.and_then(|r| map(&r)))
                .collect::<oracle::Result<Vec<T>>>()
                .map_err(|e| SyncError::query(&query.sql, e))
        })
        .await
    }
}

fn checkout(pool: &Pool, label: &str) -> Result<Connection> {
    let conn = pool.get().map_err(|e| SyncError::connection(label, e))?;
    conn.execute(SESSION_INIT, &[])
        .map_err(|e| SyncError::query(SESSION_INIT, e))?;
    Ok(conn)
}

#[async_trait]
impl Database for OracleDatabase {
    fn dsn(&self) -> &str {
        &self.dsn
    }

    async fn columns(&self, table: &TableRef) -> Result<Vec<CatalogColumn>> {
        let query = self.dialect.columns_query(table);
        self.catalog_rows(query, |row| {
            let nullable: String = row.get(5)?;
            let identity: Option<String> = row.get(7)?;
            Ok(CatalogColumn {
                name: row.get(0)?,
                data_type: row.get(1)?,
                data_length: row.get(2)?,
                data_precision: row.get(3)?,
                data_scale: row.get(4)?,
                nullable: nullable == "Y",
                column_id: row.get(6)?,
                identity: identity.as_deref() == Some("YES"),
            })
        })
        .await
    }

    async fn constraints(&self, table: &TableRef) -> Result<Vec<Constraint>> {
        type ConsRow = (
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
        );

        let query = self.dialect.constraints_query(table);
        let rows: Vec<ConsRow> = self
            .catalog_rows(query, |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })
            .await?;

        let mut constraints: Vec<Constraint> = Vec::new();
        for (name, code, r_owner, r_name, condition, column) in rows {
            let Some(kind) = ConstraintKind::from_code(&code) else {
                continue;
            };
            match constraints.last_mut() {
                Some(last) if last.name == name => last.columns.extend(column),
                _ => constraints.push(Constraint {
                    name,
                    kind,
                    columns: column.into_iter().collect(),
                    r_owner,
                    r_constraint_name: r_name,
                    search_condition: condition,
                }),
            }
        }
        Ok(constraints)
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        let query = self.dialect.table_exists_query(table);
        let found = self
            .catalog_rows(query, |row| row.get::<_, String>(0))
            .await?;
        Ok(!found.is_empty())
    }

    async fn row_count(&self, table: &TableRef) -> Result<i64> {
        let sql = self.dialect.row_count(table);
        debug!("{}", sql);
        self.with_session(move |conn| {
            conn.query_row_as::<i64>(&sql, &[])
                .map_err(|e| SyncError::query(&sql, e))
        })
        .await
    }

    async fn open_cursor(
        &self,
        query: &SelectQuery,
        page_size: usize,
    ) -> Result<Box<dyn RowCursor>> {
        let sql = self.dialect.select(query);
        debug!("{}", sql);

        let page_size = page_size.max(1);
        let (header_tx, header_rx) = oneshot::channel();
        let (page_tx, page_rx) = mpsc::channel(1);
        let pool = self.pool.clone();
        let label = self.label.clone();

        tokio::task::spawn_blocking(move || {
            let mut header = Some(header_tx);
            if let Err(e) = produce_pages(&pool, &label, &sql, page_size, &mut header, &page_tx) {
                match header.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(e));
                    }
                    None => {
                        let _ = page_tx.blocking_send(Err(e));
                    }
                }
            }
        });

        let columns = header_rx
            .await
            .map_err(|e| SyncError::connection(&self.label, e))??;

        Ok(Box::new(OracleCursor {
            columns,
            pages: page_rx,
        }))
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        let sql = self.dialect.statement(statement);
        debug!("{}", sql);
        self.with_session(move |conn| {
            let stmt = conn
                .execute(&sql, &[])
                .map_err(|e| SyncError::query(&sql, e))?;
            let affected = stmt.row_count().map_err(|e| SyncError::query(&sql, e))?;
            conn.commit().map_err(|e| SyncError::query("COMMIT", e))?;
            Ok(affected)
        })
        .await
    }

    async fn begin_insert(&self, table: &str, columns: &[String]) -> Result<Box<dyn BatchWriter>> {
        let sql = self.dialect.insert(table, columns);
        debug!("{}", sql);

        let pool = self.pool.clone();
        let label = self.label.clone();
        let conn = tokio::task::spawn_blocking(move || checkout(&pool, &label))
            .await
            .map_err(|e| SyncError::connection(&self.label, e))??;

        Ok(Box::new(OracleWriter {
            conn: Some(conn),
            sql,
            label: self.label.clone(),
        }))
    }

    async fn close(&self) {
        let pool = self.pool.clone();
        let _ = tokio::task::spawn_blocking(move || pool.close(&oracle::pool::CloseMode::Default))
            .await;
    }
}

/// Producer side of a cursor. Runs on the blocking pool.
fn produce_pages(
    pool: &Pool,
    label: &str,
    sql: &str,
    page_size: usize,
    header: &mut Option<oneshot::Sender<Result<Arc<[String]>>>>,
    pages: &mpsc::Sender<Result<Vec<Row>>>,
) -> Result<()> {
    let query_err = |e: oracle::Error| SyncError::query(sql, e);

    let conn = checkout(pool, label)?;
    let mut stmt = conn
        .statement(sql)
        .fetch_array_size(page_size as u32)
        .build()
        .map_err(query_err)?;
    let rows = stmt.query(&[]).map_err(query_err)?;

    let types: Vec<OracleType> = rows
        .column_info()
        .iter()
        .map(|c| c.oracle_type().clone())
        .collect();
    let columns = column_header(rows.column_info().iter().map(|c| c.name()));

    match header.take() {
        Some(tx) => {
            if tx.send(Ok(columns.clone())).is_err() {
                return Ok(());
            }
        }
        None => return Ok(()),
    }

    let mut page = Vec::with_capacity(page_size);
    for row in rows {
        let row = row.map_err(query_err)?;
        let values = types
            .iter()
            .enumerate()
            .map(|(i, ty)| read_value(&row, i, ty))
            .collect::<oracle::Result<Vec<_>>>()
            .map_err(query_err)?;
        page.push(Row::new(columns.clone(), values));

        if page.len() == page_size {
            let full = std::mem::replace(&mut page, Vec::with_capacity(page_size));
            if pages.blocking_send(Ok(full)).is_err() {
                // Consumer dropped the cursor
                return Ok(());
            }
        }
    }

    // Final short (possibly empty) page marks the end.
    let _ = pages.blocking_send(Ok(page));
    Ok(())
}

/// Read one column according to its declared type.
fn read_value(row: &oracle::Row, idx: usize, ty: &OracleType) -> oracle::Result<Value> {
    let value = match ty {
        OracleType::Number(_, _) | OracleType::Float(_) => {
            row.get::<_, Option<String>>(idx)?.map(|s| parse_number(&s))
        }
        OracleType::Int64 => row.get::<_, Option<i64>>(idx)?.map(Value::Int),
        OracleType::BinaryFloat | OracleType::BinaryDouble => {
            row.get::<_, Option<f64>>(idx)?.map(Value::Float)
        }
        OracleType::Date | OracleType::Timestamp(_) => {
            row.get::<_, Option<NaiveDateTime>>(idx)?.map(Value::DateTime)
        }
        OracleType::TimestampTZ(_) | OracleType::TimestampLTZ(_) => row
            .get::<_, Option<DateTime<FixedOffset>>>(idx)?
            .map(Value::DateTimeTz),
        OracleType::Raw(_) | OracleType::BLOB | OracleType::LongRaw => {
            row.get::<_, Option<Vec<u8>>>(idx)?.map(Value::Bytes)
        }
        _ => row.get::<_, Option<String>>(idx)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn parse_number(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::Int(i);
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map(Value::Decimal)
        .unwrap_or_else(|_| Value::Text(text.to_string()))
}

struct OracleCursor {
    columns: Arc<[String]>,
    pages: mpsc::Receiver<Result<Vec<Row>>>,
}

#[async_trait]
impl RowCursor for OracleCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn fetch_page(&mut self) -> Result<Vec<Row>> {
        match self.pages.recv().await {
            Some(page) => page,
            None => Ok(Vec::new()),
        }
    }
}

/// An open transaction on a dedicated session.
struct OracleWriter {
    conn: Option<Connection>,
    sql: String,
    label: String,
}

impl OracleWriter {
    fn take_conn(&mut self) -> Result<Connection> {
        self.conn
            .take()
            .ok_or_else(|| SyncError::connection(&self.label, "session lost after a failed call"))
    }
}

#[async_trait]
impl BatchWriter for OracleWriter {
    async fn insert_batch(&mut self, rows: Vec<Vec<Value>>) -> Result<u64> {
        let conn = self.take_conn()?;
        let sql = self.sql.clone();
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = insert_rows(&conn, &sql, &rows);
            (conn, result)
        })
        .await
        .map_err(|e| SyncError::connection(&self.label, e))?;
        self.conn = Some(conn);
        result
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let conn = self.take_conn()?;
        tokio::task::spawn_blocking(move || conn.commit())
            .await
            .map_err(|e| SyncError::connection(&self.label, e))?
            .map_err(|e| SyncError::query("COMMIT", e))
    }
}

impl Drop for OracleWriter {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("Rolling back uncommitted inserts on {}", self.label);
            let rollback = move || {
                if let Err(e) = conn.rollback() {
                    warn!("Rollback failed: {}", e);
                }
            };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(rollback);
                }
                Err(_) => rollback(),
            }
        }
    }
}

/// Execute one array insert for `rows`.
fn insert_rows(conn: &Connection, sql: &str, rows: &[Vec<Value>]) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }
    let query_err = |e: oracle::Error| SyncError::query(sql, e);

    let mut batch = conn.batch(sql, rows.len()).build().map_err(query_err)?;
    let width = rows[0].len();
    let types: Vec<Option<OracleType>> = (0..width)
        .map(|col| bind_type(rows.iter().map(|r| &r[col])))
        .collect();
    for (col, ty) in types.iter().enumerate() {
        if let Some(ty) = ty {
            batch.set_type(col + 1, ty).map_err(query_err)?;
        }
    }

    for row in rows {
        let owned: Vec<Box<dyn ToSql>> = row
            .iter()
            .zip(&types)
            .map(|(value, ty)| to_sql(&coerce(value, ty.as_ref())))
            .collect();
        let params: Vec<&dyn ToSql> = owned.iter().map(|b| b.as_ref()).collect();
        batch.append_row(&params).map_err(query_err)?;
    }
    batch.execute().map_err(query_err)?;
    Ok(rows.len() as u64)
}

/// Bind type for one column of a batch.
///
/// Int and Float widen to BINARY_DOUBLE. A Decimal or text value next to
/// numbers turns the column into VARCHAR2 sized over every value's text, and
/// the server converts on insert.
fn bind_type<'a>(values: impl Iterator<Item = &'a Value>) -> Option<OracleType> {
    let mut ty: Option<OracleType> = None;
    let mut width = 1u32;
    for value in values {
        let (kind, len) = match value {
            Value::Null => continue,
            Value::Int(i) => (OracleType::Int64, i.to_string().len()),
            Value::Float(f) => (OracleType::BinaryDouble, f.to_string().len()),
            Value::Decimal(d) => (OracleType::Varchar2(0), d.to_string().len()),
            Value::Text(s) => (OracleType::Varchar2(0), s.len()),
            Value::Bytes(b) => (OracleType::Raw(0), b.len()),
            Value::DateTime(_) => (OracleType::Timestamp(9), 0),
            Value::DateTimeTz(_) => (OracleType::TimestampTZ(9), 0),
        };
        width = width.max(len as u32);
        ty = Some(match ty {
            None => kind,
            Some(current) => widen(current, kind),
        });
    }
    ty.map(|t| match t {
        OracleType::Varchar2(_) => OracleType::Varchar2(width),
        OracleType::Raw(_) => OracleType::Raw(width),
        other => other,
    })
}

fn widen(current: OracleType, next: OracleType) -> OracleType {
    use OracleType::{BinaryDouble, Int64, Varchar2};
    match (current, next) {
        (Int64, BinaryDouble) | (BinaryDouble, Int64) => BinaryDouble,
        (Varchar2(_), Int64 | BinaryDouble) | (Int64 | BinaryDouble, Varchar2(_)) => Varchar2(0),
        (current, _) => current,
    }
}

/// Convert a value to the column's bind type where numbers were widened.
fn coerce(value: &Value, ty: Option<&OracleType>) -> Value {
    match (value, ty) {
        (Value::Int(i), Some(OracleType::BinaryDouble)) => Value::Float(*i as f64),
        (Value::Int(i), Some(OracleType::Varchar2(_))) => Value::Text(i.to_string()),
        (Value::Float(f), Some(OracleType::Varchar2(_))) => Value::Text(f.to_string()),
        (other, _) => other.clone(),
    }
}

fn to_sql(value: &Value) -> Box<dyn ToSql> {
    match value {
        Value::Null => Box::new(None::<String>),
        Value::Int(i) => Box::new(*i),
        Value::Float(f) => Box::new(*f),
        Value::Decimal(d) => Box::new(d.to_string()),
        Value::Text(s) => Box::new(s.clone()),
        Value::Bytes(b) => Box::new(b.clone()),
        Value::DateTime(t) => Box::new(*t),
        Value::DateTimeTz(t) => Box::new(*t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), Value::Int(42));
        assert_eq!(parse_number("-7"), Value::Int(-7));
        assert_eq!(parse_number("10.25"), Value::Decimal(Decimal::new(1025, 2)));
        assert_eq!(parse_number("1.5E+3"), Value::Decimal(Decimal::new(1500, 0)));
        assert_eq!(parse_number("n/a"), Value::Text("n/a".into()));
    }

    #[test]
    fn test_bind_type_skips_nulls_and_uses_widest_text() {
        let values = vec![Value::Null, Value::from("ab"), Value::from("abcdef")];
        assert_eq!(bind_type(values.iter()), Some(OracleType::Varchar2(6)));

        let ints = vec![Value::Null, Value::Int(1)];
        assert_eq!(bind_type(ints.iter()), Some(OracleType::Int64));

        let nulls = vec![Value::Null];
        assert_eq!(bind_type(nulls.iter()), None);
    }

    #[test]
    fn test_bind_type_mixed_numbers() {
        let amounts = vec![Value::Int(100), Value::Decimal(Decimal::new(1250, 2))];
        let ty = bind_type(amounts.iter());
        assert_eq!(ty, Some(OracleType::Varchar2(5)));
        assert_eq!(coerce(&amounts[0], ty.as_ref()), Value::Text("100".into()));
        assert_eq!(
            coerce(&amounts[1], ty.as_ref()),
            Value::Decimal(Decimal::new(1250, 2))
        );

        let reversed = vec![Value::Decimal(Decimal::new(15, 1)), Value::Int(123456)];
        assert_eq!(bind_type(reversed.iter()), Some(OracleType::Varchar2(6)));

        let floats = vec![Value::Int(1), Value::Float(2.5)];
        let ty = bind_type(floats.iter());
        assert_eq!(ty, Some(OracleType::BinaryDouble));
        assert_eq!(coerce(&floats[0], ty.as_ref()), Value::Float(1.0));
    }
}
