//! Core traits for endpoint access.
//!
//! - [`Database`]: catalog reads, cursors, statements and batch writers on one endpoint
//! - [`RowCursor`]: a server-side cursor handing out fixed-size pages
//! - [`BatchWriter`]: a transaction accepting multi-row inserts
//! - [`Connector`]: builds a [`Database`] from a resolved endpoint
//!
//! Cursor and writer handles own their connection; dropping them releases it.
//! A writer dropped without [`BatchWriter::commit`] rolls back.

use std::sync::Arc;

use async_trait::async_trait;

use crate::endpoint::Endpoint;
use crate::error::Result;

use super::query::{SelectQuery, Statement};
use super::schema::{CatalogColumn, Constraint, TableRef};
use super::value::{Row, Value};

/// Access to one database endpoint.
#[async_trait]
pub trait Database: Send + Sync {
    /// Connection identity; equal strings mean the same physical instance.
    fn dsn(&self) -> &str;

    /// Catalog columns of a table ordered by column id. Empty if the table is unknown.
    async fn columns(&self, table: &TableRef) -> Result<Vec<CatalogColumn>>;

    /// Constraints declared on a table.
    async fn constraints(&self, table: &TableRef) -> Result<Vec<Constraint>>;

    /// Check if a table exists.
    async fn table_exists(&self, table: &TableRef) -> Result<bool>;

    /// Get the row count for a table.
    async fn row_count(&self, table: &TableRef) -> Result<i64>;

    /// Open a cursor over `query` that returns pages of `page_size` rows.
    async fn open_cursor(&self, query: &SelectQuery, page_size: usize)
        -> Result<Box<dyn RowCursor>>;

    /// Execute a statement and commit. Returns affected rows where known.
    async fn execute(&self, statement: &Statement) -> Result<u64>;

    /// Start a transaction inserting into `table` (`columns` in value order).
    async fn begin_insert(&self, table: &str, columns: &[String]) -> Result<Box<dyn BatchWriter>>;

    /// Close the connection pool.
    async fn close(&self) {}
}

/// A server-side cursor.
#[async_trait]
pub trait RowCursor: Send {
    /// Result column names (upper-cased).
    fn columns(&self) -> &[String];

    /// Fetch the next page. A page shorter than the page size (possibly
    /// empty) means the cursor is exhausted.
    async fn fetch_page(&mut self) -> Result<Vec<Row>>;
}

/// An open insert transaction.
#[async_trait]
pub trait BatchWriter: Send {
    /// Insert one batch with a single parameterized statement.
    async fn insert_batch(&mut self, rows: Vec<Vec<Value>>) -> Result<u64>;

    /// Commit everything inserted so far.
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Builds live database handles from resolved endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Validate the endpoint and open a pooled handle.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Database>>;
}
