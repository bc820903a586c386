//! Core abstractions shared by the engine and the drivers.
//!
//! - [`schema`]: table references, catalog metadata and reconciled column sets
//! - [`value`]: column values and rows
//! - [`query`]: typed SELECT queries and statements
//! - [`traits`]: the database, cursor, writer and connector seams
//!
//! The engine only ever talks to an endpoint through [`Database`], so the
//! Oracle driver and the in-memory driver are interchangeable.

pub mod query;
pub mod schema;
pub mod traits;
pub mod value;

pub use query::{AntiJoin, SelectQuery, Statement};
pub use schema::{CatalogColumn, ColumnSet, Constraint, ConstraintKind, Projection, TableRef};
pub use traits::{BatchWriter, Connector, Database, RowCursor};
pub use value::{column_header, Row, Value};
