//! SQL rendering.
//!
//! The engine describes work as typed [`SelectQuery`](crate::core::SelectQuery)
//! and [`Statement`](crate::core::Statement) values. [`OracleDialect`] turns
//! them, and the catalog lookups the introspector needs, into Oracle SQL.
//! Catalog views are addressed through the table's link suffix so metadata of
//! a remote table is read over the same database link as its rows.

mod oracle;

pub use oracle::{CatalogQuery, OracleDialect};
