//! Database driver implementations.
//!
//! This module provides implementations of the core traits:
//!
//! - [`oracle`]: Oracle through the `oracle` crate session pool (feature `oracle`)
//! - [`memory`]: an in-process database used by tests and dry runs
//!
//! Each driver implements [`Connector`](crate::core::Connector) (the connection
//! factory) and [`Database`](crate::core::Database) with its cursor and batch
//! writer handles. SQL text comes from [`OracleDialect`](crate::dialect::OracleDialect).

pub mod memory;
#[cfg(feature = "oracle")]
pub mod oracle;

pub use memory::{Failure, MemoryConnector, MemoryDatabase, MemoryStats};
#[cfg(feature = "oracle")]
pub use self::oracle::{OracleConnector, OracleDatabase};
