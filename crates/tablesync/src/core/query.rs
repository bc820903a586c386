//! Typed SELECT queries and statements.
//!
//! The engine builds these values; drivers either render them to SQL through
//! the dialect or evaluate them directly.

use super::schema::{CatalogColumn, Projection, TableRef};

/// Excludes rows whose key already exists in another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AntiJoin {
    /// Qualified table holding the existing keys.
    pub table: String,

    /// Key pairs as `(column in the selected table, column in `table`)`.
    pub keys: Vec<(String, String)>,
}

/// A single-table SELECT, optionally restricted to rows missing from another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    /// Output columns.
    pub projection: Vec<Projection>,

    /// Qualified source table.
    pub from: String,

    /// Set difference against another table.
    pub except: Option<AntiJoin>,
}

impl SelectQuery {
    /// Select `columns` from `table` unchanged.
    pub fn columns(table: &TableRef, columns: &[String]) -> Self {
        Self {
            projection: columns.iter().map(|c| Projection::column(c)).collect(),
            from: table.qualified(),
            except: None,
        }
    }

    /// Select a prepared projection from `table`.
    pub fn projected(table: &TableRef, projection: Vec<Projection>) -> Self {
        Self {
            projection,
            from: table.qualified(),
            except: None,
        }
    }

    /// Keep only rows whose key is absent from `table`.
    pub fn except(mut self, table: &TableRef, keys: Vec<(String, String)>) -> Self {
        self.except = Some(AntiJoin {
            table: table.qualified(),
            keys,
        });
        self
    }

    /// Result column names, in order.
    pub fn output_names(&self) -> Vec<String> {
        self.projection
            .iter()
            .map(|p| p.output_name().to_uppercase())
            .collect()
    }

    /// Whether the anti-join compares every projected column, in order.
    ///
    /// Such a difference is expressible as a plain set MINUS.
    pub fn is_full_row_difference(&self) -> bool {
        match &self.except {
            Some(anti) => {
                anti.keys.len() == self.projection.len()
                    && anti
                        .keys
                        .iter()
                        .zip(&self.projection)
                        .all(|((src, _), p)| *src == p.column)
            }
            None => false,
        }
    }
}

/// A statement that changes data or schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `TRUNCATE TABLE <table>`.
    Truncate { table: String },

    /// `CREATE TABLE <table> (<column definitions>)` from catalog metadata.
    CreateTable {
        table: String,
        columns: Vec<CatalogColumn>,
    },

    /// `CREATE TABLE <table> AS SELECT ...`.
    CreateTableAs { table: String, query: SelectQuery },

    /// `ALTER TABLE <table> RENAME COLUMN <from> TO <to>`.
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },

    /// `INSERT INTO <table> (<columns>) SELECT ...`.
    InsertSelect {
        table: String,
        columns: Vec<String>,
        query: SelectQuery,
    },
}

impl Statement {
    /// Target table of the statement.
    pub fn table(&self) -> &str {
        match self {
            Statement::Truncate { table }
            | Statement::CreateTable { table, .. }
            | Statement::CreateTableAs { table, .. }
            | Statement::RenameColumn { table, .. }
            | Statement::InsertSelect { table, .. } => table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_row_difference_detection() {
        let src = TableRef::new("SRC", "", "");
        let dst = TableRef::new("DST", "", "");
        let cols = vec!["A".to_string(), "B".to_string()];

        let full = SelectQuery::columns(&src, &cols).except(
            &dst,
            vec![("A".into(), "A".into()), ("B".into(), "B".into())],
        );
        assert!(full.is_full_row_difference());

        let keyed = SelectQuery::columns(&src, &cols).except(&dst, vec![("A".into(), "A".into())]);
        assert!(!keyed.is_full_row_difference());

        assert!(!SelectQuery::columns(&src, &cols).is_full_row_difference());
    }
}
