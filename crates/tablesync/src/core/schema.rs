//! Table references, catalog metadata and reconciled column sets.

use serde::{Deserialize, Serialize};

/// A concrete table on an endpoint, addressed as `prefix + name + postfix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Logical table name (upper-cased).
    pub name: String,

    /// Schema qualifier, empty or `"SCHEMA."`.
    pub prefix: String,

    /// Link suffix, empty or `"@link"`.
    pub postfix: String,
}

impl TableRef {
    /// Create a table reference. The name is upper-cased.
    pub fn new(name: &str, prefix: impl Into<String>, postfix: impl Into<String>) -> Self {
        Self {
            name: name.to_uppercase(),
            prefix: prefix.into(),
            postfix: postfix.into(),
        }
    }

    /// Fully qualified name used in DML/DDL.
    pub fn qualified(&self) -> String {
        format!("{}{}{}", self.prefix, self.name, self.postfix)
    }

    /// Owning schema without the trailing dot, if one is configured.
    pub fn owner(&self) -> Option<&str> {
        self.prefix
            .strip_suffix('.')
            .filter(|owner| !owner.is_empty())
    }
}

/// One row of `all_tab_columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogColumn {
    /// Column name.
    pub name: String,

    /// Catalog data type (e.g. "NUMBER", "VARCHAR2").
    pub data_type: String,

    /// Byte length for character types.
    pub data_length: Option<i64>,

    /// Numeric precision.
    pub data_precision: Option<i64>,

    /// Numeric scale.
    pub data_scale: Option<i64>,

    /// Whether the column allows NULL.
    pub nullable: bool,

    /// Ordinal position (1-based).
    pub column_id: i64,

    /// Whether the column is an identity (server-generated) column.
    pub identity: bool,
}

impl CatalogColumn {
    /// Convenience constructor for a nullable, non-identity column.
    pub fn new(name: &str, data_type: &str, column_id: i64) -> Self {
        Self {
            name: name.to_uppercase(),
            data_type: data_type.to_uppercase(),
            data_length: None,
            data_precision: None,
            data_scale: None,
            nullable: true,
            column_id,
            identity: false,
        }
    }

    /// Set the character length.
    pub fn with_length(mut self, length: i64) -> Self {
        self.data_length = Some(length);
        self
    }

    /// Set numeric precision and optional scale.
    pub fn with_precision(mut self, precision: i64, scale: Option<i64>) -> Self {
        self.data_precision = Some(precision);
        self.data_scale = scale;
        self
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the column as an identity column.
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self.nullable = false;
        self
    }
}

/// Constraint type codes from `all_constraints.constraint_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
    Check,
}

impl ConstraintKind {
    /// Parse the single-letter catalog code. Other codes (views, read-only) are ignored.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "P" => Some(Self::PrimaryKey),
            "U" => Some(Self::Unique),
            "R" => Some(Self::ForeignKey),
            "C" => Some(Self::Check),
            _ => None,
        }
    }
}

/// Constraint metadata joined from `all_constraints` and `all_cons_columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// Constraint name.
    pub name: String,

    /// Constraint type.
    pub kind: ConstraintKind,

    /// Constrained columns ordered by position.
    pub columns: Vec<String>,

    /// Owner of the referenced constraint (foreign keys).
    pub r_owner: Option<String>,

    /// Name of the referenced constraint (foreign keys).
    pub r_constraint_name: Option<String>,

    /// Check condition text.
    pub search_condition: Option<String>,
}

/// Result of reconciling a remote (source) and local (destination) table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnSet {
    /// Source columns in catalog order, identity columns of the destination removed.
    pub remote_columns: Vec<String>,

    /// Destination non-identity columns; `None` when the destination table is absent.
    pub local_columns: Option<Vec<String>>,

    /// Destination identity columns.
    pub identity_columns: Vec<String>,

    /// Column renames as `(local, remote)` pairs.
    pub name_map: Vec<(String, String)>,

    /// Whether only mapped columns take part in the transfer.
    pub only_mapped: bool,

    /// Destination row count at reconciliation time.
    pub row_count: i64,
}

impl ColumnSet {
    /// Whether the destination table exists.
    pub fn local_exists(&self) -> bool {
        self.local_columns.is_some()
    }

    /// Destination columns, empty when the table is absent.
    pub fn local(&self) -> &[String] {
        self.local_columns.as_deref().unwrap_or(&[])
    }

    /// Remote column feeding a local column.
    pub fn remote_for<'a>(&'a self, local: &'a str) -> &'a str {
        self.name_map
            .iter()
            .find(|(l, _)| l == local)
            .map(|(_, r)| r.as_str())
            .unwrap_or(local)
    }

    /// Local name a remote column is renamed to, if mapped.
    pub fn local_for(&self, remote: &str) -> Option<&str> {
        self.name_map
            .iter()
            .find(|(_, r)| r == remote)
            .map(|(l, _)| l.as_str())
    }

    /// Remote projection with mapped columns aliased to their local names.
    pub fn mapped_projection(&self) -> Vec<Projection> {
        self.remote_columns
            .iter()
            .map(|remote| match self.local_for(remote) {
                Some(local) if local != remote => Projection::aliased(remote, local),
                _ => Projection::column(remote),
            })
            .collect()
    }

    /// `(local, remote)` pairs that actually move data: local columns whose
    /// source column exists on the remote side.
    pub fn transfer_pairs(&self) -> Vec<(String, String)> {
        self.local()
            .iter()
            .filter_map(|local| {
                let remote = self.remote_for(local);
                self.remote_columns
                    .iter()
                    .any(|c| c == remote)
                    .then(|| (local.clone(), remote.to_string()))
            })
            .collect()
    }

    /// Local column names of [`transfer_pairs`](Self::transfer_pairs).
    pub fn transfer_columns(&self) -> Vec<String> {
        self.transfer_pairs().into_iter().map(|(l, _)| l).collect()
    }
}

/// One output column of a SELECT: a source column, optionally renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    /// Source column name.
    pub column: String,

    /// Output name, when different from the source name.
    pub alias: Option<String>,
}

impl Projection {
    /// Project a column under its own name.
    pub fn column(name: &str) -> Self {
        Self {
            column: name.to_string(),
            alias: None,
        }
    }

    /// Project a column under another name.
    pub fn aliased(name: &str, alias: &str) -> Self {
        Self {
            column: name.to_string(),
            alias: Some(alias.to_string()),
        }
    }

    /// Name of the column in the result set.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }
}
