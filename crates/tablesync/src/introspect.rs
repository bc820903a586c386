//! Schema introspection and column reconciliation.
//!
//! Reconciliation decides which columns take part in a transfer:
//!
//! 1. the source must have at least one column;
//! 2. the destination may be absent (it will be created), otherwise its row
//!    count, regular columns and identity columns are read;
//! 3. destination identity columns are removed from the source projection;
//! 4. renames targeting identity columns are dropped and, with `only_mapped`,
//!    both sides are narrowed to the mapped columns.

use tracing::debug;

use crate::config::TableMapping;
use crate::core::{ColumnSet, Database, TableRef};
use crate::error::{Result, SyncError};

/// Column names of `table` in catalog order. Empty when the table is unknown.
pub async fn discover_columns(db: &dyn Database, table: &TableRef) -> Result<Vec<String>> {
    Ok(db
        .columns(table)
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect())
}

/// Identity (server-generated) columns of `table`.
pub async fn discover_identity_columns(db: &dyn Database, table: &TableRef) -> Result<Vec<String>> {
    Ok(db
        .columns(table)
        .await?
        .into_iter()
        .filter(|c| c.identity)
        .map(|c| c.name)
        .collect())
}

/// Destination-side facts gathered during reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalShape {
    pub columns: Vec<String>,
    pub identity_columns: Vec<String>,
    pub row_count: i64,
}

/// Reconcile a table pair against its mapping.
pub async fn reconcile(
    mapping: &TableMapping,
    local_db: &dyn Database,
    local: &TableRef,
    remote_db: &dyn Database,
    remote: &TableRef,
) -> Result<ColumnSet> {
    let remote_columns = discover_columns(remote_db, remote)
        .await
        .map_err(|e| SyncError::reconciliation(remote.qualified(), e.to_string()))?;

    if remote_columns.is_empty() {
        return Err(SyncError::reconciliation(
            remote.qualified(),
            "no columns found (missing table or grant?)",
        ));
    }

    let local_shape = if local_db.table_exists(local).await? {
        let catalog = local_db.columns(local).await?;
        let (identity, regular): (Vec<_>, Vec<_>) =
            catalog.into_iter().partition(|c| c.identity);
        Some(LocalShape {
            columns: regular.into_iter().map(|c| c.name).collect(),
            identity_columns: identity.into_iter().map(|c| c.name).collect(),
            row_count: local_db.row_count(local).await?,
        })
    } else {
        debug!("Table {} does not exist", local.qualified());
        None
    };

    Ok(reconcile_columns(remote_columns, local_shape, mapping))
}

/// The pure part of [`reconcile`]: steps 3 and 4 over already-read metadata.
pub fn reconcile_columns(
    mut remote_columns: Vec<String>,
    local: Option<LocalShape>,
    mapping: &TableMapping,
) -> ColumnSet {
    let (mut local_columns, identity_columns, row_count) = match local {
        Some(shape) => (Some(shape.columns), shape.identity_columns, shape.row_count),
        None => (None, Vec::new(), 0),
    };

    remote_columns.retain(|c| !identity_columns.contains(c));

    let name_map: Vec<(String, String)> = mapping
        .map_columns
        .iter()
        .filter(|(l, _)| !identity_columns.contains(l))
        .cloned()
        .collect();

    if mapping.only_mapped {
        remote_columns.retain(|c| name_map.iter().any(|(_, r)| r == c));
        if let Some(cols) = local_columns.as_mut() {
            cols.retain(|c| name_map.iter().any(|(l, _)| l == c));
        }
    }

    ColumnSet {
        remote_columns,
        local_columns,
        identity_columns,
        name_map,
        only_mapped: mapping.only_mapped,
        row_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::{hash_set, vec};
    use proptest::prelude::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identity_removed_from_remote() {
        let shape = LocalShape {
            columns: names(&["NAME", "AMT"]),
            identity_columns: names(&["ID"]),
            row_count: 3,
        };
        let set = reconcile_columns(
            names(&["ID", "NAME", "AMT"]),
            Some(shape),
            &TableMapping::new("T", "T"),
        );
        assert_eq!(set.remote_columns, names(&["NAME", "AMT"]));
        assert_eq!(set.row_count, 3);
        assert!(set.local_exists());
    }

    #[test]
    fn test_absent_local_table() {
        let set = reconcile_columns(names(&["ID", "NAME"]), None, &TableMapping::new("T", "T"));
        assert!(!set.local_exists());
        assert_eq!(set.row_count, 0);
        assert_eq!(set.remote_columns, names(&["ID", "NAME"]));
    }

    #[test]
    fn test_mapping_into_identity_dropped_and_only_mapped() {
        let mapping = TableMapping {
            map_columns: vec![
                ("ID".into(), "SRC_ID".into()),
                ("CLIENT".into(), "CUSTOMER".into()),
            ],
            only_mapped: true,
            ..TableMapping::new("T", "T")
        };
        let shape = LocalShape {
            columns: names(&["CLIENT", "NOTE"]),
            identity_columns: names(&["ID"]),
            row_count: 0,
        };
        let set = reconcile_columns(
            names(&["SRC_ID", "CUSTOMER", "NOTE"]),
            Some(shape),
            &mapping,
        );
        assert_eq!(set.name_map, vec![("CLIENT".to_string(), "CUSTOMER".to_string())]);
        assert_eq!(set.remote_columns, names(&["CUSTOMER"]));
        assert_eq!(set.local(), names(&["CLIENT"]).as_slice());
    }

    fn column_name() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["ID", "NAME", "AMT", "CODE", "NOTE", "TS", "REF", "QTY"])
            .prop_map(String::from)
    }

    proptest! {
        #[test]
        fn prop_no_identity_in_remote_projection(
            remote in hash_set(column_name(), 1..8),
            identity in hash_set(column_name(), 0..3),
            local in hash_set(column_name(), 0..8),
        ) {
            let shape = LocalShape {
                columns: local.into_iter().filter(|c| !identity.contains(c)).collect(),
                identity_columns: identity.iter().cloned().collect(),
                row_count: 0,
            };
            let set = reconcile_columns(
                remote.into_iter().collect(),
                Some(shape),
                &TableMapping::new("T", "T"),
            );
            for c in &set.remote_columns {
                prop_assert!(!set.identity_columns.contains(c));
            }
        }

        #[test]
        fn prop_only_mapped_restricts_both_sides(
            remote in hash_set(column_name(), 1..8),
            local in hash_set(column_name(), 0..8),
            renames in vec((column_name(), column_name()), 0..4),
        ) {
            let mapping = TableMapping {
                map_columns: renames,
                only_mapped: true,
                ..TableMapping::new("T", "T")
            };
            let shape = LocalShape {
                columns: local.into_iter().collect(),
                identity_columns: Vec::new(),
                row_count: 0,
            };
            let set = reconcile_columns(remote.into_iter().collect(), Some(shape), &mapping);
            for c in &set.remote_columns {
                prop_assert!(set.name_map.iter().any(|(_, r)| r == c));
            }
            for c in set.local() {
                prop_assert!(set.name_map.iter().any(|(l, _)| l == c));
            }
        }
    }
}
