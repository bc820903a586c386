//! DDL derivation for destination tables that do not exist yet.
//!
//! Two paths:
//! - across instances, a `CREATE TABLE` is assembled from the source catalog;
//! - on one instance, `CREATE TABLE ... AS SELECT` copies structure and rows
//!   server-side.
//!
//! Both are followed by one `RENAME COLUMN` per mapped column so the new table
//! carries local names. Constraint DDL can be rendered from the catalog but is
//! not appended to created tables; constraints are not propagated.

use tracing::{debug, info};

use crate::core::{
    CatalogColumn, ColumnSet, Constraint, ConstraintKind, Database, SelectQuery, Statement,
    TableRef,
};
use crate::dialect::OracleDialect;
use crate::error::Result;

/// Render a catalog column's type.
pub fn format_data_type(column: &CatalogColumn) -> String {
    let data_type = column.data_type.as_str();
    match data_type {
        "VARCHAR2" | "CHAR" | "NVARCHAR2" | "NCHAR" | "RAW" => match column.data_length {
            Some(length) => format!("{}({})", data_type, length),
            None => data_type.to_string(),
        },
        "NUMBER" => match (column.data_precision, column.data_scale) {
            (Some(p), Some(s)) => format!("NUMBER({},{})", p, s),
            (Some(p), None) => format!("NUMBER({})", p),
            _ => "NUMBER".to_string(),
        },
        other => other.to_string(),
    }
}

/// Column definition lines ordered by column id.
pub fn column_definitions(columns: &[CatalogColumn]) -> Vec<String> {
    let mut sorted: Vec<&CatalogColumn> = columns.iter().collect();
    sorted.sort_by_key(|c| c.column_id);

    sorted
        .into_iter()
        .map(|col| {
            let mut line = format!("    {} {}", col.name, format_data_type(col));
            if !col.nullable {
                line.push_str(" NOT NULL");
            }
            line
        })
        .collect()
}

/// Constraint definition lines (primary key, unique, foreign key, check).
pub fn constraint_definitions(constraints: &[Constraint]) -> Vec<String> {
    constraints
        .iter()
        .filter_map(|c| {
            let cols = c.columns.join(", ");
            match c.kind {
                ConstraintKind::PrimaryKey => {
                    Some(format!("    CONSTRAINT {} PRIMARY KEY ({})", c.name, cols))
                }
                ConstraintKind::Unique => {
                    Some(format!("    CONSTRAINT {} UNIQUE ({})", c.name, cols))
                }
                ConstraintKind::ForeignKey => Some(format!(
                    "    CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}.{}",
                    c.name,
                    cols,
                    c.r_owner.as_deref().unwrap_or_default(),
                    c.r_constraint_name.as_deref().unwrap_or_default()
                )),
                ConstraintKind::Check => c
                    .search_condition
                    .as_ref()
                    .filter(|cond| !cond.is_empty())
                    .map(|cond| format!("    CONSTRAINT {} CHECK ({})", c.name, cond)),
            }
        })
        .collect()
}

/// `CREATE TABLE` from catalog columns.
pub fn build_create_table(table: &str, columns: &[CatalogColumn]) -> String {
    format!(
        "CREATE TABLE {} (\n{}\n)",
        table,
        column_definitions(columns).join(",\n")
    )
}

/// Statements that create `local` from `remote`.
///
/// `catalog` is the source catalog; it is ignored on the same-instance path.
/// Source identity columns and columns outside the reconciled set are left out
/// of the catalog-derived definition.
pub fn plan_create_table(
    columns: &ColumnSet,
    local: &TableRef,
    remote: &TableRef,
    catalog: &[CatalogColumn],
    same_instance: bool,
) -> Vec<Statement> {
    let table = local.qualified();

    let create = if same_instance {
        Statement::CreateTableAs {
            table: table.clone(),
            query: SelectQuery::columns(remote, &columns.remote_columns),
        }
    } else {
        let defined: Vec<CatalogColumn> = catalog
            .iter()
            .filter(|c| !c.identity && columns.remote_columns.contains(&c.name))
            .cloned()
            .collect();
        Statement::CreateTable {
            table: table.clone(),
            columns: defined,
        }
    };

    let mut statements = vec![create];
    statements.extend(
        columns
            .name_map
            .iter()
            .filter(|(l, r)| l != r && columns.remote_columns.contains(r))
            .map(|(l, r)| Statement::RenameColumn {
                table: table.clone(),
                from: r.clone(),
                to: l.clone(),
            }),
    );
    statements
}

/// Create the destination table, or only report the DDL when `show_only` is set.
///
/// Returns the rendered statements in execution order.
pub async fn create_table(
    local_db: &dyn Database,
    remote_db: &dyn Database,
    columns: &ColumnSet,
    local: &TableRef,
    remote: &TableRef,
    same_instance: bool,
    show_only: bool,
) -> Result<Vec<String>> {
    let catalog = if same_instance {
        Vec::new()
    } else {
        let constraints = remote_db.constraints(remote).await?;
        for line in constraint_definitions(&constraints) {
            debug!("Constraint not propagated: {}", line.trim());
        }
        remote_db.columns(remote).await?
    };

    let statements = plan_create_table(columns, local, remote, &catalog, same_instance);
    let dialect = OracleDialect::new();
    let rendered: Vec<String> = statements.iter().map(|s| dialect.statement(s)).collect();

    if show_only {
        for sql in &rendered {
            info!("{}", sql);
        }
        return Ok(rendered);
    }

    for statement in &statements {
        local_db.execute(statement).await?;
    }
    info!("Created table {}", local.qualified());
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_catalog() -> Vec<CatalogColumn> {
        vec![
            CatalogColumn::new("AMT", "NUMBER", 3).with_precision(10, Some(2)),
            CatalogColumn::new("ID", "NUMBER", 1).identity(),
            CatalogColumn::new("NAME", "VARCHAR2", 2).with_length(100).not_null(),
        ]
    }

    fn scenario_set() -> ColumnSet {
        ColumnSet {
            remote_columns: vec!["ID".into(), "NAME".into(), "AMT".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_format_data_type() {
        let number = CatalogColumn::new("A", "NUMBER", 1);
        assert_eq!(format_data_type(&number.clone().with_precision(10, Some(2))), "NUMBER(10,2)");
        assert_eq!(format_data_type(&number.clone().with_precision(10, None)), "NUMBER(10)");
        assert_eq!(format_data_type(&number), "NUMBER");

        let varchar = CatalogColumn::new("B", "VARCHAR2", 2).with_length(50);
        assert_eq!(format_data_type(&varchar), "VARCHAR2(50)");

        let date = CatalogColumn::new("C", "DATE", 3);
        assert_eq!(format_data_type(&date), "DATE");
    }

    #[test]
    fn test_column_definitions_sorted_by_id() {
        let lines = column_definitions(&scenario_catalog());
        assert_eq!(
            lines,
            vec![
                "    ID NUMBER NOT NULL",
                "    NAME VARCHAR2(100) NOT NULL",
                "    AMT NUMBER(10,2)",
            ]
        );
    }

    #[test]
    fn test_cross_instance_plan_excludes_identity() {
        let local = TableRef::new("T", "", "");
        let remote = TableRef::new("T", "", "@PROD");
        let plan = plan_create_table(&scenario_set(), &local, &remote, &scenario_catalog(), false);

        assert_eq!(plan.len(), 1);
        let sql = OracleDialect::new().statement(&plan[0]);
        assert_eq!(
            sql,
            "CREATE TABLE T (\n    NAME VARCHAR2(100) NOT NULL,\n    AMT NUMBER(10,2)\n)"
        );
    }

    #[test]
    fn test_same_instance_plan_renames_mapped_columns() {
        let set = ColumnSet {
            remote_columns: vec!["ID".into(), "FULL_NAME".into()],
            name_map: vec![
                ("NAME".into(), "FULL_NAME".into()),
                ("ID".into(), "ID".into()),
            ],
            ..Default::default()
        };
        let local = TableRef::new("T", "PL.", "");
        let remote = TableRef::new("T", "SALES.", "");
        let plan = plan_create_table(&set, &local, &remote, &[], true);

        let dialect = OracleDialect::new();
        let sql: Vec<_> = plan.iter().map(|s| dialect.statement(s)).collect();
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE PL.T AS SELECT ID, FULL_NAME FROM SALES.T".to_string(),
                "ALTER TABLE PL.T RENAME COLUMN FULL_NAME TO NAME".to_string(),
            ]
        );
    }

    #[test]
    fn test_constraint_definitions() {
        let constraints = vec![
            Constraint {
                name: "T_PK".into(),
                kind: ConstraintKind::PrimaryKey,
                columns: vec!["ID".into()],
                r_owner: None,
                r_constraint_name: None,
                search_condition: None,
            },
            Constraint {
                name: "T_FK".into(),
                kind: ConstraintKind::ForeignKey,
                columns: vec!["PARENT_ID".into()],
                r_owner: Some("SALES".into()),
                r_constraint_name: Some("P_PK".into()),
                search_condition: None,
            },
            Constraint {
                name: "T_CK".into(),
                kind: ConstraintKind::Check,
                columns: vec![],
                r_owner: None,
                r_constraint_name: None,
                search_condition: None,
            },
        ];
        assert_eq!(
            constraint_definitions(&constraints),
            vec![
                "    CONSTRAINT T_PK PRIMARY KEY (ID)",
                "    CONSTRAINT T_FK FOREIGN KEY (PARENT_ID) REFERENCES SALES.P_PK",
            ]
        );
    }
}
