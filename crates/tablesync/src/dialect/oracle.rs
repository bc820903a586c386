//! Oracle SQL dialect.

use crate::core::{AntiJoin, Projection, SelectQuery, Statement, TableRef};
use crate::ddl;

/// A catalog query with its positional bind values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    pub sql: String,
    pub binds: Vec<String>,
}

/// Oracle dialect implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl OracleDialect {
    /// Create a new Oracle dialect instance.
    pub fn new() -> Self {
        Self
    }

    /// Oracle uses :1, :2, etc. (1-based)
    pub fn param_placeholder(&self, index: usize) -> String {
        format!(":{}", index)
    }

    /// Render a SELECT, including its set difference if any.
    pub fn select(&self, query: &SelectQuery) -> String {
        let head = format!(
            "SELECT {} FROM {}",
            self.projection_list(&query.projection),
            query.from
        );

        match &query.except {
            None => head,
            Some(anti) if query.is_full_row_difference() => format!(
                "{} MINUS SELECT {} FROM {}",
                head,
                anti.keys
                    .iter()
                    .map(|(_, dest)| dest.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                anti.table
            ),
            Some(anti) => self.not_exists(query, anti),
        }
    }

    /// Render a statement.
    pub fn statement(&self, statement: &Statement) -> String {
        match statement {
            Statement::Truncate { table } => format!("TRUNCATE TABLE {}", table),
            Statement::CreateTable { table, columns } => ddl::build_create_table(table, columns),
            Statement::CreateTableAs { table, query } => {
                format!("CREATE TABLE {} AS {}", table, self.select(query))
            }
            Statement::RenameColumn { table, from, to } => {
                format!("ALTER TABLE {} RENAME COLUMN {} TO {}", table, from, to)
            }
            Statement::InsertSelect {
                table,
                columns,
                query,
            } => format!(
                "INSERT INTO {} ({}) {}",
                table,
                columns.join(", "),
                self.select(query)
            ),
        }
    }

    /// Parameterized single-row INSERT executed in array (batch) mode.
    pub fn insert(&self, table: &str, columns: &[String]) -> String {
        let params = (1..=columns.len())
            .map(|i| self.param_placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            params
        )
    }

    /// `SELECT COUNT(*)` over a table.
    pub fn row_count(&self, table: &TableRef) -> String {
        format!("SELECT COUNT(*) FROM {}", table.qualified())
    }

    /// Column metadata from `all_tab_columns`, ordered by column id.
    pub fn columns_query(&self, table: &TableRef) -> CatalogQuery {
        self.catalog(
            format!(
                "SELECT column_name, data_type, data_length, data_precision, data_scale, \
                 nullable, column_id, identity_column FROM all_tab_columns{} \
                 WHERE table_name = :1",
                table.postfix
            ),
            "owner",
            table,
            " ORDER BY column_id",
        )
    }

    /// Existence check against `all_tables`.
    pub fn table_exists_query(&self, table: &TableRef) -> CatalogQuery {
        self.catalog(
            format!(
                "SELECT table_name FROM all_tables{} WHERE table_name = :1",
                table.postfix
            ),
            "owner",
            table,
            "",
        )
    }

    /// Constraints joined with their columns, one row per constrained column.
    pub fn constraints_query(&self, table: &TableRef) -> CatalogQuery {
        self.catalog(
            format!(
                "SELECT c.constraint_name, c.constraint_type, c.r_owner, c.r_constraint_name, \
                 c.search_condition, cc.column_name, cc.position \
                 FROM all_constraints{pf} c \
                 LEFT JOIN all_cons_columns{pf} cc \
                 ON cc.owner = c.owner AND cc.constraint_name = c.constraint_name \
                 WHERE c.table_name = :1",
                pf = table.postfix
            ),
            "c.owner",
            table,
            " ORDER BY c.constraint_name, cc.position",
        )
    }

    fn catalog(
        &self,
        mut sql: String,
        owner_column: &str,
        table: &TableRef,
        order_by: &str,
    ) -> CatalogQuery {
        let mut binds = vec![table.name.clone()];
        if let Some(owner) = table.owner() {
            sql.push_str(&format!(" AND {} = :2", owner_column));
            binds.push(owner.to_uppercase());
        }
        sql.push_str(order_by);
        CatalogQuery { sql, binds }
    }

    fn projection_list(&self, projection: &[Projection]) -> String {
        if projection.is_empty() {
            return "*".to_string();
        }
        projection
            .iter()
            .map(|p| match &p.alias {
                Some(alias) => format!("{} AS {}", p.column, alias),
                None => p.column.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    // DECODE treats two NULLs as equal, which matches how keys compare client-side.
    fn not_exists(&self, query: &SelectQuery, anti: &AntiJoin) -> String {
        let conditions = anti
            .keys
            .iter()
            .map(|(src, dest)| format!("DECODE(d.{}, s.{}, 0, 1) = 0", dest, src))
            .collect::<Vec<_>>()
            .join(" AND ");

        let projection = query
            .projection
            .iter()
            .map(|p| match &p.alias {
                Some(alias) => format!("s.{} AS {}", p.column, alias),
                None => format!("s.{}", p.column),
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "SELECT {} FROM {} s WHERE NOT EXISTS (SELECT 1 FROM {} d WHERE {})",
            projection, query.from, anti.table, conditions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CatalogColumn;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_param_placeholder() {
        let dialect = OracleDialect::new();
        assert_eq!(dialect.param_placeholder(1), ":1");
        assert_eq!(dialect.param_placeholder(10), ":10");
    }

    #[test]
    fn test_select_with_aliases() {
        let dialect = OracleDialect::new();
        let table = TableRef::new("customers", "SALES.", "@PROD");
        let query = SelectQuery::projected(
            &table,
            vec![Projection::column("ID"), Projection::aliased("NAME", "CLIENT_NAME")],
        );
        assert_eq!(
            dialect.select(&query),
            "SELECT ID, NAME AS CLIENT_NAME FROM SALES.CUSTOMERS@PROD"
        );
    }

    #[test]
    fn test_full_row_difference_uses_minus() {
        let dialect = OracleDialect::new();
        let src = TableRef::new("SRC", "", "");
        let dst = TableRef::new("DST", "", "");
        let query = SelectQuery::columns(&src, &cols(&["A", "B"]))
            .except(&dst, vec![("A".into(), "A".into()), ("B".into(), "B".into())]);
        assert_eq!(
            dialect.select(&query),
            "SELECT A, B FROM SRC MINUS SELECT A, B FROM DST"
        );
    }

    #[test]
    fn test_keyed_difference_uses_not_exists() {
        let dialect = OracleDialect::new();
        let src = TableRef::new("SRC", "", "");
        let dst = TableRef::new("DST", "", "");
        let query = SelectQuery::projected(
            &src,
            vec![Projection::aliased("KEY_ID", "ID"), Projection::column("VAL")],
        )
        .except(&dst, vec![("KEY_ID".into(), "ID".into())]);
        assert_eq!(
            dialect.select(&query),
            "SELECT s.KEY_ID AS ID, s.VAL FROM SRC s WHERE NOT EXISTS \
             (SELECT 1 FROM DST d WHERE DECODE(d.ID, s.KEY_ID, 0, 1) = 0)"
        );
    }

    #[test]
    fn test_insert_statement() {
        let dialect = OracleDialect::new();
        assert_eq!(
            dialect.insert("T", &cols(&["NAME", "AMT"])),
            "INSERT INTO T (NAME, AMT) VALUES (:1, :2)"
        );
    }

    #[test]
    fn test_statements() {
        let dialect = OracleDialect::new();
        let src = TableRef::new("SRC", "", "");
        assert_eq!(
            dialect.statement(&Statement::Truncate { table: "T".into() }),
            "TRUNCATE TABLE T"
        );
        assert_eq!(
            dialect.statement(&Statement::RenameColumn {
                table: "T".into(),
                from: "FULL_NAME".into(),
                to: "NAME".into(),
            }),
            "ALTER TABLE T RENAME COLUMN FULL_NAME TO NAME"
        );
        assert_eq!(
            dialect.statement(&Statement::InsertSelect {
                table: "T".into(),
                columns: cols(&["NAME"]),
                query: SelectQuery::columns(&src, &cols(&["FULL_NAME"])),
            }),
            "INSERT INTO T (NAME) SELECT FULL_NAME FROM SRC"
        );
        assert_eq!(
            dialect.statement(&Statement::CreateTable {
                table: "T".into(),
                columns: vec![CatalogColumn::new("NAME", "VARCHAR2", 1).with_length(50)],
            }),
            "CREATE TABLE T (\n    NAME VARCHAR2(50)\n)"
        );
    }

    #[test]
    fn test_catalog_queries_follow_link_and_owner() {
        let dialect = OracleDialect::new();
        let linked = TableRef::new("orders", "SALES.", "@PROD");
        let q = dialect.columns_query(&linked);
        assert!(q.sql.contains("FROM all_tab_columns@PROD"));
        assert!(q.sql.ends_with("AND owner = :2 ORDER BY column_id"));
        assert_eq!(q.binds, vec!["ORDERS".to_string(), "SALES".to_string()]);

        let local = TableRef::new("orders", "", "");
        let q = dialect.table_exists_query(&local);
        assert_eq!(
            q.sql,
            "SELECT table_name FROM all_tables WHERE table_name = :1"
        );
        assert_eq!(q.binds, vec!["ORDERS".to_string()]);

        let q = dialect.constraints_query(&linked);
        assert!(q.sql.contains("all_constraints@PROD c"));
        assert!(q.sql.contains("all_cons_columns@PROD cc"));
        assert!(q.sql.contains("AND c.owner = :2"));
    }
}
