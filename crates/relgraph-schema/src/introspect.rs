//! Catalog introspection.
//!
//! Inference only needs two flat row sets per namespace: every column with
//! its declared type, and every foreign key. [`ConnectionCatalog`] reads them
//! through a [`Connection`] with one query per row set for SQLite,
//! PostgreSQL and MySQL.

use asupersync::{Cx, Outcome};
use relgraph_core::{Connection, Dialect, Error, Row, SchemaErrorKind, Value};
use serde::{Deserialize, Serialize};

// ============================================================================
// Catalog rows
// ============================================================================

/// One column of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRow {
    pub table: String,
    pub column: String,
    /// Declared SQL type as reported by the catalog
    pub sql_type: String,
}

impl ColumnRow {
    pub fn new(table: &str, column: &str, sql_type: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            sql_type: sql_type.to_string(),
        }
    }
}

/// One single-column foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRow {
    pub table: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

impl ForeignKeyRow {
    pub fn new(table: &str, column: &str, ref_table: &str, ref_column: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            ref_table: ref_table.to_string(),
            ref_column: ref_column.to_string(),
        }
    }
}

/// Everything introspection returns for one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRows {
    pub foreign_keys: Vec<ForeignKeyRow>,
    pub columns: Vec<ColumnRow>,
}

/// Every row of a catalog result set must expose `required` by name.
///
/// Individual NULL cells are tolerated; a result set of the wrong shape
/// (a driver renaming projections, a catalog view missing a column) is not.
fn check_shape(rows: &[Row], required: &[&str]) -> Result<(), Error> {
    for row in rows {
        if let Some(missing) = required.iter().find(|c| row.get_by_name(c).is_none()) {
            let found: Vec<&str> = row.column_names().collect();
            return Err(Error::schema(
                SchemaErrorKind::Introspection,
                format!("catalog row has no '{missing}' column (got {found:?})"),
            ));
        }
    }
    Ok(())
}

// ============================================================================
// Catalog trait
// ============================================================================

/// Source of raw catalog rows.
pub trait Catalog: Send + Sync {
    fn introspect(
        &self,
        cx: &Cx,
        namespace: &str,
    ) -> impl Future<Output = Outcome<CatalogRows, Error>> + Send;
}

/// Fixed rows, for tests and pre-exported catalogs.
impl Catalog for CatalogRows {
    fn introspect(
        &self,
        _cx: &Cx,
        _namespace: &str,
    ) -> impl Future<Output = Outcome<CatalogRows, Error>> + Send {
        let rows = self.clone();
        async move { Outcome::Ok(rows) }
    }
}

/// Reads catalog rows through a live connection.
#[derive(Debug)]
pub struct ConnectionCatalog<'a, C> {
    conn: &'a C,
}

impl<'a, C: Connection> ConnectionCatalog<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    fn columns_sql(dialect: Dialect) -> &'static str {
        match dialect {
            Dialect::Sqlite => {
                "SELECT m.name AS table_name, p.name AS column_name, p.type AS data_type
                 FROM sqlite_master AS m JOIN pragma_table_info(m.name) AS p
                 WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'
                 ORDER BY m.name, p.cid"
            }
            Dialect::Postgres => {
                "SELECT table_name, column_name, data_type
                 FROM information_schema.columns
                 WHERE table_schema = $1
                 ORDER BY table_name, ordinal_position"
            }
            Dialect::Mysql => {
                "SELECT table_name AS table_name, column_name AS column_name, column_type AS data_type
                 FROM information_schema.columns
                 WHERE table_schema = ?
                 ORDER BY table_name, ordinal_position"
            }
        }
    }

    fn foreign_keys_sql(dialect: Dialect) -> &'static str {
        match dialect {
            Dialect::Sqlite => {
                "SELECT m.name AS table_name, f.\"from\" AS column_name,
                        f.\"table\" AS referenced_table_name, f.\"to\" AS referenced_column_name
                 FROM sqlite_master AS m JOIN pragma_foreign_key_list(m.name) AS f
                 WHERE m.type = 'table'"
            }
            Dialect::Postgres => {
                "SELECT kcu.table_name, kcu.column_name,
                        ccu.table_name AS referenced_table_name,
                        ccu.column_name AS referenced_column_name
                 FROM information_schema.table_constraints AS tc
                 JOIN information_schema.key_column_usage AS kcu
                     ON tc.constraint_name = kcu.constraint_name
                     AND tc.table_schema = kcu.table_schema
                 JOIN information_schema.constraint_column_usage AS ccu
                     ON ccu.constraint_name = tc.constraint_name
                     AND ccu.table_schema = tc.table_schema
                 WHERE tc.constraint_type = 'FOREIGN KEY'
                     AND tc.table_schema = $1"
            }
            Dialect::Mysql => {
                "SELECT table_name AS table_name, column_name AS column_name,
                        referenced_table_name AS referenced_table_name,
                        referenced_column_name AS referenced_column_name
                 FROM information_schema.key_column_usage
                 WHERE table_schema = ?
                     AND referenced_table_name IS NOT NULL"
            }
        }
    }

    async fn fetch(&self, cx: &Cx, sql: &str, namespace: &str) -> Outcome<Vec<Row>, Error> {
        let dialect = self.conn.dialect();
        // SQLite has a single catalog per connection.
        let params = match dialect {
            Dialect::Sqlite => Vec::new(),
            Dialect::Postgres | Dialect::Mysql => vec![Value::Text(namespace.to_string())],
        };
        tracing::debug!(dialect = dialect.as_str(), namespace, "Reading catalog");
        let outcome = self.conn.query(cx, sql, &params).await;
        if let Outcome::Err(e) = &outcome {
            tracing::warn!(sql, error = %e, "Catalog query failed");
        }
        outcome
    }
}

impl<C: Connection> Catalog for ConnectionCatalog<'_, C> {
    async fn introspect(&self, cx: &Cx, namespace: &str) -> Outcome<CatalogRows, Error> {
        let dialect = self.conn.dialect();

        let column_rows = match self.fetch(cx, Self::columns_sql(dialect), namespace).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let fk_rows = match self.fetch(cx, Self::foreign_keys_sql(dialect), namespace).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        if let Err(e) = check_shape(&column_rows, &["table_name", "column_name", "data_type"])
            .and_then(|()| {
                check_shape(
                    &fk_rows,
                    &["table_name", "column_name", "referenced_table_name", "referenced_column_name"],
                )
            })
        {
            tracing::warn!(error = %e, "Catalog rows have an unexpected shape");
            return Outcome::Err(e);
        }

        let columns: Vec<ColumnRow> = column_rows
            .iter()
            .filter_map(|row| {
                let table = row.get_named::<String>("table_name").ok()?;
                let column = row.get_named::<String>("column_name").ok()?;
                let sql_type = row
                    .get_named::<Option<String>>("data_type")
                    .ok()
                    .flatten()
                    .unwrap_or_default();
                Some(ColumnRow {
                    table,
                    column,
                    sql_type,
                })
            })
            .collect();

        let foreign_keys: Vec<ForeignKeyRow> = fk_rows
            .iter()
            .filter_map(|row| {
                let table = row.get_named::<String>("table_name").ok()?;
                let column = row.get_named::<String>("column_name").ok()?;
                let ref_table = row.get_named::<String>("referenced_table_name").ok()?;
                // SQLite reports NULL when the key references the implicit primary key.
                let ref_column = row
                    .get_named::<Option<String>>("referenced_column_name")
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| "id".to_string());
                Some(ForeignKeyRow {
                    table,
                    column,
                    ref_table,
                    ref_column,
                })
            })
            .collect();

        tracing::debug!(
            columns = columns.len(),
            foreign_keys = foreign_keys.len(),
            "Catalog introspected"
        );

        Outcome::Ok(CatalogRows {
            foreign_keys,
            columns,
        })
    }
}
