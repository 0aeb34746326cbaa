//! The statement builder.
//!
//! [`QueryBuilder`] composes identifiers, where-trees, joins and data
//! assignments into one of five statement shapes and renders them into SQL
//! text plus an ordered parameter list.
//!
//! Fluent methods never fail directly. The first malformed input is recorded
//! and reported by [`QueryBuilder::resolve`] (and by every execute method)
//! before any SQL is produced, so a statement is never partially rendered.

use crate::clause::{Limit, Offset, OrderBy};
use crate::data::{Data, DataValue};
use crate::expr::{Operand, Where};
use crate::ident::{Column, Table};
use crate::join::Join;
use asupersync::{Cx, Outcome};
use relgraph_core::{
    Connection, Dialect, Error, QueryBuilderError, QueryBuilderErrorKind, Result, Row, Value,
};
use std::fmt;
use std::str::FromStr;

/// The five statement shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Count,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::Count => "count",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
        }
    }
}

impl FromStr for StatementKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "select" => Ok(StatementKind::Select),
            "count" => Ok(StatementKind::Count),
            "insert" => Ok(StatementKind::Insert),
            "update" => Ok(StatementKind::Update),
            "delete" => Ok(StatementKind::Delete),
            other => Err(Error::builder(
                QueryBuilderErrorKind::UnknownStatement,
                format!("unknown statement type '{other}'"),
            )),
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub sql: String,
    pub params: Vec<Value>,
}

/// Fluent builder for select/count/insert/update/delete statements.
///
/// # Example
///
/// ```
/// use relgraph_core::Dialect;
/// use relgraph_query::QueryBuilder;
///
/// let stmt = QueryBuilder::select("project")
///     .filter("title%", "Apollo%")
///     .filter("id!", vec![1i64, 2])
///     .order_by("-date_created")
///     .limit(10)
///     .with_dialect(Dialect::Sqlite)
///     .resolve()
///     .unwrap();
///
/// assert_eq!(
///     stmt.sql,
///     "SELECT * FROM \"project\" WHERE \"title\" LIKE ?1 AND \"id\" NOT IN (?2, ?3) \
///      ORDER BY \"date_created\" DESC LIMIT 10"
/// );
/// assert_eq!(stmt.params.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    kind: StatementKind,
    dialect: Dialect,
    table: Option<Table>,
    columns: Vec<Column>,
    distinct: bool,
    joins: Vec<Join>,
    where_clause: Where,
    group_by: Vec<Column>,
    having: Where,
    order_by: Vec<OrderBy>,
    limit: Option<Limit>,
    offset: Option<Offset>,
    data: Vec<Data>,
    error: Option<QueryBuilderError>,
}

impl QueryBuilder {
    fn with_kind(kind: StatementKind, table: &str) -> Self {
        let mut builder = Self {
            kind,
            dialect: Dialect::default(),
            table: None,
            columns: Vec::new(),
            distinct: false,
            joins: Vec::new(),
            where_clause: Where::default(),
            group_by: Vec::new(),
            having: Where::default(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            data: Vec::new(),
            error: None,
        };
        match Table::parse(table) {
            Ok(t) => builder.table = Some(t),
            Err(e) => builder.record(e),
        }
        builder
    }

    /// Create a builder from a statement type name (`"select"`, `"count"`, ...).
    ///
    /// An unknown name is reported when the statement is resolved.
    pub fn new(kind: &str, table: &str) -> Self {
        match kind.parse::<StatementKind>() {
            Ok(kind) => Self::with_kind(kind, table),
            Err(e) => {
                let mut builder = Self::with_kind(StatementKind::Select, table);
                builder.error = None;
                builder.record(e);
                builder
            }
        }
    }

    pub fn select(table: &str) -> Self {
        Self::with_kind(StatementKind::Select, table)
    }

    pub fn count(table: &str) -> Self {
        Self::with_kind(StatementKind::Count, table)
    }

    pub fn insert(table: &str) -> Self {
        Self::with_kind(StatementKind::Insert, table)
    }

    pub fn update(table: &str) -> Self {
        Self::with_kind(StatementKind::Update, table)
    }

    pub fn delete(table: &str) -> Self {
        Self::with_kind(StatementKind::Delete, table)
    }

    fn record(&mut self, err: Error) {
        if self.error.is_some() {
            return;
        }
        self.error = Some(match err {
            Error::Builder(b) => b,
            other => QueryBuilderError {
                kind: QueryBuilderErrorKind::InvalidClause,
                message: other.to_string(),
            },
        });
    }

    fn record_result<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.record(e);
                None
            }
        }
    }

    // ==================== Accessors ====================

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_ref().map(|t| t.name.as_str())
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit.map(|Limit(n)| n)
    }

    /// The first recorded construction error, if any.
    pub fn error(&self) -> Option<&QueryBuilderError> {
        self.error.as_ref()
    }

    // ==================== Fluent API ====================

    /// Set the dialect used by [`resolve`](Self::resolve).
    ///
    /// Execute methods always use the connection's dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Project the given columns (`"title"`, `"project.id AS pid"`, `"account.*"`).
    pub fn columns(mut self, columns: &[&str]) -> Self {
        for column in columns {
            if let Some(c) = self.record_result(Column::parse(column)) {
                self.columns.push(c);
            }
        }
        self
    }

    /// Project one column under an alias.
    pub fn column_as(mut self, alias: &str, column: &str) -> Self {
        if let Some(c) = self.record_result(Column::aliased(alias, column)) {
            self.columns.push(c);
        }
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn inner_join(mut self, table: &str, on: &[(&str, &str)]) -> Self {
        if let Some(j) = self.record_result(Join::inner(table, on)) {
            self.joins.push(j);
        }
        self
    }

    pub fn left_join(mut self, table: &str, on: &[(&str, &str)]) -> Self {
        if let Some(j) = self.record_result(Join::left(table, on)) {
            self.joins.push(j);
        }
        self
    }

    pub fn cross_join(mut self, table: &str) -> Self {
        if let Some(j) = self.record_result(Join::cross(table)) {
            self.joins.push(j);
        }
        self
    }

    /// AND a `key => operand` clause into WHERE.
    pub fn filter(mut self, key: &str, operand: impl Into<Operand>) -> Self {
        if let Some(w) = self.record_result(Where::clause(key, operand)) {
            self.where_clause = std::mem::take(&mut self.where_clause).and(w);
        }
        self
    }

    /// AND a prebuilt where-tree into WHERE.
    pub fn filter_where(mut self, clause: Where) -> Self {
        self.where_clause = std::mem::take(&mut self.where_clause).and(clause);
        self
    }

    /// OR a prebuilt where-tree into WHERE.
    pub fn or_where(mut self, clause: Where) -> Self {
        self.where_clause = std::mem::take(&mut self.where_clause).or(clause);
        self
    }

    pub fn group_by(mut self, columns: &[&str]) -> Self {
        for column in columns {
            if let Some(c) = self.record_result(Column::parse(column)) {
                self.group_by.push(c);
            }
        }
        self
    }

    /// AND a `key => operand` clause into HAVING.
    pub fn having(mut self, key: &str, operand: impl Into<Operand>) -> Self {
        if let Some(w) = self.record_result(Where::clause(key, operand)) {
            self.having = std::mem::take(&mut self.having).and(w);
        }
        self
    }

    /// Sort by `key`; a leading `-` sorts descending.
    pub fn order_by(mut self, key: &str) -> Self {
        if let Some(o) = self.record_result(OrderBy::parse(key)) {
            self.order_by.push(o);
        }
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(Limit(n));
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(Offset(n));
        self
    }

    /// Assign a value to a column (INSERT/UPDATE).
    pub fn set(mut self, column: &str, value: impl Into<DataValue>) -> Self {
        if let Some(d) = self.record_result(Data::new(column, value)) {
            self.data.retain(|existing| existing.column.name != d.column.name);
            self.data.push(d);
        }
        self
    }

    /// Assign several values at once.
    pub fn values<'a>(mut self, values: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        for (column, value) in values {
            self = self.set(column, value);
        }
        self
    }

    // ==================== Rendering ====================

    /// Render with the builder's own dialect.
    ///
    /// Every call starts from an empty parameter list, so resolving the same
    /// builder repeatedly yields identical statements.
    pub fn resolve(&self) -> Result<Statement> {
        self.resolve_with(self.dialect)
    }

    /// Render for a specific dialect.
    pub fn resolve_with(&self, dialect: Dialect) -> Result<Statement> {
        let mut params = Vec::new();
        let sql = self.render_into(dialect, &mut params)?;
        Ok(Statement {
            kind: self.kind,
            sql,
            params,
        })
    }

    /// Render into a parameter list shared with an enclosing statement.
    pub fn render_into(&self, dialect: Dialect, params: &mut Vec<Value>) -> Result<String> {
        if let Some(err) = &self.error {
            return Err(Error::Builder(err.clone()));
        }
        let table = self.table.as_ref().ok_or_else(|| {
            Error::builder(
                QueryBuilderErrorKind::MissingTable,
                format!("{} statement has no table", self.kind),
            )
        })?;
        // Render into a scratch list so a failure leaves `params` untouched.
        let mut scratch = params.clone();
        let sql = match self.kind {
            StatementKind::Select => self.render_select(dialect, table, &mut scratch)?,
            StatementKind::Count => self.render_count(dialect, table, &mut scratch)?,
            StatementKind::Insert => self.render_insert(dialect, table, &mut scratch)?,
            StatementKind::Update => self.render_update(dialect, table, &mut scratch)?,
            StatementKind::Delete => self.render_delete(dialect, table, &mut scratch)?,
        };
        *params = scratch;
        Ok(sql)
    }

    fn render_from(&self, dialect: Dialect, table: &Table, params: &mut Vec<Value>) -> Result<String> {
        let mut sql = format!(" FROM {}", table.render(dialect));
        for join in &self.joins {
            sql.push_str(&join.render(dialect, params)?);
        }
        self.push_where(&mut sql, dialect, params)?;
        Ok(sql)
    }

    fn push_where(&self, sql: &mut String, dialect: Dialect, params: &mut Vec<Value>) -> Result<()> {
        if !self.where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clause.render(dialect, params)?);
        }
        Ok(())
    }

    fn render_select(&self, dialect: Dialect, table: &Table, params: &mut Vec<Value>) -> Result<String> {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            let cols: Vec<_> = self.columns.iter().map(|c| c.render(dialect)).collect();
            sql.push_str(&cols.join(", "));
        }

        sql.push_str(&self.render_from(dialect, table, params)?);

        if !self.group_by.is_empty() {
            let cols: Vec<_> = self.group_by.iter().map(|c| c.render_ref(dialect)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&cols.join(", "));
        }

        if !self.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.having.render(dialect, params)?);
        }

        if !self.order_by.is_empty() {
            let orders: Vec<_> = self.order_by.iter().map(|o| o.render(dialect)).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(Limit(n)), _) => sql.push_str(&format!(" LIMIT {n}")),
            // SQLite and MySQL reject OFFSET without LIMIT.
            (None, Some(_)) => match dialect {
                Dialect::Sqlite => sql.push_str(" LIMIT -1"),
                Dialect::Mysql => sql.push_str(" LIMIT 18446744073709551615"),
                Dialect::Postgres => {}
            },
            (None, None) => {}
        }

        if let Some(Offset(n)) = self.offset {
            sql.push_str(&format!(" OFFSET {n}"));
        }

        Ok(sql)
    }

    /// Grouped or distinct selects are counted as a derived table so the
    /// count reflects the number of groups rather than the number of rows.
    fn render_count(&self, dialect: Dialect, table: &Table, params: &mut Vec<Value>) -> Result<String> {
        if self.distinct || !self.group_by.is_empty() {
            let mut inner = self.clone();
            inner.kind = StatementKind::Select;
            inner.order_by.clear();
            inner.limit = None;
            inner.offset = None;
            let inner_sql = inner.render_select(dialect, table, params)?;
            return Ok(format!(
                "SELECT COUNT(*) AS {} FROM ({inner_sql}) AS {}",
                dialect.quote_identifier("count"),
                dialect.quote_identifier("counted")
            ));
        }
        Ok(format!(
            "SELECT COUNT(*) AS {}{}",
            dialect.quote_identifier("count"),
            self.render_from(dialect, table, params)?
        ))
    }

    fn render_insert(&self, dialect: Dialect, table: &Table, params: &mut Vec<Value>) -> Result<String> {
        if self.data.is_empty() {
            return Ok(match dialect {
                Dialect::Mysql => format!("INSERT INTO {} () VALUES ()", table.render(dialect)),
                Dialect::Postgres | Dialect::Sqlite => {
                    format!("INSERT INTO {} DEFAULT VALUES", table.render(dialect))
                }
            });
        }
        let columns: Vec<_> = self.data.iter().map(|d| d.render_column(dialect)).collect();
        let mut values = Vec::with_capacity(self.data.len());
        for d in &self.data {
            values.push(d.render_value(dialect, params)?);
        }
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.render(dialect),
            columns.join(", "),
            values.join(", ")
        ))
    }

    fn render_update(&self, dialect: Dialect, table: &Table, params: &mut Vec<Value>) -> Result<String> {
        if self.data.is_empty() {
            return Err(Error::builder(
                QueryBuilderErrorKind::EmptyData,
                format!("UPDATE {} has no assignments", table.name),
            ));
        }
        let mut sets = Vec::with_capacity(self.data.len());
        for d in &self.data {
            sets.push(d.render_assignment(dialect, params)?);
        }
        let mut sql = format!("UPDATE {} SET {}", table.render(dialect), sets.join(", "));
        self.push_where(&mut sql, dialect, params)?;
        Ok(sql)
    }

    fn render_delete(&self, dialect: Dialect, table: &Table, params: &mut Vec<Value>) -> Result<String> {
        let mut sql = format!("DELETE FROM {}", table.render(dialect));
        self.push_where(&mut sql, dialect, params)?;
        Ok(sql)
    }

    // ==================== Execution ====================

    fn prepare<C: Connection>(&self, conn: &C) -> Result<Statement> {
        let stmt = self.resolve_with(conn.dialect())?;
        tracing::debug!(
            kind = %stmt.kind,
            sql = %stmt.sql,
            params = stmt.params.len(),
            "Executing statement"
        );
        Ok(stmt)
    }

    /// Run the statement and return every row.
    pub async fn fetch_all<C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<Vec<Row>, Error> {
        let stmt = match self.prepare(conn) {
            Ok(s) => s,
            Err(e) => return Outcome::Err(e),
        };
        let outcome = conn.query(cx, &stmt.sql, &stmt.params).await;
        log_outcome(&stmt, &outcome);
        outcome
    }

    /// Run the statement and return the first row.
    pub async fn fetch_one<C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<Option<Row>, Error> {
        let stmt = match self.prepare(conn) {
            Ok(s) => s,
            Err(e) => return Outcome::Err(e),
        };
        let outcome = conn.query_one(cx, &stmt.sql, &stmt.params).await;
        log_outcome(&stmt, &outcome);
        outcome
    }

    /// Run a count statement and return the number.
    pub async fn fetch_count<C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<i64, Error> {
        match self.fetch_one(cx, conn).await {
            Outcome::Ok(row) => {
                let count = row.as_ref().and_then(|r| r.get(0)).and_then(Value::as_i64);
                Outcome::Ok(count.unwrap_or(0))
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Run an UPDATE/DELETE (or any statement) and return the affected row count.
    pub async fn execute<C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        let stmt = match self.prepare(conn) {
            Ok(s) => s,
            Err(e) => return Outcome::Err(e),
        };
        let outcome = conn.execute(cx, &stmt.sql, &stmt.params).await;
        log_outcome(&stmt, &outcome);
        outcome
    }

    /// Run an INSERT and return the generated id.
    pub async fn insert_returning_id<C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<i64, Error> {
        let stmt = match self.prepare(conn) {
            Ok(s) => s,
            Err(e) => return Outcome::Err(e),
        };
        let outcome = conn.insert(cx, &stmt.sql, &stmt.params).await;
        log_outcome(&stmt, &outcome);
        outcome
    }
}

fn log_outcome<T>(stmt: &Statement, outcome: &Outcome<T, Error>) {
    match outcome {
        Outcome::Ok(_) => tracing::trace!(sql = %stmt.sql, "Statement succeeded"),
        Outcome::Err(e) => tracing::warn!(sql = %stmt.sql, error = %e, "Statement failed"),
        Outcome::Cancelled(_) => tracing::debug!(sql = %stmt.sql, "Statement cancelled"),
        Outcome::Panicked(_) => tracing::warn!(sql = %stmt.sql, "Statement panicked"),
    }
}
