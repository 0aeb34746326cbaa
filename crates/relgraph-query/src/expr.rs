//! Where-tree expressions for WHERE, ON and HAVING clauses.
//!
//! A [`Where`] is built from affix keys paired with operands and renders
//! into SQL text while appending bound values to a shared parameter list.
//! User-supplied values never reach the SQL text except through a
//! placeholder, with three deliberate exceptions: `NULL`, temporal values
//! (quoted literals) and [`Operand::Raw`].

use crate::affix::{Comparator, extract_affix};
use crate::builder::QueryBuilder;
use crate::ident::Column;
use crate::subquery::Subquery;
use relgraph_core::{Dialect, Error, QueryBuilderErrorKind, Result, Value};

/// Right-hand side of a comparison.
#[derive(Debug, Clone)]
pub enum Operand {
    /// A literal, bound as a parameter.
    Value(Value),
    /// Another column (join conditions).
    Column(Column),
    /// A nested query.
    Subquery(Subquery),
    /// SQL text inserted verbatim. The caller is responsible for its safety.
    Raw(String),
}

impl Operand {
    pub fn raw(sql: impl Into<String>) -> Self {
        Operand::Raw(sql.into())
    }

    /// Parse a column reference operand.
    pub fn column(reference: &str) -> Result<Self> {
        Column::parse(reference).map(Operand::Column)
    }

    pub fn null() -> Self {
        Operand::Value(Value::Null)
    }
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Value(v)
    }
}

impl From<i64> for Operand {
    fn from(v: i64) -> Self {
        Operand::Value(Value::BigInt(v))
    }
}

impl From<i32> for Operand {
    fn from(v: i32) -> Self {
        Operand::Value(Value::Int(v))
    }
}

impl From<bool> for Operand {
    fn from(v: bool) -> Self {
        Operand::Value(Value::Bool(v))
    }
}

impl From<&str> for Operand {
    fn from(v: &str) -> Self {
        Operand::Value(Value::from(v))
    }
}

impl From<String> for Operand {
    fn from(v: String) -> Self {
        Operand::Value(Value::Text(v))
    }
}

impl From<Vec<Value>> for Operand {
    fn from(v: Vec<Value>) -> Self {
        Operand::Value(Value::Array(v))
    }
}

impl From<Vec<i64>> for Operand {
    fn from(v: Vec<i64>) -> Self {
        Operand::Value(Value::from(v))
    }
}

impl From<Subquery> for Operand {
    fn from(v: Subquery) -> Self {
        Operand::Subquery(v)
    }
}

impl From<QueryBuilder> for Operand {
    fn from(v: QueryBuilder) -> Self {
        Operand::Subquery(Subquery::new(v))
    }
}

/// One comparison: `column <comparator> operand`.
#[derive(Debug, Clone)]
pub struct Condition {
    pub column: Column,
    pub comparator: Comparator,
    /// Compare `COUNT(column)` instead of the column.
    pub count: bool,
    pub operand: Operand,
}

/// A boolean expression tree.
#[derive(Debug, Clone)]
pub enum Where {
    Compare(Condition),
    And(Vec<Where>),
    Or(Vec<Where>),
    /// Negation of a raw fragment; every other node negates structurally.
    Not(Box<Where>),
    Raw(String),
}

impl Default for Where {
    fn default() -> Self {
        Where::And(Vec::new())
    }
}

impl Where {
    /// Parse an affix key and pair it with an operand.
    ///
    /// ```
    /// use relgraph_core::{Dialect, Value};
    /// use relgraph_query::Where;
    ///
    /// let w = Where::clause("id>=", 3i64).unwrap();
    /// let mut params = Vec::new();
    /// let sql = w.render(Dialect::Postgres, &mut params).unwrap();
    /// assert_eq!(sql, "\"id\" >= $1");
    /// assert_eq!(params, vec![Value::BigInt(3)]);
    /// ```
    pub fn clause(key: &str, operand: impl Into<Operand>) -> Result<Self> {
        let affix = extract_affix(key)?;
        Self::condition(affix.column, affix.comparator, affix.count, operand.into())
    }

    /// Build a comparison from already parsed parts.
    pub fn compare(column: Column, comparator: Comparator, operand: impl Into<Operand>) -> Result<Self> {
        Self::condition(column, comparator, false, operand.into())
    }

    fn condition(
        column: Column,
        comparator: Comparator,
        count: bool,
        operand: Operand,
    ) -> Result<Self> {
        if column.alias.is_some() {
            return Err(Error::builder(
                QueryBuilderErrorKind::InvalidClause,
                format!("clause column '{}' cannot carry an alias", column.path()),
            ));
        }
        if let Operand::Value(Value::Array(_)) = operand {
            if !matches!(
                comparator,
                Comparator::Eq | Comparator::Ne | Comparator::Like | Comparator::NotLike
            ) {
                return Err(Error::builder(
                    QueryBuilderErrorKind::InvalidClause,
                    format!(
                        "list value cannot be compared with '{}' on '{}'",
                        comparator,
                        column.path()
                    ),
                ));
            }
        }
        Ok(Where::Compare(Condition {
            column,
            comparator,
            count,
            operand,
        }))
    }

    /// Conjunction of several `(key, operand)` pairs.
    pub fn all<K, O>(pairs: impl IntoIterator<Item = (K, O)>) -> Result<Self>
    where
        K: AsRef<str>,
        O: Into<Operand>,
    {
        pairs
            .into_iter()
            .map(|(k, o)| Self::clause(k.as_ref(), o))
            .collect::<Result<Vec<_>>>()
            .map(Where::And)
    }

    /// Disjunction of several `(key, operand)` pairs.
    pub fn any<K, O>(pairs: impl IntoIterator<Item = (K, O)>) -> Result<Self>
    where
        K: AsRef<str>,
        O: Into<Operand>,
    {
        pairs
            .into_iter()
            .map(|(k, o)| Self::clause(k.as_ref(), o))
            .collect::<Result<Vec<_>>>()
            .map(Where::Or)
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Where::Raw(sql.into())
    }

    /// True when rendering would produce no condition at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Where::And(items) | Where::Or(items) => items.iter().all(Where::is_empty),
            _ => false,
        }
    }

    pub fn and(self, other: Where) -> Self {
        match (self, other) {
            (a, b) if b.is_empty() => a,
            (a, b) if a.is_empty() => b,
            (Where::And(mut items), Where::And(more)) => {
                items.extend(more);
                Where::And(items)
            }
            (Where::And(mut items), b) => {
                items.push(b);
                Where::And(items)
            }
            (a, b) => Where::And(vec![a, b]),
        }
    }

    pub fn or(self, other: Where) -> Self {
        match (self, other) {
            (a, b) if b.is_empty() => a,
            (a, b) if a.is_empty() => b,
            (Where::Or(mut items), Where::Or(more)) => {
                items.extend(more);
                Where::Or(items)
            }
            (Where::Or(mut items), b) => {
                items.push(b);
                Where::Or(items)
            }
            (a, b) => Where::Or(vec![a, b]),
        }
    }

    /// Logical negation, pushed down to the comparisons.
    ///
    /// Conjunctions and disjunctions swap, and each comparator is inverted,
    /// so `not(a > 1 AND b = 2)` renders `a <= 1 OR b != 2`.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        match self {
            Where::Compare(mut c) => {
                c.comparator = c.comparator.invert();
                Where::Compare(c)
            }
            Where::And(items) => Where::Or(items.into_iter().map(Where::not).collect()),
            Where::Or(items) => Where::And(items.into_iter().map(Where::not).collect()),
            Where::Not(inner) => *inner,
            raw @ Where::Raw(_) => Where::Not(Box::new(raw)),
        }
    }

    /// Render into SQL, appending bound values to `params`.
    pub fn render(&self, dialect: Dialect, params: &mut Vec<Value>) -> Result<String> {
        match self {
            Where::Compare(c) => render_condition(c, dialect, params),
            Where::And(items) => render_group(items, " AND ", dialect, params),
            Where::Or(items) => render_group(items, " OR ", dialect, params),
            Where::Not(inner) => Ok(format!("NOT ({})", inner.render(dialect, params)?)),
            Where::Raw(sql) => Ok(sql.clone()),
        }
    }
}

fn render_group(
    items: &[Where],
    separator: &str,
    dialect: Dialect,
    params: &mut Vec<Value>,
) -> Result<String> {
    let mut parts = Vec::with_capacity(items.len());
    for item in items.iter().filter(|w| !w.is_empty()) {
        let sql = item.render(dialect, params)?;
        let nested = matches!(item, Where::And(xs) | Where::Or(xs) if xs.len() > 1);
        parts.push(if nested { format!("({sql})") } else { sql });
    }
    Ok(parts.join(separator))
}

fn render_condition(c: &Condition, dialect: Dialect, params: &mut Vec<Value>) -> Result<String> {
    let lhs = if c.count {
        format!("COUNT({})", c.column.render_ref(dialect))
    } else {
        c.column.render_ref(dialect)
    };
    let op = c.comparator.as_sql();

    let sql = match &c.operand {
        Operand::Value(Value::Null) => match c.comparator {
            Comparator::Eq => format!("{lhs} IS NULL"),
            Comparator::Ne => format!("{lhs} IS NOT NULL"),
            _ => format!("{lhs} {op} NULL"),
        },
        Operand::Value(Value::Array(items)) => render_list(&lhs, c.comparator, items, dialect, params),
        Operand::Value(value) => format!("{lhs} {op} {}", render_value(value, dialect, params)),
        Operand::Column(other) => format!("{lhs} {op} {}", other.render_ref(dialect)),
        Operand::Raw(sql) => format!("{lhs} {op} {sql}"),
        Operand::Subquery(sub) => {
            let op = match c.comparator {
                Comparator::Eq if !sub.is_single_row() => "IN",
                Comparator::Ne if !sub.is_single_row() => "NOT IN",
                _ => op,
            };
            format!("{lhs} {op} {}", sub.render(dialect, params)?)
        }
    };
    Ok(sql)
}

fn render_list(
    lhs: &str,
    comparator: Comparator,
    items: &[Value],
    dialect: Dialect,
    params: &mut Vec<Value>,
) -> String {
    if items.is_empty() {
        // IN () matches nothing; NOT IN () matches everything.
        return if comparator.is_negative() { "true" } else { "false" }.to_string();
    }
    match comparator {
        Comparator::Like | Comparator::NotLike => {
            let joiner = if comparator == Comparator::Like { " OR " } else { " AND " };
            let parts: Vec<_> = items
                .iter()
                .map(|v| format!("{lhs} {} {}", comparator.as_sql(), render_value(v, dialect, params)))
                .collect();
            if parts.len() == 1 {
                parts.join("")
            } else {
                format!("({})", parts.join(joiner))
            }
        }
        _ => {
            let rendered: Vec<_> = items
                .iter()
                .map(|v| render_value(v, dialect, params))
                .collect();
            let keyword = if comparator.is_negative() { "NOT IN" } else { "IN" };
            format!("{lhs} {keyword} ({})", rendered.join(", "))
        }
    }
}

/// Render a scalar value: `NULL` and temporal values inline, everything else bound.
pub(crate) fn render_value(value: &Value, dialect: Dialect, params: &mut Vec<Value>) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }
    if let Some(literal) = value.temporal_literal() {
        return literal;
    }
    params.push(value.clone());
    dialect.placeholder(params.len())
}
