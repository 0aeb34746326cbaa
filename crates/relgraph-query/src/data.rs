//! Column assignments for INSERT and UPDATE.

use crate::builder::QueryBuilder;
use crate::expr::render_value;
use crate::ident::Column;
use crate::subquery::Subquery;
use relgraph_core::{Dialect, Error, QueryBuilderErrorKind, Result, Value};

/// The value side of an assignment.
#[derive(Debug, Clone)]
pub enum DataValue {
    /// Bound as a parameter, except `NULL` and temporal values which render inline.
    Value(Value),
    /// SQL text inserted verbatim (`CURRENT_TIMESTAMP`, `counter + 1`).
    Raw(String),
    Subquery(Subquery),
}

impl DataValue {
    pub fn raw(sql: impl Into<String>) -> Self {
        DataValue::Raw(sql.into())
    }
}

impl<T: Into<Value>> From<T> for DataValue {
    fn from(v: T) -> Self {
        DataValue::Value(v.into())
    }
}

impl From<Subquery> for DataValue {
    fn from(v: Subquery) -> Self {
        DataValue::Subquery(v)
    }
}

/// A column paired with the value it receives.
#[derive(Debug, Clone)]
pub struct Data {
    pub column: Column,
    pub value: DataValue,
}

impl Data {
    pub fn new(column: &str, value: impl Into<DataValue>) -> Result<Self> {
        let column = Column::parse(column)?;
        if column.is_star() || column.alias.is_some() {
            return Err(Error::builder(
                QueryBuilderErrorKind::MalformedIdentifier,
                format!("'{}' cannot be assigned to", column.path()),
            ));
        }
        Ok(Self {
            column,
            value: value.into(),
        })
    }

    /// Assign the result of a subquery.
    pub fn subquery(column: &str, query: QueryBuilder) -> Result<Self> {
        Self::new(column, Subquery::new(query))
    }

    /// Quoted bare column name; INSERT column lists cannot be qualified.
    pub fn render_column(&self, dialect: Dialect) -> String {
        dialect.quote_identifier(&self.column.name)
    }

    pub fn render_value(&self, dialect: Dialect, params: &mut Vec<Value>) -> Result<String> {
        match &self.value {
            DataValue::Value(v) => Ok(render_value(v, dialect, params)),
            DataValue::Raw(sql) => Ok(sql.clone()),
            DataValue::Subquery(sub) => sub.render(dialect, params),
        }
    }

    /// Render `column = value` for UPDATE.
    pub fn render_assignment(&self, dialect: Dialect, params: &mut Vec<Value>) -> Result<String> {
        Ok(format!(
            "{} = {}",
            self.render_column(dialect),
            self.render_value(dialect, params)?
        ))
    }
}
