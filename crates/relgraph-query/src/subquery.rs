//! Nested queries used as clause operands, data values and derived tables.

use crate::builder::QueryBuilder;
use relgraph_core::{Dialect, Result, Value};

/// A query embedded in another statement.
///
/// Its parameters are appended to the enclosing statement's parameter list
/// at the position where the subquery is rendered.
#[derive(Debug, Clone)]
pub struct Subquery {
    query: Box<QueryBuilder>,
}

impl Subquery {
    pub fn new(query: QueryBuilder) -> Self {
        Self {
            query: Box::new(query),
        }
    }

    /// Can this subquery return at most one row?
    ///
    /// Only an explicit `LIMIT 1` counts.
    pub fn is_single_row(&self) -> bool {
        self.query.limit_value() == Some(1)
    }

    pub fn query(&self) -> &QueryBuilder {
        &self.query
    }

    /// Render as `(SELECT ...)`.
    pub fn render(&self, dialect: Dialect, params: &mut Vec<Value>) -> Result<String> {
        Ok(format!("({})", self.query.render_into(dialect, params)?))
    }
}
