//! JOIN clause types.

use crate::expr::{Operand, Where};
use crate::ident::{Column, Table};
use relgraph_core::{Dialect, Error, QueryBuilderErrorKind, Result, Value};

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Cross,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }
}

/// A JOIN clause.
///
/// The ON condition compares columns with columns; it is built from
/// `(affix key, column reference)` pairs.
#[derive(Debug, Clone)]
pub struct Join {
    pub join_type: JoinType,
    pub table: Table,
    pub on: Option<Where>,
}

impl Join {
    /// Create an INNER JOIN.
    ///
    /// ```
    /// use relgraph_core::Dialect;
    /// use relgraph_query::Join;
    ///
    /// let join = Join::inner("account", &[("account.id", "account_project.account_id")]).unwrap();
    /// let mut params = Vec::new();
    /// assert_eq!(
    ///     join.render(Dialect::Postgres, &mut params).unwrap(),
    ///     " INNER JOIN \"account\" ON \"account\".\"id\" = \"account_project\".\"account_id\""
    /// );
    /// ```
    pub fn inner(table: &str, on: &[(&str, &str)]) -> Result<Self> {
        Self::with_on(JoinType::Inner, table, on)
    }

    /// Create a LEFT JOIN.
    pub fn left(table: &str, on: &[(&str, &str)]) -> Result<Self> {
        Self::with_on(JoinType::Left, table, on)
    }

    /// Create a CROSS JOIN.
    pub fn cross(table: &str) -> Result<Self> {
        Ok(Self {
            join_type: JoinType::Cross,
            table: Table::parse(table)?,
            on: None,
        })
    }

    fn with_on(join_type: JoinType, table: &str, on: &[(&str, &str)]) -> Result<Self> {
        if on.is_empty() {
            return Err(Error::builder(
                QueryBuilderErrorKind::Arity,
                format!("{} {table} needs at least one ON pair", join_type.as_str()),
            ));
        }
        let on = on
            .iter()
            .map(|(key, column)| Where::clause(key, Operand::Column(Column::parse(column)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            join_type,
            table: Table::parse(table)?,
            on: Some(Where::And(on)),
        })
    }

    /// Render with a leading space, ready to append to a FROM clause.
    pub fn render(&self, dialect: Dialect, params: &mut Vec<Value>) -> Result<String> {
        let mut sql = format!(" {} {}", self.join_type.as_str(), self.table.render(dialect));
        if let Some(on) = self.on.as_ref().filter(|w| !w.is_empty()) {
            sql.push_str(" ON ");
            sql.push_str(&on.render(dialect, params)?);
        }
        Ok(sql)
    }
}
