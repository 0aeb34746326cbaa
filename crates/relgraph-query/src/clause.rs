//! ORDER BY, LIMIT and OFFSET clauses.

use crate::ident::Column;
use relgraph_core::{Dialect, Result};

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// ORDER BY clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    column: Column,
    direction: OrderDirection,
}

impl OrderBy {
    /// Create an ascending order by clause.
    pub fn asc(column: &str) -> Result<Self> {
        Ok(Self {
            column: Column::parse(column)?,
            direction: OrderDirection::Asc,
        })
    }

    /// Create a descending order by clause.
    pub fn desc(column: &str) -> Result<Self> {
        Ok(Self {
            column: Column::parse(column)?,
            direction: OrderDirection::Desc,
        })
    }

    /// Parse a sort key; a leading `-` sorts descending.
    pub fn parse(key: &str) -> Result<Self> {
        match key.trim().strip_prefix('-') {
            Some(column) => Self::desc(column),
            None => Self::asc(key),
        }
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }

    /// Generate SQL for this ORDER BY clause.
    pub fn render(&self, dialect: Dialect) -> String {
        let mut sql = self.column.render_ref(dialect);
        sql.push_str(match self.direction {
            OrderDirection::Asc => " ASC",
            OrderDirection::Desc => " DESC",
        });
        sql
    }
}

/// LIMIT clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(pub u64);

/// OFFSET clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset(pub u64);
