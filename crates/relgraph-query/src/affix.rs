//! Affix grammar for clause keys.
//!
//! A clause key names a column and, through symbols around the name, the
//! comparison to apply: `[!]column[#][op]`.
//!
//! | key       | meaning                         |
//! |-----------|---------------------------------|
//! | `col`     | `col = ?` (`IS NULL` for null)  |
//! | `col!`    | `col != ?` (`IS NOT NULL`)      |
//! | `!col`    | same as `col!`                  |
//! | `col>`    | `col > ?`, likewise `>=` `<` `<=` |
//! | `col%`    | `col LIKE ?`                    |
//! | `col!%`   | `col NOT LIKE ?`                |
//! | `col#>`   | `COUNT(col) > ?`                |
//!
//! A leading `!` inverts whatever comparator the suffix selects.

use crate::ident::Column;
use relgraph_core::{Error, QueryBuilderErrorKind, Result};
use std::fmt;

/// Comparison selected by an affix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
}

/// Suffixes, longest first so `>=` wins over `>`.
const SUFFIXES: [(&str, Comparator); 9] = [
    ("!%", Comparator::NotLike),
    ("!=", Comparator::Ne),
    (">=", Comparator::Ge),
    ("<=", Comparator::Le),
    ("!", Comparator::Ne),
    ("%", Comparator::Like),
    (">", Comparator::Gt),
    ("<", Comparator::Lt),
    ("=", Comparator::Eq),
];

impl Comparator {
    /// Logical negation: `>` becomes `<=`, `=` becomes `!=`, and so on.
    pub const fn invert(self) -> Self {
        match self {
            Comparator::Eq => Comparator::Ne,
            Comparator::Ne => Comparator::Eq,
            Comparator::Gt => Comparator::Le,
            Comparator::Le => Comparator::Gt,
            Comparator::Lt => Comparator::Ge,
            Comparator::Ge => Comparator::Lt,
            Comparator::Like => Comparator::NotLike,
            Comparator::NotLike => Comparator::Like,
        }
    }

    /// SQL operator.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Like => "LIKE",
            Comparator::NotLike => "NOT LIKE",
        }
    }

    /// Canonical suffix that selects this comparator.
    pub const fn suffix(self) -> &'static str {
        match self {
            Comparator::Eq => "",
            Comparator::Ne => "!",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Like => "%",
            Comparator::NotLike => "!%",
        }
    }

    /// Is this one of the (in)equality comparators that accept lists and subqueries as sets?
    pub const fn is_equality(self) -> bool {
        matches!(self, Comparator::Eq | Comparator::Ne)
    }

    /// Is this the negative member of its pair?
    pub const fn is_negative(self) -> bool {
        matches!(self, Comparator::Ne | Comparator::NotLike)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A parsed clause key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affix {
    pub column: Column,
    pub comparator: Comparator,
    /// `#` form: compare `COUNT(column)` instead of the column.
    pub count: bool,
}

impl Affix {
    /// Key that parses back to this affix.
    pub fn key(&self) -> String {
        let mut key = self.column.path();
        if self.count {
            key.push('#');
        }
        key.push_str(self.comparator.suffix());
        key
    }
}

/// Parse a clause key into column, comparator and count flag.
///
/// ```
/// use relgraph_query::{Comparator, extract_affix};
///
/// assert_eq!(extract_affix("id>").unwrap().comparator, Comparator::Gt);
/// assert_eq!(extract_affix("!id").unwrap().comparator, Comparator::Ne);
/// assert!(extract_affix("account_id#").unwrap().count);
/// ```
pub fn extract_affix(key: &str) -> Result<Affix> {
    let trimmed = key.trim();
    let (negated, rest) = match trimmed.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let (name, mut comparator) = SUFFIXES
        .iter()
        .find_map(|(suffix, cmp)| rest.strip_suffix(suffix).map(|name| (name, *cmp)))
        .unwrap_or((rest, Comparator::Eq));

    let (name, count) = match name.strip_suffix('#') {
        Some(name) => (name, true),
        None => (name, false),
    };

    if name.is_empty() || name.contains(['!', '%', '<', '>', '=', '#']) {
        return Err(Error::builder(
            QueryBuilderErrorKind::InvalidClause,
            format!("cannot parse clause key '{key}'"),
        ));
    }
    if negated {
        comparator = comparator.invert();
    }

    Ok(Affix {
        column: Column::parse(name)?,
        comparator,
        count,
    })
}
