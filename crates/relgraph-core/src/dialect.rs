//! Backend dialects.
//!
//! Statement shape is identical across backends; a dialect only decides how
//! identifiers are quoted and how positional placeholders are spelled.

use serde::{Deserialize, Serialize};

/// SQL dialect of the connected backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// SQLite dialect (uses ?1, ?2 placeholders)
    Sqlite,
    /// MySQL dialect (uses ? placeholders)
    Mysql,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are doubled:
    /// - For Postgres/SQLite: `"` becomes `""`
    /// - For MySQL: `` ` `` becomes ``` `` ```
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
            Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
        }
    }

    /// Quote a dotted path segment by segment, leaving `*` bare.
    pub fn quote_path<'a>(self, segments: impl IntoIterator<Item = &'a str>) -> String {
        segments
            .into_iter()
            .map(|s| {
                if s == "*" {
                    s.to_string()
                } else {
                    self.quote_identifier(s)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Name used in logs and cache keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
            Dialect::Mysql => "mysql",
        }
    }
}
