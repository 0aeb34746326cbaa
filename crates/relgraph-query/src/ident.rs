//! Column and table identifier nodes.
//!
//! Identifiers are parsed from dotted strings (`schema.table.column AS alias`)
//! or from structural parts, and every segment is quoted when rendered. A
//! bare `*` segment is passed through unquoted.

use relgraph_core::{Dialect, Error, QueryBuilderErrorKind, Result};

fn malformed(input: &str, why: &str) -> Error {
    Error::builder(
        QueryBuilderErrorKind::MalformedIdentifier,
        format!("malformed identifier '{input}': {why}"),
    )
}

/// Split `expr AS alias` into its parts.
fn split_alias(input: &str) -> Result<(&str, Option<&str>)> {
    let tokens: Vec<&str> = input.split_whitespace().collect();
    match tokens.as_slice() {
        [] => Err(malformed(input, "empty")),
        [path] => Ok((path, None)),
        [path, kw, alias] if kw.eq_ignore_ascii_case("as") => Ok((path, Some(alias))),
        _ => Err(malformed(input, "expected `path` or `path AS alias`")),
    }
}

fn check_segment(input: &str, segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(malformed(input, "empty segment"));
    }
    if segment.chars().any(|c| c.is_whitespace() || c == '\0') {
        return Err(malformed(input, "segment contains whitespace"));
    }
    Ok(())
}

/// A column reference: `[schema.][table.]name [AS alias]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub schema: Option<String>,
    pub table: Option<String>,
    /// Column name, or `*`.
    pub name: String,
    pub alias: Option<String>,
}

impl Column {
    /// Parse a dotted column reference.
    ///
    /// ```
    /// use relgraph_query::Column;
    ///
    /// let col = Column::parse("public.project.title AS t").unwrap();
    /// assert_eq!(col.schema.as_deref(), Some("public"));
    /// assert_eq!(col.table.as_deref(), Some("project"));
    /// assert_eq!(col.name, "title");
    /// assert_eq!(col.alias.as_deref(), Some("t"));
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let (path, alias) = split_alias(input.trim())?;
        let segments: Vec<&str> = path.split('.').collect();
        if segments.len() > 3 {
            return Err(malformed(input, "at most schema.table.column"));
        }
        for segment in &segments {
            check_segment(input, segment)?;
        }
        if let Some(alias) = alias {
            check_segment(input, alias)?;
        }
        let mut column = Self::from_segments(input, &segments)?;
        column.alias = alias.map(str::to_string);
        if column.is_star() && column.alias.is_some() {
            return Err(malformed(input, "`*` cannot be aliased"));
        }
        Ok(column)
    }

    /// Build a column from structural parts: `[name]`, `[table, name]` or
    /// `[schema, table, name]`.
    pub fn from_parts(parts: &[&str]) -> Result<Self> {
        if parts.is_empty() || parts.len() > 3 {
            return Err(Error::builder(
                QueryBuilderErrorKind::Arity,
                format!("column form takes 1 to 3 parts, got {}", parts.len()),
            ));
        }
        let joined = parts.join(".");
        for part in parts {
            check_segment(&joined, part)?;
            if part.contains('.') {
                return Err(malformed(&joined, "structural part contains '.'"));
            }
        }
        Self::from_segments(&joined, parts)
    }

    /// Parse a mapping form `alias => column`.
    pub fn aliased(alias: &str, column: &str) -> Result<Self> {
        let mut parsed = Self::parse(column)?;
        check_segment(alias, alias)?;
        if parsed.is_star() {
            return Err(malformed(column, "`*` cannot be aliased"));
        }
        parsed.alias = Some(alias.to_string());
        Ok(parsed)
    }

    fn from_segments(input: &str, segments: &[&str]) -> Result<Self> {
        let (schema, table, name) = match segments {
            [name] => (None, None, *name),
            [table, name] => (None, Some(*table), *name),
            [schema, table, name] => (Some(*schema), Some(*table), *name),
            _ => return Err(malformed(input, "bad segment count")),
        };
        if segments[..segments.len() - 1].contains(&"*") {
            return Err(malformed(input, "`*` only allowed as the last segment"));
        }
        Ok(Self {
            schema: schema.map(str::to_string),
            table: table.map(str::to_string),
            name: name.to_string(),
            alias: None,
        })
    }

    /// A column qualified by its table.
    pub fn qualified(table: &str, name: &str) -> Self {
        Self {
            schema: None,
            table: Some(table.to_string()),
            name: name.to_string(),
            alias: None,
        }
    }

    pub fn is_star(&self) -> bool {
        self.name == "*"
    }

    /// Unquoted dotted path, without alias.
    pub fn path(&self) -> String {
        self.schema
            .iter()
            .chain(self.table.iter())
            .map(String::as_str)
            .chain(std::iter::once(self.name.as_str()))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Render the reference without its alias (WHERE, GROUP BY, ORDER BY).
    pub fn render_ref(&self, dialect: Dialect) -> String {
        dialect.quote_path(
            self.schema
                .iter()
                .chain(self.table.iter())
                .map(String::as_str)
                .chain(std::iter::once(self.name.as_str())),
        )
    }

    /// Render the reference with `AS alias` (select lists).
    pub fn render(&self, dialect: Dialect) -> String {
        match &self.alias {
            Some(alias) => format!(
                "{} AS {}",
                self.render_ref(dialect),
                dialect.quote_identifier(alias)
            ),
            None => self.render_ref(dialect),
        }
    }
}

/// A table reference: `[schema.]name [AS alias]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub schema: Option<String>,
    pub name: String,
    pub alias: Option<String>,
}

impl Table {
    pub fn parse(input: &str) -> Result<Self> {
        let (path, alias) = split_alias(input.trim())?;
        let segments: Vec<&str> = path.split('.').collect();
        for segment in &segments {
            check_segment(input, segment)?;
            if *segment == "*" {
                return Err(malformed(input, "`*` is not a table"));
            }
        }
        if let Some(alias) = alias {
            check_segment(input, alias)?;
        }
        let (schema, name) = match segments.as_slice() {
            [name] => (None, *name),
            [schema, name] => (Some(*schema), *name),
            _ => return Err(malformed(input, "at most schema.table")),
        };
        Ok(Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
            alias: alias.map(str::to_string),
        })
    }

    /// Build a table from `[name]` or `[schema, name]`.
    pub fn from_parts(parts: &[&str]) -> Result<Self> {
        match parts {
            [name] => Self::parse(name),
            [schema, name] => {
                let joined = format!("{schema}.{name}");
                check_segment(&joined, schema)?;
                check_segment(&joined, name)?;
                Ok(Self {
                    schema: Some((*schema).to_string()),
                    name: (*name).to_string(),
                    alias: None,
                })
            }
            _ => Err(Error::builder(
                QueryBuilderErrorKind::Arity,
                format!("table form takes 1 or 2 parts, got {}", parts.len()),
            )),
        }
    }

    pub fn named(name: &str) -> Self {
        Self {
            schema: None,
            name: name.to_string(),
            alias: None,
        }
    }

    /// Name other clauses use to qualify this table's columns.
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn render(&self, dialect: Dialect) -> String {
        let path = dialect.quote_path(
            self.schema
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(self.name.as_str())),
        );
        match &self.alias {
            Some(alias) => format!("{path} AS {}", dialect.quote_identifier(alias)),
            None => path,
        }
    }
}
