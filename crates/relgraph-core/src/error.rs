//! Error types for relgraph operations.

use std::fmt;

/// The primary error type for all relgraph operations.
#[derive(Debug)]
pub enum Error {
    /// Statement execution errors reported by the connection
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Missing or inconsistent relationship graph
    Schema(SchemaError),
    /// Statement construction errors, raised before any SQL is emitted
    Builder(QueryBuilderError),
    /// Relationship lookup and assignment errors
    Relationship(RelationshipError),
    /// Row state machine violations
    RowState(RowStateError),
    /// A statement failed inside a commit; the transaction was rolled back
    Commit(CommitError),
    /// Schema cache store failures
    Cache(CacheError),
    /// Serialization/deserialization errors
    Serde(String),
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Deadlock detected
    Deadlock,
    /// Serialization failure (retry may succeed)
    Serialization,
    /// Statement timeout
    Timeout,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// No graph has been inferred for the namespace
    UnknownNamespace,
    /// Table not present in the inferred graph
    TableNotFound,
    /// Two relationships on one table derived the same name
    DuplicateRelationship,
    /// Catalog introspection returned unusable rows
    Introspection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBuilderError {
    pub kind: QueryBuilderErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryBuilderErrorKind {
    /// Identifier could not be parsed (empty segment, too many dots, bad alias)
    MalformedIdentifier,
    /// Structural form has the wrong number of parts
    Arity,
    /// Statement kind is not one of select/count/insert/update/delete
    UnknownStatement,
    /// Statement has no target table
    MissingTable,
    /// UPDATE without any assignments
    EmptyData,
    /// Clause key could not be parsed with the affix grammar
    InvalidClause,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipError {
    pub kind: RelationshipErrorKind,
    pub table: String,
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipErrorKind {
    /// No relationship with that name exists on the table
    Unknown,
    /// Pivot with more than two foreign keys accessed without a filter
    MultiKeyPivotUnsupported,
    /// Entity of the wrong table assigned to a many-to-one slot
    WrongEntityType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowStateError {
    pub kind: RowStateErrorKind,
    pub table: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStateErrorKind {
    /// Mutation attempted on a locked snapshot
    Locked,
    /// Mutation attempted after the row was marked deleted
    Deleted,
    /// Column is not part of the table
    UnknownColumn,
    /// Commit requested for a locked snapshot
    NotCommittable,
    /// Primary key value missing where one is required
    MissingPrimaryKey,
}

#[derive(Debug)]
pub struct CommitError {
    pub table: String,
    /// The statement that failed
    pub sql: String,
    pub param_count: usize,
    pub source: Box<Error>,
}

#[derive(Debug)]
pub struct CacheError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Build a [`QueryBuilderError`] wrapped in `Error`.
    pub fn builder(kind: QueryBuilderErrorKind, message: impl Into<String>) -> Self {
        Error::Builder(QueryBuilderError {
            kind,
            message: message.into(),
        })
    }

    /// Build a [`SchemaError`] wrapped in `Error`.
    pub fn schema(kind: SchemaErrorKind, message: impl Into<String>) -> Self {
        Error::Schema(SchemaError {
            kind,
            message: message.into(),
            source: None,
        })
    }

    /// Build a [`RelationshipError`] wrapped in `Error`.
    pub fn relationship(
        kind: RelationshipErrorKind,
        table: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Relationship(RelationshipError {
            kind,
            table: table.into(),
            name: name.into(),
            message: message.into(),
        })
    }

    /// Build a [`RowStateError`] wrapped in `Error`.
    pub fn row_state(
        kind: RowStateErrorKind,
        table: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::RowState(RowStateError {
            kind,
            table: table.into(),
            message: message.into(),
        })
    }

    /// Deadlocks, serialization failures and timeouts may succeed on retry.
    ///
    /// A commit failure is retryable when the statement that broke it is.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Query(q) => matches!(
                q.kind,
                QueryErrorKind::Deadlock | QueryErrorKind::Serialization | QueryErrorKind::Timeout
            ),
            Error::Commit(c) => c.source.is_retryable(),
            _ => false,
        }
    }

    /// Get SQLSTATE if available (e.g., "23505" for unique violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            Error::Commit(c) => c.source.sqlstate(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            Error::Commit(c) => Some(c.sql.as_str()),
            _ => None,
        }
    }

    /// The relationship error kind, if this is one.
    pub fn relationship_kind(&self) -> Option<RelationshipErrorKind> {
        match self {
            Error::Relationship(r) => Some(r.kind),
            _ => None,
        }
    }
}

impl QueryError {
    /// Is this a unique constraint violation?
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23505")
    }

    /// Is this a foreign key violation?
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23503")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Builder(e) => write!(f, "Query builder error: {}", e),
            Error::Relationship(e) => write!(f, "Relationship error: {}", e),
            Error::RowState(e) => write!(f, "Row state error: {}", e),
            Error::Commit(e) => write!(f, "Commit error: {}", e),
            Error::Cache(e) => write!(f, "Schema cache error: {}", e.message),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Schema(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Cache(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Commit(e) => Some(e.source.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for QueryBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for RelationshipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.table, self.name, self.message)
    }
}

impl fmt::Display for RowStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.table, self.message)
    }
}

impl fmt::Display for CommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "commit on '{}' rolled back; statement `{}` ({} params) failed: {}",
            self.table, self.sql, self.param_count, self.source
        )
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<QueryBuilderError> for Error {
    fn from(err: QueryBuilderError) -> Self {
        Error::Builder(err)
    }
}

impl From<RelationshipError> for Error {
    fn from(err: RelationshipError) -> Self {
        Error::Relationship(err)
    }
}

impl From<RowStateError> for Error {
    fn from(err: RowStateError) -> Self {
        Error::RowState(err)
    }
}

impl From<CommitError> for Error {
    fn from(err: CommitError) -> Self {
        Error::Commit(err)
    }
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Self {
        Error::Cache(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for relgraph operations.
pub type Result<T> = std::result::Result<T, Error>;
