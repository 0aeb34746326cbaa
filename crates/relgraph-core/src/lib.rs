//! Core types and traits for relgraph.
//!
//! This crate provides the foundational abstractions shared by the query
//! builder, the schema inference engine and the entity session:
//!
//! - `Connection` trait for statement execution
//! - `Value` and `Row` for dynamically typed data
//! - `Dialect` for identifier quoting and placeholders
//! - `Relationship` metadata produced by schema inference
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod dialect;
pub mod error;
pub mod relationship;
pub mod row;
pub mod value;

pub use connection::Connection;
pub use dialect::Dialect;
pub use error::{
    CacheError, CommitError, Error, QueryBuilderError, QueryBuilderErrorKind, QueryError,
    QueryErrorKind, RelationshipError, RelationshipErrorKind, Result, RowStateError,
    RowStateErrorKind, SchemaError, SchemaErrorKind,
};
pub use relationship::{PivotInfo, Relationship, RelationshipKind};
pub use row::{FromValue, Row};
pub use value::Value;
