//! Statement construction for relgraph.
//!
//! `relgraph-query` is the **query construction layer**. It turns affix keys
//! (`"title%"`, `"!id"`, `"id#>="`), operands and identifier paths into SQL
//! text plus an ordered parameter list, and executes the result through the
//! `Connection` trait from `relgraph-core`.
//!
//! # Role In The Architecture
//!
//! - **Identifiers**: [`Column`] and [`Table`] parse and quote dotted paths.
//! - **Affix grammar**: [`extract_affix`] splits a key into column, comparator and count flag.
//! - **Where-trees**: [`Where`] composes conditions with AND/OR/NOT.
//! - **Statements**: [`QueryBuilder`] renders select/count/insert/update/delete.
//!
//! The schema and session crates build every statement they run through this
//! crate, so dialect handling lives in one place.

pub mod affix;
pub mod builder;
pub mod clause;
pub mod data;
pub mod expr;
pub mod ident;
pub mod join;
pub mod subquery;

pub use affix::{Affix, Comparator, extract_affix};
pub use builder::{QueryBuilder, Statement, StatementKind};
pub use clause::{Limit, Offset, OrderBy, OrderDirection};
pub use data::{Data, DataValue};
pub use expr::{Condition, Operand, Where};
pub use ident::{Column, Table};
pub use join::{Join, JoinType};
pub use subquery::Subquery;
