//! relgraph - relationship graphs over existing SQL databases.
//!
//! relgraph reads foreign-key constraints from a live database, infers the
//! relationships between tables, and lets code walk those relationships
//! without declaring a model per table:
//!
//! - Relationship inference: one-to-one, many-to-one, one-to-many and
//!   many-to-many (through detected pivot tables)
//! - An affix-grammar query builder (`"title%"`, `"!id"`, `"id#>="`)
//! - An identity-mapped session with batched relationship loading
//! - A transactional commit protocol for rows and pivot memberships
//!
//! # Quick Start
//!
//! ```ignore
//! use relgraph::prelude::*;
//!
//! async fn walk(cx: &Cx, conn: impl Connection) {
//!     let session = SessionBuilder::new()
//!         .namespace("public")
//!         .connect(cx, conn)
//!         .await
//!         .unwrap();
//!
//!     let filter = Where::clause("title%", "Apollo%").unwrap();
//!     let projects = session
//!         .find_all(cx, "project", filter, FindOptions::new())
//!         .await
//!         .unwrap();
//!
//!     // Two statements whatever the number of projects.
//!     let members = session.group_join(cx, &projects, "accounts", None).await.unwrap();
//!
//!     let mut working = projects.first().unwrap().unlock();
//!     working.set("title", "Apollo 11").unwrap();
//!     session.commit(cx, working).await.unwrap();
//! }
//! ```
//!
//! # Crates
//!
//! - `relgraph-core`: `Connection`, `Value`, `Row`, `Dialect`, errors
//! - `relgraph-query`: statement construction
//! - `relgraph-schema`: introspection, inference, graph caching
//! - `relgraph-session`: entities, identity map, resolution, commit

pub use relgraph_core::{
    CommitError, Connection, Cx, Dialect, Error, Outcome, PivotInfo, QueryBuilderErrorKind,
    Relationship, RelationshipErrorKind, RelationshipKind, Result, Row, RowStateErrorKind,
    SchemaErrorKind, Value,
};

pub use relgraph_query::{
    Column, Comparator, Join, JoinType, OrderBy, QueryBuilder, Statement, StatementKind, Table,
    Where, extract_affix,
};

pub use relgraph_schema::{
    Catalog, CatalogRows, ColumnRow, ColumnType, ConnectionCatalog, ForeignKeyRow,
    MemorySchemaCache, Schema, SchemaCache, SchemaLoader, SchemaLoaderConfig, TableKind,
    TableModel, infer, load_schema,
};

pub use relgraph_session::{
    Collection, CommitPlan, Data, Entity, EntityKey, FindOptions, IdentityMap, Related, RowState,
    Session, SessionConfig,
};

pub mod session;
pub use session::SessionBuilder;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use relgraph::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // asupersync
        Cx,
        Outcome,
        // Core
        Connection,
        Error,
        Result,
        Row,
        Value,
        // Query building
        QueryBuilder,
        Where,
        // Schema
        MemorySchemaCache,
        Schema,
        SchemaLoader,
        // Session
        Collection,
        Data,
        Entity,
        FindOptions,
        Related,
        Session,
        SessionBuilder,
        SessionConfig,
    };
}
