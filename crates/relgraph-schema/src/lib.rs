//! Relationship inference for relgraph.
//!
//! This crate provides:
//! - Catalog introspection for SQLite, MySQL, PostgreSQL
//! - Inference of one-to-one, many-to-one, one-to-many and many-to-many
//!   relationships from foreign keys, including pivot table detection
//! - Memoized name derivation (normalize, camelize, underscore, pluralize)
//! - Graph persistence through a pluggable [`SchemaCache`]

pub mod cache;
pub mod infer;
pub mod introspect;
pub mod loader;
pub mod model;
pub mod naming;

pub use cache::{MemorySchemaCache, SchemaCache, cache_key};
pub use infer::infer;
pub use introspect::{Catalog, CatalogRows, ColumnRow, ConnectionCatalog, ForeignKeyRow};
pub use loader::{SchemaLoader, SchemaLoaderConfig};
pub use model::{ColumnType, Schema, TableKind, TableModel};

use asupersync::{Cx, Outcome};
use relgraph_core::{Connection, Error};
use std::sync::Arc;

/// Introspect `namespace` through `conn` and infer its graph, without caching.
///
/// # Example
///
/// ```ignore
/// let schema = load_schema(&cx, &conn, "public").await?;
/// let accounts = schema.relationship("project", "accounts")?;
/// ```
pub async fn load_schema<C: Connection>(
    cx: &Cx,
    conn: &C,
    namespace: &str,
) -> Outcome<Arc<Schema>, Error> {
    SchemaLoader::default()
        .load(cx, &ConnectionCatalog::new(conn), namespace)
        .await
}
