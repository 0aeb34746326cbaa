//! Session construction.
//!
//! [`SessionBuilder`] collects configuration, an optional preloaded graph,
//! a schema loader (optionally cache-backed) and an optional shared identity
//! map, then produces a [`Session`].
//!
//! # Example
//!
//! ```rust,ignore
//! use relgraph::prelude::*;
//!
//! let session = SessionBuilder::new()
//!     .namespace("public")
//!     .with_cache(Arc::new(MemorySchemaCache::new()))
//!     .connect(&cx, connection)
//!     .await?;
//! ```

use std::sync::Arc;

use asupersync::{Cx, Outcome};
use relgraph_core::{Connection, Error, Result, SchemaErrorKind};
use relgraph_schema::{Schema, SchemaCache, SchemaLoader, SchemaLoaderConfig};
use relgraph_session::{IdentityMap, Session, SessionConfig};

/// Builder for [`Session`] instances.
#[derive(Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    loader_config: SchemaLoaderConfig,
    cache: Option<Arc<dyn SchemaCache>>,
    schema: Option<Arc<Schema>>,
    identity_map: Option<Arc<IdentityMap>>,
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("config", &self.config)
            .field("loader_config", &self.loader_config)
            .field("cached", &self.cache.is_some())
            .field("schema", &self.schema.as_ref().map(|s| s.namespace.as_str()))
            .field("shared_identity_map", &self.identity_map.is_some())
            .finish()
    }
}

impl SessionBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace whose graph the session works against (default `public`).
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn reload_after_commit(mut self, value: bool) -> Self {
        self.config.reload_after_commit = value;
        self
    }

    #[must_use]
    pub fn use_transactions(mut self, value: bool) -> Self {
        self.config.use_transactions = value;
        self
    }

    /// Version and lifetime of cached graphs.
    #[must_use]
    pub fn loader_config(mut self, config: SchemaLoaderConfig) -> Self {
        self.loader_config = config;
        self
    }

    /// Read and write inferred graphs through `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn SchemaCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Skip introspection and use an already inferred graph.
    ///
    /// The namespace follows the graph.
    #[must_use]
    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.config.namespace = schema.namespace.clone();
        self.schema = Some(schema);
        self
    }

    /// Share one identity map between several sessions.
    #[must_use]
    pub fn with_identity_map(mut self, identity_map: Arc<IdentityMap>) -> Self {
        self.identity_map = Some(identity_map);
        self
    }

    fn loader(&self) -> SchemaLoader {
        let loader = SchemaLoader::new(self.loader_config.clone());
        match &self.cache {
            Some(cache) => loader.with_cache(Arc::clone(cache)),
            None => loader,
        }
    }

    fn finish<C: Connection>(self, session: Session<C>) -> Session<C> {
        match self.identity_map {
            Some(map) => session.with_identity_map(map),
            None => session,
        }
    }

    /// Build over a graph supplied with [`with_schema`](Self::with_schema).
    pub fn build_with<C: Connection>(mut self, connection: C) -> Result<Session<C>> {
        let Some(schema) = self.schema.take() else {
            return Err(Error::schema(
                SchemaErrorKind::UnknownNamespace,
                format!(
                    "no graph loaded for namespace '{}'; use connect() to introspect",
                    self.config.namespace
                ),
            ));
        };
        tracing::debug!(
            namespace = %schema.namespace,
            tables = schema.tables.len(),
            "Using supplied relationship graph"
        );
        let session = Session::with_config(connection, schema, self.config.clone())?;
        Ok(self.finish(session))
    }

    /// Build, introspecting the connection unless a graph was supplied.
    pub async fn connect<C: Connection>(self, cx: &Cx, connection: C) -> Outcome<Session<C>, Error> {
        if self.schema.is_some() {
            return match self.build_with(connection) {
                Ok(session) => Outcome::Ok(session),
                Err(e) => Outcome::Err(e),
            };
        }
        let loader = self.loader();
        tracing::debug!(
            namespace = %self.config.namespace,
            cached = self.cache.is_some(),
            "Loading relationship graph"
        );
        match Session::open(cx, connection, self.config.clone(), &loader).await {
            Outcome::Ok(session) => {
                tracing::info!(
                    namespace = session.namespace(),
                    tables = session.schema().tables.len(),
                    shared_identity_map = self.identity_map.is_some(),
                    "Session connected"
                );
                Outcome::Ok(self.finish(session))
            }
            Outcome::Err(e) => {
                tracing::warn!(namespace = %self.config.namespace, error = %e, "Session connect failed");
                Outcome::Err(e)
            }
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}
