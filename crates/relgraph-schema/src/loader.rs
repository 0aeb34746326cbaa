//! Loading a relationship graph, from cache when possible.

use crate::cache::{SchemaCache, cache_key};
use crate::infer::infer;
use crate::introspect::Catalog;
use crate::model::Schema;
use asupersync::{Cx, Outcome};
use relgraph_core::Error;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for [`SchemaLoader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaLoaderConfig {
    /// Schema version; part of every cache key.
    pub version: String,
    /// Lifetime of cached graphs; `None` keeps them until evicted.
    pub ttl: Option<Duration>,
}

impl Default for SchemaLoaderConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            ttl: Some(Duration::from_secs(3600)),
        }
    }
}

impl SchemaLoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Produces the [`Schema`] of a namespace.
///
/// With a cache attached the loader reads the serialized graph first and
/// writes freshly inferred graphs back. Cache failures are logged and
/// never fail the load.
#[derive(Clone, Default)]
pub struct SchemaLoader {
    config: SchemaLoaderConfig,
    cache: Option<Arc<dyn SchemaCache>>,
}

impl std::fmt::Debug for SchemaLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaLoader")
            .field("config", &self.config)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl SchemaLoader {
    pub fn new(config: SchemaLoaderConfig) -> Self {
        Self {
            config,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn SchemaCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &SchemaLoaderConfig {
        &self.config
    }

    pub fn cache_key(&self, namespace: &str) -> String {
        cache_key(&self.config.version, namespace)
    }

    fn cached(&self, key: &str, namespace: &str) -> Option<Schema> {
        let cache = self.cache.as_ref()?;
        let payload = match cache.get(key) {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Schema cache read failed");
                return None;
            }
        };
        match Schema::from_json(&payload) {
            Ok(schema) if schema.namespace == namespace => Some(schema),
            Ok(schema) => {
                tracing::warn!(key, cached = %schema.namespace, namespace, "Schema cache key collision");
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding unreadable cached schema");
                None
            }
        }
    }

    fn store(&self, key: &str, schema: &Schema) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let stored = schema
            .to_json()
            .and_then(|payload| cache.put(key, &payload, self.config.ttl));
        if let Err(e) = stored {
            tracing::warn!(key, error = %e, "Schema cache write failed");
        }
    }

    /// Load the graph of `namespace`, introspecting `catalog` on a cache miss.
    #[tracing::instrument(level = "debug", skip(self, cx, catalog))]
    pub async fn load<G: Catalog>(
        &self,
        cx: &Cx,
        catalog: &G,
        namespace: &str,
    ) -> Outcome<Arc<Schema>, Error> {
        let key = self.cache_key(namespace);
        if let Some(schema) = self.cached(&key, namespace) {
            tracing::debug!(%key, "Schema cache hit");
            return Outcome::Ok(Arc::new(schema));
        }

        let rows = match catalog.introspect(cx, namespace).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let schema = match infer(namespace, &rows) {
            Ok(schema) => schema,
            Err(e) => return Outcome::Err(e),
        };
        self.store(&key, &schema);
        Outcome::Ok(Arc::new(schema))
    }
}
