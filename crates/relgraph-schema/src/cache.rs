//! Persistence of inferred graphs.
//!
//! A [`SchemaCache`] stores serialized [`Schema`](crate::Schema) payloads
//! under a key made of a schema version and a hash of the namespace, so
//! bumping the version invalidates every entry at once.

use relgraph_core::Result;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// External store for serialized relationship graphs.
pub trait SchemaCache: Send + Sync {
    /// Fetch a payload; expired entries read as absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a payload; `None` keeps it until evicted.
    fn put(&self, key: &str, payload: &str, ttl: Option<Duration>) -> Result<()>;
}

/// Cache key for one namespace: `"{version}:{namespace-hash}"`.
///
/// ```
/// use relgraph_schema::cache_key;
///
/// assert_eq!(cache_key("v1", "public"), cache_key("v1", "public"));
/// assert_ne!(cache_key("v1", "public"), cache_key("v2", "public"));
/// assert!(cache_key("v1", "public").starts_with("v1:"));
/// ```
pub fn cache_key(version: &str, namespace: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    namespace.hash(&mut hasher);
    format!("{version}:{:016x}", hasher.finish())
}

#[derive(Debug, Clone)]
struct CachedSchema {
    payload: String,
    expires_at: Option<Instant>,
}

impl CachedSchema {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-process [`SchemaCache`].
#[derive(Debug, Default)]
pub struct MemorySchemaCache {
    entries: Mutex<HashMap<String, CachedSchema>>,
}

impl MemorySchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .expect("lock poisoned")
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn evict(&self, key: &str) -> bool {
        self.entries.lock().expect("lock poisoned").remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().expect("lock poisoned").clear();
    }
}

impl SchemaCache for MemorySchemaCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().expect("lock poisoned");
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.payload.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, payload: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.lock().expect("lock poisoned").insert(
            key.to_string(),
            CachedSchema {
                payload: payload.to_string(),
                expires_at,
            },
        );
        Ok(())
    }
}
