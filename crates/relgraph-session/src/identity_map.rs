//! Identity Map pattern for tracking unique entity instances per primary key.
//!
//! The identity map ensures that each database row corresponds to exactly one
//! [`Entity`] handle. This provides:
//!
//! - **Uniqueness**: the same `(namespace, table, id)` always yields the same handle
//! - **Cache**: to-one lookups by id are answered without a query
//! - **Consistency**: a committed state swap is visible through every handle
//!
//! Keys hash the primary key value with integer widths normalized, so an id
//! read as `Int(3)` and one passed as `BigInt(3)` address the same entry.
//! Text in canonical integer form (`"3"`) shares that entry too; `"003"` does not.
//!
//! # Example
//!
//! ```ignore
//! let map = IdentityMap::new();
//! let first = map.get_or_insert(entity);
//! let again = map.get("public", "project", &Value::BigInt(1)).unwrap();
//! assert!(first.ptr_eq(&again));
//! ```

use crate::entity::Entity;
use relgraph_core::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// Key identifying one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub namespace: String,
    pub table: String,
    pub pk_hash: u64,
}

impl EntityKey {
    pub fn new(namespace: &str, table: &str, id: &Value) -> Self {
        Self {
            namespace: namespace.to_string(),
            table: table.to_string(),
            pk_hash: id.key_hash(),
        }
    }

    pub fn of(entity: &Entity) -> Self {
        Self::new(entity.namespace(), entity.table(), entity.id())
    }
}

/// Identity map shared by one or more sessions.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: RwLock<HashMap<EntityKey, Entity>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str, table: &str, id: &Value) -> Option<Entity> {
        self.entries
            .read()
            .expect("lock poisoned")
            .get(&EntityKey::new(namespace, table, id))
            .cloned()
    }

    pub fn contains(&self, namespace: &str, table: &str, id: &Value) -> bool {
        self.entries
            .read()
            .expect("lock poisoned")
            .contains_key(&EntityKey::new(namespace, table, id))
    }

    /// Insert `entity`, replacing and returning any previous handle.
    pub fn insert(&self, entity: Entity) -> Option<Entity> {
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(EntityKey::of(&entity), entity)
    }

    /// Return the tracked handle for `entity`'s key, tracking `entity` if there is none.
    pub fn get_or_insert(&self, entity: Entity) -> Entity {
        self.entries
            .write()
            .expect("lock poisoned")
            .entry(EntityKey::of(&entity))
            .or_insert(entity)
            .clone()
    }

    /// Stop tracking one entity.
    ///
    /// The evicted handle's relationship cache is emptied, so entities that
    /// reference each other through cached joins do not keep each other alive.
    pub fn evict(&self, namespace: &str, table: &str, id: &Value) -> Option<Entity> {
        let removed = self
            .entries
            .write()
            .expect("lock poisoned")
            .remove(&EntityKey::new(namespace, table, id));
        if let Some(entity) = &removed {
            entity.invalidate_relations();
        }
        removed
    }

    /// Evict every entity of one table; returns how many were dropped.
    pub fn evict_table(&self, namespace: &str, table: &str) -> usize {
        let removed: Vec<Entity> = {
            let mut entries = self.entries.write().expect("lock poisoned");
            let keys: Vec<EntityKey> = entries
                .keys()
                .filter(|key| key.namespace == namespace && key.table == table)
                .cloned()
                .collect();
            keys.iter().filter_map(|key| entries.remove(key)).collect()
        };
        for entity in &removed {
            entity.invalidate_relations();
        }
        removed.len()
    }

    pub fn clear(&self) {
        let removed: Vec<Entity> = self
            .entries
            .write()
            .expect("lock poisoned")
            .drain()
            .map(|(_, entity)| entity)
            .collect();
        for entity in &removed {
            entity.invalidate_relations();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
