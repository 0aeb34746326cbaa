//! Entities, resolved relationships and collections.

use crate::data::Data;
use relgraph_core::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

struct EntityInner {
    namespace: String,
    table: String,
    id: Value,
    state: RwLock<Arc<Data>>,
    relations: Mutex<HashMap<String, Related>>,
}

/// One persisted row.
///
/// An `Entity` is a shared handle: clones point at the same row, and the
/// identity map hands out the same handle for the same
/// `(namespace, table, id)`. Its state is always a locked [`Data`]
/// snapshot, replaced wholesale after a commit or reload.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

impl Entity {
    pub(crate) fn new(id: Value, data: Data) -> Self {
        Self {
            inner: Arc::new(EntityInner {
                namespace: data.namespace().to_string(),
                table: data.table().to_string(),
                id,
                state: RwLock::new(Arc::new(data)),
                relations: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn table(&self) -> &str {
        &self.inner.table
    }

    pub fn id(&self) -> &Value {
        &self.inner.id
    }

    /// The current locked snapshot.
    pub fn data(&self) -> Arc<Data> {
        Arc::clone(&self.inner.state.read().expect("lock poisoned"))
    }

    /// Value of `column` in the current snapshot.
    pub fn get(&self, column: &str) -> Option<Value> {
        self.inner
            .state
            .read()
            .expect("lock poisoned")
            .get(column)
            .cloned()
    }

    /// A mutable working copy of the current snapshot.
    pub fn unlock(&self) -> Data {
        self.data().unlocked()
    }

    /// Do both handles point at the same instance?
    pub fn ptr_eq(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Replace the snapshot and drop every cached relationship.
    pub(crate) fn swap(&self, data: Data) {
        *self.inner.state.write().expect("lock poisoned") = Arc::new(data);
        self.invalidate_relations();
    }

    pub fn invalidate_relations(&self) {
        self.inner.relations.lock().expect("lock poisoned").clear();
    }

    pub fn cached_relation(&self, name: &str) -> Option<Related> {
        self.inner
            .relations
            .lock()
            .expect("lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn has_cached_relation(&self, name: &str) -> bool {
        self.inner
            .relations
            .lock()
            .expect("lock poisoned")
            .contains_key(name)
    }

    #[cfg(test)]
    pub(crate) fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub(crate) fn cache_relation(&self, name: &str, related: Related) {
        self.inner
            .relations
            .lock()
            .expect("lock poisoned")
            .insert(name.to_string(), related);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("namespace", &self.inner.namespace)
            .field("table", &self.inner.table)
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

/// The value of a resolved relationship.
#[derive(Debug, Clone)]
pub enum Related {
    /// One-to-one and many-to-one.
    One(Option<Entity>),
    /// One-to-many and many-to-many.
    Many(Collection),
}

impl Related {
    pub fn as_one(&self) -> Option<&Entity> {
        match self {
            Related::One(entity) => entity.as_ref(),
            Related::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> Option<&Collection> {
        match self {
            Related::Many(collection) => Some(collection),
            Related::One(_) => None,
        }
    }

    /// Flatten into a collection; a missing to-one value is empty.
    pub fn into_collection(self) -> Collection {
        match self {
            Related::One(entity) => entity.into_iter().collect(),
            Related::Many(collection) => collection,
        }
    }
}

/// An ordered sequence of entities.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    entities: Vec<Entity>,
}

impl Collection {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.entities.get(index)
    }

    pub fn first(&self) -> Option<&Entity> {
        self.entities.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }

    pub fn as_slice(&self) -> &[Entity] {
        &self.entities
    }

    pub fn into_vec(self) -> Vec<Entity> {
        self.entities
    }

    /// Primary keys in collection order.
    pub fn ids(&self) -> Vec<Value> {
        self.entities.iter().map(|e| e.id().clone()).collect()
    }

    /// Project one column across every member; absent values read as `NULL`.
    pub fn column(&self, name: &str) -> Vec<Value> {
        self.entities
            .iter()
            .map(|e| e.get(name).unwrap_or(Value::Null))
            .collect()
    }

    pub fn contains(&self, entity: &Entity) -> bool {
        self.entities.iter().any(|e| e.ptr_eq(entity))
    }

    pub(crate) fn push(&mut self, entity: Entity) {
        self.entities.push(entity);
    }
}

impl FromIterator<Entity> for Collection {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        Self {
            entities: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Collection {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}
