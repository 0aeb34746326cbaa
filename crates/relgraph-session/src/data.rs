//! Row state.
//!
//! [`Data`] holds the column values of one row plus the relationship
//! assignments made on it. Its [`RowState`] decides what may change:
//!
//! | state      | mutable | committable | obtained from                    |
//! |------------|---------|-------------|----------------------------------|
//! | `New`      | yes     | INSERT      | `Session::create`                |
//! | `Locked`   | no      | no          | materialized rows, entity state  |
//! | `Unlocked` | yes     | UPDATE      | `Entity::unlock`                 |
//! | `Deleted`  | no      | DELETE      | `Data::mark_deleted`             |

use crate::entity::Entity;
use relgraph_core::{
    Error, RelationshipErrorKind, RelationshipKind, Result, Row, RowStateErrorKind, Value,
};
use relgraph_schema::Schema;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

pub(crate) const PRIMARY_KEY: &str = "id";

/// Lifecycle state of a [`Data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowState {
    New,
    Locked,
    Unlocked,
    Deleted,
}

impl RowState {
    pub const fn is_mutable(self) -> bool {
        matches!(self, RowState::New | RowState::Unlocked)
    }
}

/// Column values and relationship assignments of one row.
#[derive(Clone)]
pub struct Data {
    schema: Arc<Schema>,
    table: String,
    state: RowState,
    values: BTreeMap<String, Value>,
    dirty: BTreeSet<String>,
    members: BTreeMap<String, Vec<Value>>,
    assigned: BTreeMap<String, Option<Entity>>,
}

impl Data {
    pub(crate) fn new(schema: Arc<Schema>, table: &str) -> Result<Self> {
        schema.table(table)?;
        Ok(Self {
            schema,
            table: table.to_string(),
            state: RowState::New,
            values: BTreeMap::new(),
            dirty: BTreeSet::new(),
            members: BTreeMap::new(),
            assigned: BTreeMap::new(),
        })
    }

    /// A locked snapshot of a fetched row; temporal text is tagged by column type.
    pub(crate) fn from_row(schema: Arc<Schema>, table: &str, row: &Row) -> Result<Self> {
        let model = schema.table(table)?;
        let values = row
            .iter()
            .map(|(name, value)| {
                let value = match model.column_type(name) {
                    Some(ty) => ty.coerce(value.clone()),
                    None => value.clone(),
                };
                (name.to_string(), value)
            })
            .collect();
        let mut data = Self::new(schema, table)?;
        data.values = values;
        data.state = RowState::Locked;
        Ok(data)
    }

    pub fn namespace(&self) -> &str {
        &self.schema.namespace
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn state(&self) -> RowState {
        self.state
    }

    /// The primary key, once known.
    pub fn id(&self) -> Option<&Value> {
        self.values.get(PRIMARY_KEY).filter(|v| !v.is_null())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty() || !self.members.is_empty()
    }

    /// Columns changed since the row was created or unlocked.
    pub fn dirty_columns(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    /// Many-to-many relationships whose membership was replaced.
    pub fn dirty_members(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.members.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// The entity assigned to a many-to-one slot in this working copy.
    pub fn assigned(&self, name: &str) -> Option<Option<&Entity>> {
        self.assigned.get(name).map(Option::as_ref)
    }

    fn ensure_mutable(&self) -> Result<()> {
        match self.state {
            RowState::New | RowState::Unlocked => Ok(()),
            RowState::Locked => Err(Error::row_state(
                RowStateErrorKind::Locked,
                &self.table,
                "locked snapshots are read-only; unlock the entity first",
            )),
            RowState::Deleted => Err(Error::row_state(
                RowStateErrorKind::Deleted,
                &self.table,
                "row is marked for deletion",
            )),
        }
    }

    /// Set a column value and mark it dirty.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
        self.ensure_mutable()?;
        let model = self.schema.table(&self.table)?;
        let Some(ty) = model.column_type(column) else {
            return Err(Error::row_state(
                RowStateErrorKind::UnknownColumn,
                &self.table,
                format!("no column named '{column}'"),
            ));
        };
        if column == PRIMARY_KEY && self.state == RowState::Unlocked {
            return Err(Error::row_state(
                RowStateErrorKind::Locked,
                &self.table,
                "the primary key of a persisted row cannot change",
            ));
        }
        self.values.insert(column.to_string(), ty.coerce(value.into()));
        self.dirty.insert(column.to_string());
        Ok(())
    }

    fn relationship(&self, name: &str, kind: RelationshipKind) -> Result<relgraph_core::Relationship> {
        let rel = self.schema.relationship(&self.table, name)?;
        if rel.kind != kind {
            return Err(Error::relationship(
                RelationshipErrorKind::Unknown,
                &self.table,
                name,
                format!("'{name}' is {}, not {}", rel.kind.as_str(), kind.as_str()),
            ));
        }
        Ok(rel.clone())
    }

    /// Point a many-to-one slot at `target`, or clear it with `None`.
    pub fn set_related(&mut self, name: &str, target: Option<&Entity>) -> Result<()> {
        self.ensure_mutable()?;
        let rel = self.relationship(name, RelationshipKind::ManyToOne)?;
        let value = match target {
            Some(entity) if entity.table() != rel.target => {
                return Err(Error::relationship(
                    RelationshipErrorKind::WrongEntityType,
                    &self.table,
                    name,
                    format!("expected a '{}' entity, got '{}'", rel.target, entity.table()),
                ));
            }
            Some(entity) => entity.id().clone(),
            None => Value::Null,
        };
        self.set(&rel.column, value)?;
        self.assigned.insert(name.to_string(), target.cloned());
        Ok(())
    }

    /// Replace the members of a many-to-many relationship.
    pub fn set_members(&mut self, name: &str, members: &[Entity]) -> Result<()> {
        let rel = self.relationship(name, RelationshipKind::ManyToMany)?;
        if let Some(wrong) = members.iter().find(|m| m.table() != rel.target) {
            return Err(Error::relationship(
                RelationshipErrorKind::WrongEntityType,
                &self.table,
                name,
                format!("expected '{}' entities, got '{}'", rel.target, wrong.table()),
            ));
        }
        self.set_member_ids(name, members.iter().map(|m| m.id().clone()).collect())
    }

    /// Replace the members of a many-to-many relationship by primary key.
    pub fn set_member_ids(&mut self, name: &str, ids: Vec<Value>) -> Result<()> {
        self.ensure_mutable()?;
        let rel = self.relationship(name, RelationshipKind::ManyToMany)?;
        if rel.is_multi_key() {
            return Err(Error::relationship(
                RelationshipErrorKind::MultiKeyPivotUnsupported,
                &self.table,
                name,
                "membership of a pivot with more than two keys cannot be replaced",
            ));
        }
        let mut seen = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.iter().any(|s: &Value| s.same_key(&id)) {
                seen.push(id);
            }
        }
        self.members.insert(name.to_string(), seen);
        Ok(())
    }

    /// Mark a persisted row for deletion.
    pub fn mark_deleted(&mut self) -> Result<()> {
        match self.state {
            RowState::Unlocked => {
                self.state = RowState::Deleted;
                Ok(())
            }
            RowState::New => Err(Error::row_state(
                RowStateErrorKind::NotCommittable,
                &self.table,
                "a row that was never persisted cannot be deleted",
            )),
            _ => self.ensure_mutable(),
        }
    }

    pub(crate) fn unlocked(&self) -> Self {
        let mut copy = self.clone();
        copy.state = RowState::Unlocked;
        copy.dirty.clear();
        copy.members.clear();
        copy.assigned.clear();
        copy
    }

    pub(crate) fn into_locked(mut self) -> Self {
        self.state = RowState::Locked;
        self.dirty.clear();
        self.members.clear();
        self.assigned.clear();
        self
    }

    pub(crate) fn set_id(&mut self, id: Value) {
        self.values.insert(PRIMARY_KEY.to_string(), id);
    }

    pub(crate) fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("table", &self.table)
            .field("state", &self.state)
            .field("values", &self.values)
            .field("dirty", &self.dirty)
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}
