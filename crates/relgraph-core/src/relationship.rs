//! Relationship metadata.
//!
//! Relationships are inferred at runtime from foreign-key constraints and
//! stored on each table of the relationship graph. The session dispatches on
//! [`RelationshipKind`] to decide which statements resolve a relationship.

use serde::{Deserialize, Serialize};

/// The type of relationship between two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipKind {
    /// One-to-one: both tables share the primary key (`profile.id -> account.id`).
    OneToOne,
    /// Many-to-one: many `project`s belong to one `account` through `project.owner_id`.
    ManyToOne,
    /// One-to-many: the reverse side of a many-to-one.
    OneToMany,
    /// Many-to-many through a pivot table.
    ManyToMany,
}

impl RelationshipKind {
    /// Does resolving this relationship yield at most one entity?
    pub const fn is_to_one(self) -> bool {
        matches!(self, RelationshipKind::OneToOne | RelationshipKind::ManyToOne)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RelationshipKind::OneToOne => "one-to-one",
            RelationshipKind::ManyToOne => "many-to-one",
            RelationshipKind::OneToMany => "one-to-many",
            RelationshipKind::ManyToMany => "many-to-many",
        }
    }
}

/// Pivot table details of a many-to-many relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotInfo {
    /// The pivot table name (e.g., `"account_project"`).
    pub table: String,
    /// Pivot column pointing at the owning table (e.g., `"project_id"`).
    pub local_column: String,
    /// Pivot column pointing at the target table (e.g., `"account_id"`).
    pub remote_column: String,
    /// Number of foreign keys in the pivot table.
    pub key_count: usize,
}

impl PivotInfo {
    /// Pivots with more than two foreign keys cannot be traversed without a filter.
    pub fn is_multi_key(&self) -> bool {
        self.key_count > 2
    }
}

/// One named edge of the relationship graph.
///
/// `column` is the join column, and its meaning depends on `kind`:
///
/// | kind         | `column`                                      |
/// |--------------|-----------------------------------------------|
/// | one-to-one   | `id`, shared by both tables                   |
/// | many-to-one  | foreign key on the owning table               |
/// | one-to-many  | foreign key on the target table               |
/// | many-to-many | pivot column pointing at the target table     |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    pub kind: RelationshipKind,
    /// Table owning the relationship.
    pub table: String,
    /// Table the relationship resolves to.
    pub target: String,
    pub column: String,
    pub pivot: Option<PivotInfo>,
}

impl Relationship {
    pub fn new(
        name: impl Into<String>,
        kind: RelationshipKind,
        table: impl Into<String>,
        target: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            table: table.into(),
            target: target.into(),
            column: column.into(),
            pivot: None,
        }
    }

    /// Attach pivot details (many-to-many only).
    pub fn with_pivot(mut self, pivot: PivotInfo) -> Self {
        self.pivot = Some(pivot);
        self
    }

    pub fn is_multi_key(&self) -> bool {
        self.pivot.as_ref().is_some_and(PivotInfo::is_multi_key)
    }
}
