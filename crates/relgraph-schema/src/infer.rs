//! Relationship inference from catalog rows.
//!
//! Inference runs in three passes over the catalog:
//!
//! 1. Columns build one [`TableModel`] per table.
//! 2. Foreign keys add one-to-one edges (`id -> id`, child becomes
//!    [`TableKind::Foreign`]) or many-to-one edges (`<root>_id -> id`) with a
//!    reciprocal one-to-many edge on the referenced table.
//! 3. Tables made only of foreign keys become pivots. Each ordered pair of
//!    their keys yields a many-to-many edge on the first key's table, and the
//!    one-to-many edges pointing at the pivot are dropped.
//!
//! The result depends only on the input rows.

use crate::introspect::{CatalogRows, ForeignKeyRow};
use crate::model::{ColumnType, Schema, TableKind, TableModel};
use crate::naming::{normalize, pluralize, underscore};
use relgraph_core::{
    Error, PivotInfo, Relationship, RelationshipKind, Result, SchemaErrorKind,
};
use std::collections::BTreeMap;

const FK_SUFFIX: &str = "_id";

/// Build the relationship graph of `namespace`.
///
/// ```
/// use relgraph_schema::{CatalogRows, ColumnRow, ForeignKeyRow, TableKind, infer};
///
/// let rows = CatalogRows {
///     columns: vec![
///         ColumnRow::new("project", "id", "integer"),
///         ColumnRow::new("account", "id", "integer"),
///         ColumnRow::new("account_project", "account_id", "integer"),
///         ColumnRow::new("account_project", "project_id", "integer"),
///     ],
///     foreign_keys: vec![
///         ForeignKeyRow::new("account_project", "account_id", "account", "id"),
///         ForeignKeyRow::new("account_project", "project_id", "project", "id"),
///     ],
/// };
///
/// let schema = infer("public", &rows).unwrap();
/// assert_eq!(schema.tables["account_project"].kind, TableKind::Pivot);
/// assert_eq!(schema.tables["project"].many_to_many["accounts"].column, "account_id");
/// ```
pub fn infer(namespace: &str, rows: &CatalogRows) -> Result<Schema> {
    let mut tables: BTreeMap<String, TableModel> = BTreeMap::new();

    for row in &rows.columns {
        let table = normalize(&row.table);
        let model = tables
            .entry(table.clone())
            .or_insert_with(|| TableModel::new(table));
        model
            .columns
            .insert(normalize(&row.column), ColumnType::from_sql(&row.sql_type));
    }

    for fk in &rows.foreign_keys {
        add_foreign_key(&mut tables, fk)?;
    }

    let pivots: Vec<String> = tables
        .values()
        .filter(|t| t.kind != TableKind::Foreign)
        .filter(|t| t.many_to_one.len() >= 2 && t.columns.len() == t.many_to_one.len())
        .map(|t| t.name.clone())
        .collect();

    for pivot in pivots {
        add_pivot(&mut tables, &pivot)?;
    }

    tracing::debug!(namespace, tables = tables.len(), "Relationship graph inferred");

    Ok(Schema {
        namespace: namespace.to_string(),
        tables,
    })
}

fn add_foreign_key(tables: &mut BTreeMap<String, TableModel>, fk: &ForeignKeyRow) -> Result<()> {
    let table = normalize(&fk.table);
    let column = normalize(&fk.column);
    let ref_table = normalize(&fk.ref_table);
    let ref_column = normalize(&fk.ref_column);

    if !tables.contains_key(&table) || !tables.contains_key(&ref_table) {
        tracing::trace!(%table, %ref_table, "Ignoring foreign key to a table outside the catalog");
        return Ok(());
    }

    if column == "id" && ref_column == "id" {
        let child = Relationship::new(&ref_table, RelationshipKind::OneToOne, &table, &ref_table, "id");
        let parent = Relationship::new(&table, RelationshipKind::OneToOne, &ref_table, &table, "id");
        insert_unique(tables, &table, child)?;
        insert_unique(tables, &ref_table, parent)?;
        if let Some(model) = tables.get_mut(&table) {
            model.kind = TableKind::Foreign;
        }
        return Ok(());
    }

    let root = match column.strip_suffix(FK_SUFFIX) {
        Some(root) if ref_column == "id" && !root.is_empty() => underscore(root),
        _ => {
            tracing::trace!(%table, %column, %ref_table, %ref_column, "Ignoring foreign key");
            return Ok(());
        }
    };

    let many_to_one = Relationship::new(&root, RelationshipKind::ManyToOne, &table, &ref_table, &column);
    insert_unique(tables, &table, many_to_one)?;

    // `project.account_id -> account` reads as `account.project`; any other
    // root keeps the key name: `project.owner_id -> account` is `account.project_owner`.
    let qualified = format!("{table}_{root}");
    let name = if root == ref_table && !has_name(tables, &ref_table, &table) {
        table.clone()
    } else {
        qualified
    };
    let one_to_many = Relationship::new(name, RelationshipKind::OneToMany, &ref_table, &table, &column);
    insert_unique(tables, &ref_table, one_to_many)
}

fn add_pivot(tables: &mut BTreeMap<String, TableModel>, pivot: &str) -> Result<()> {
    let keys: Vec<Relationship> = match tables.get_mut(pivot) {
        Some(model) => {
            model.kind = TableKind::Pivot;
            model.many_to_one.values().cloned().collect()
        }
        None => return Ok(()),
    };
    tracing::debug!(pivot, keys = keys.len(), "Reclassified table as pivot");

    for local in &keys {
        for remote in &keys {
            if local.column == remote.column {
                continue;
            }
            let plural = pluralize(&remote.target);
            let name = if has_name(tables, &local.target, &plural) {
                format!("{pivot}_{plural}")
            } else {
                plural
            };
            let edge = Relationship::new(
                name,
                RelationshipKind::ManyToMany,
                &local.target,
                &remote.target,
                &remote.column,
            )
            .with_pivot(PivotInfo {
                table: pivot.to_string(),
                local_column: local.column.clone(),
                remote_column: remote.column.clone(),
                key_count: keys.len(),
            });
            insert_unique(tables, &local.target, edge)?;
        }
    }

    for key in &keys {
        if let Some(model) = tables.get_mut(&key.target) {
            model.one_to_many.retain(|_, rel| rel.target != pivot);
        }
    }
    Ok(())
}

fn has_name(tables: &BTreeMap<String, TableModel>, table: &str, name: &str) -> bool {
    tables.get(table).is_some_and(|t| t.has_relationship(name))
}

fn insert_unique(
    tables: &mut BTreeMap<String, TableModel>,
    table: &str,
    relationship: Relationship,
) -> Result<()> {
    let Some(model) = tables.get_mut(table) else {
        return Ok(());
    };
    if model.has_relationship(&relationship.name) {
        return Err(Error::schema(
            SchemaErrorKind::DuplicateRelationship,
            format!(
                "relationship name '{}' derived twice on table '{table}'",
                relationship.name
            ),
        ));
    }
    model
        .relationships_of_mut(relationship.kind)
        .insert(relationship.name.clone(), relationship);
    Ok(())
}
