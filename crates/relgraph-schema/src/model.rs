//! The inferred relationship graph.

use relgraph_core::{
    Error, Relationship, RelationshipErrorKind, RelationshipKind, Result, SchemaErrorKind, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared type category of a column.
///
/// Only temporal categories change behaviour: their values are rendered as
/// quoted literals instead of bound parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[default]
    Scalar,
    Date,
    Datetime,
    Timestamp,
}

impl ColumnType {
    /// Classify a declared SQL type (`VARCHAR(255)`, `timestamp with time zone`, `DATE`).
    pub fn from_sql(declared: &str) -> Self {
        let base = base_type(declared);
        match base.as_str() {
            "DATE" => ColumnType::Date,
            "DATETIME" | "DATETIME2" | "SMALLDATETIME" => ColumnType::Datetime,
            "TIMESTAMP" | "TIMESTAMPTZ" => ColumnType::Timestamp,
            _ => ColumnType::Scalar,
        }
    }

    pub fn is_temporal(self) -> bool {
        self != ColumnType::Scalar
    }

    /// Tag a raw column value with this category.
    ///
    /// Text read from a temporal column becomes [`Value::Date`] or
    /// [`Value::Timestamp`]; everything else passes through.
    pub fn coerce(self, value: Value) -> Value {
        match (self, value) {
            (ColumnType::Date, Value::Text(s)) => Value::Date(s),
            (ColumnType::Datetime | ColumnType::Timestamp, Value::Text(s)) => Value::Timestamp(s),
            (_, v) => v,
        }
    }
}

/// Uppercased base type name without length, precision, array or zone suffixes.
fn base_type(declared: &str) -> String {
    let upper = declared.trim().to_uppercase();
    let upper = upper.trim_end_matches("[]");
    let upper = match upper.find('(') {
        Some(i) => &upper[..i],
        None => upper,
    };
    upper
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

/// How a table participates in the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    #[default]
    Plain,
    /// Shares its primary key with a parent table.
    Foreign,
    /// Consists solely of two or more foreign keys.
    Pivot,
}

/// One table of the graph with its columns and four relationship maps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableModel {
    pub name: String,
    pub kind: TableKind,
    pub columns: BTreeMap<String, ColumnType>,
    pub one_to_one: BTreeMap<String, Relationship>,
    pub many_to_one: BTreeMap<String, Relationship>,
    pub one_to_many: BTreeMap<String, Relationship>,
    pub many_to_many: BTreeMap<String, Relationship>,
}

impl TableModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.columns.get(column).copied()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// The map holding relationships of `kind`.
    pub fn relationships_of(&self, kind: RelationshipKind) -> &BTreeMap<String, Relationship> {
        match kind {
            RelationshipKind::OneToOne => &self.one_to_one,
            RelationshipKind::ManyToOne => &self.many_to_one,
            RelationshipKind::OneToMany => &self.one_to_many,
            RelationshipKind::ManyToMany => &self.many_to_many,
        }
    }

    pub(crate) fn relationships_of_mut(
        &mut self,
        kind: RelationshipKind,
    ) -> &mut BTreeMap<String, Relationship> {
        match kind {
            RelationshipKind::OneToOne => &mut self.one_to_one,
            RelationshipKind::ManyToOne => &mut self.many_to_one,
            RelationshipKind::OneToMany => &mut self.one_to_many,
            RelationshipKind::ManyToMany => &mut self.many_to_many,
        }
    }

    /// Look a relationship up by name across all four maps.
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.one_to_one
            .get(name)
            .or_else(|| self.many_to_one.get(name))
            .or_else(|| self.one_to_many.get(name))
            .or_else(|| self.many_to_many.get(name))
    }

    pub fn has_relationship(&self, name: &str) -> bool {
        self.relationship(name).is_some()
    }

    /// Every relationship, to-one kinds first.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.one_to_one
            .values()
            .chain(self.many_to_one.values())
            .chain(self.one_to_many.values())
            .chain(self.many_to_many.values())
    }
}

/// The relationship graph of one namespace.
///
/// Built once by inference and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub namespace: String,
    pub tables: BTreeMap<String, TableModel>,
}

impl Schema {
    pub fn table(&self, name: &str) -> Result<&TableModel> {
        self.tables.get(name).ok_or_else(|| {
            Error::schema(
                SchemaErrorKind::TableNotFound,
                format!("table '{name}' is not part of namespace '{}'", self.namespace),
            )
        })
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Look up `table.name`, failing with a relationship error when absent.
    pub fn relationship(&self, table: &str, name: &str) -> Result<&Relationship> {
        self.table(table)?.relationship(name).ok_or_else(|| {
            Error::relationship(
                RelationshipErrorKind::Unknown,
                table,
                name,
                format!("'{table}' has no relationship named '{name}'"),
            )
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_types_from_declared_sql() {
        assert_eq!(ColumnType::from_sql("VARCHAR(255)"), ColumnType::Scalar);
        assert_eq!(ColumnType::from_sql("date"), ColumnType::Date);
        assert_eq!(ColumnType::from_sql("DATETIME"), ColumnType::Datetime);
        assert_eq!(
            ColumnType::from_sql("timestamp without time zone"),
            ColumnType::Timestamp
        );
        assert_eq!(ColumnType::from_sql("TIMESTAMP(6)"), ColumnType::Timestamp);
        assert_eq!(ColumnType::from_sql("timestamptz[]"), ColumnType::Timestamp);
        assert_eq!(ColumnType::from_sql("time"), ColumnType::Scalar);
        assert_eq!(ColumnType::from_sql(""), ColumnType::Scalar);
    }

    #[test]
    fn temporal_text_is_tagged() {
        let v = ColumnType::Timestamp.coerce(Value::Text("2024-01-01 00:00:00".into()));
        assert_eq!(v, Value::Timestamp("2024-01-01 00:00:00".into()));
        assert_eq!(ColumnType::Date.coerce(Value::Null), Value::Null);
        assert_eq!(ColumnType::Scalar.coerce(Value::BigInt(1)), Value::BigInt(1));
    }

    #[test]
    fn unknown_lookups_fail_with_typed_errors() {
        let mut schema = Schema {
            namespace: "public".into(),
            ..Schema::default()
        };
        schema.tables.insert("project".into(), TableModel::new("project"));

        assert!(matches!(schema.table("nope"), Err(Error::Schema(_))));
        let err = schema.relationship("project", "accounts").unwrap_err();
        assert_eq!(err.relationship_kind(), Some(RelationshipErrorKind::Unknown));
    }
}
