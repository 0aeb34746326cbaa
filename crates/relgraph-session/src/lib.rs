//! Entity cache and relationship resolution for relgraph.
//!
//! `relgraph-session` is the **entity layer**. It materializes rows into
//! identity-mapped [`Entity`] handles, resolves relationships inferred by
//! `relgraph-schema`, and writes changed rows back through the commit protocol.
//!
//! # Role In The Architecture
//!
//! - **Identity map**: one live entity per `(namespace, table, id)`.
//! - **Row state**: [`Data`] snapshots are locked; writes go through an unlocked copy.
//! - **Relationship resolution**: `join` for one entity, `group_join` for a
//!   whole [`Collection`] in a constant number of statements.
//! - **Commit protocol**: row and pivot statements inside one transaction.
//!
//! # Example
//!
//! ```ignore
//! let session = Session::new(conn, schema);
//!
//! let projects = session.find_all(&cx, "project", Where::default(), FindOptions::new()).await?;
//! // One pivot query and one account query, whatever the number of projects.
//! let accounts = session.group_join(&cx, &projects, "accounts", None).await?;
//!
//! let mut working = projects.first().unwrap().unlock();
//! working.set("title", "Apollo 11")?;
//! session.commit(&cx, working).await?;
//! ```

pub mod commit;
pub mod data;
pub mod entity;
pub mod identity_map;
pub mod resolver;

#[cfg(test)]
mod mock;

pub use commit::{CommitPlan, CommitStep, StepKind};
pub use data::{Data, RowState};
pub use entity::{Collection, Entity, Related};
pub use identity_map::{EntityKey, IdentityMap};

use asupersync::{Cx, Outcome};
use data::PRIMARY_KEY;
use relgraph_core::{Connection, Error, Result, Row, RowStateErrorKind, SchemaErrorKind, Value};
use relgraph_query::{QueryBuilder, Where};
use relgraph_schema::{ConnectionCatalog, Schema, SchemaLoader, TableModel};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Session Configuration
// ============================================================================

/// Configuration for Session behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Namespace (database schema) whose graph the session works against.
    pub namespace: String,
    /// Re-read committed rows to pick up server-side defaults and triggers.
    pub reload_after_commit: bool,
    /// Wrap each commit in BEGIN/COMMIT.
    pub use_transactions: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            namespace: "public".to_string(),
            reload_after_commit: true,
            use_transactions: true,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn reload_after_commit(mut self, value: bool) -> Self {
        self.reload_after_commit = value;
        self
    }

    pub fn use_transactions(mut self, value: bool) -> Self {
        self.use_transactions = value;
        self
    }
}

/// Options for [`Session::find_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Sort keys; a leading `-` sorts descending.
    pub order_by: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, key: impl Into<String>) -> Self {
        self.order_by.push(key.into());
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    fn apply(&self, mut query: QueryBuilder) -> QueryBuilder {
        for key in &self.order_by {
            query = query.order_by(key);
        }
        if let Some(n) = self.limit {
            query = query.limit(n);
        }
        if let Some(n) = self.offset {
            query = query.offset(n);
        }
        query
    }
}

// ============================================================================
// Session
// ============================================================================

/// Entry point for reading, traversing and writing entities of one namespace.
pub struct Session<C: Connection> {
    connection: C,
    schema: Arc<Schema>,
    config: SessionConfig,
    identity_map: Arc<IdentityMap>,
}

impl<C: Connection> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("namespace", &self.schema.namespace)
            .field("config", &self.config)
            .field("tracked", &self.identity_map.len())
            .finish_non_exhaustive()
    }
}

impl<C: Connection> Session<C> {
    /// Create a session over an already inferred graph.
    pub fn new(connection: C, schema: Arc<Schema>) -> Self {
        let config = SessionConfig::new().namespace(schema.namespace.clone());
        Self {
            connection,
            schema,
            config,
            identity_map: Arc::new(IdentityMap::new()),
        }
    }

    /// Create a session with explicit configuration.
    ///
    /// Fails when the graph was inferred for a different namespace.
    pub fn with_config(connection: C, schema: Arc<Schema>, config: SessionConfig) -> Result<Self> {
        if config.namespace != schema.namespace {
            return Err(Error::schema(
                SchemaErrorKind::UnknownNamespace,
                format!(
                    "session namespace '{}' has no graph (loaded '{}')",
                    config.namespace, schema.namespace
                ),
            ));
        }
        Ok(Self {
            connection,
            schema,
            config,
            identity_map: Arc::new(IdentityMap::new()),
        })
    }

    /// Introspect the connection, infer the graph of `config.namespace` and
    /// open a session over it.
    #[tracing::instrument(level = "debug", skip(cx, connection, loader))]
    pub async fn open(
        cx: &Cx,
        connection: C,
        config: SessionConfig,
        loader: &SchemaLoader,
    ) -> Outcome<Self, Error> {
        let schema = match loader
            .load(cx, &ConnectionCatalog::new(&connection), &config.namespace)
            .await
        {
            Outcome::Ok(schema) => schema,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        match Self::with_config(connection, schema, config) {
            Ok(session) => Outcome::Ok(session),
            Err(e) => Outcome::Err(e),
        }
    }

    /// Share an identity map with other sessions.
    pub fn with_identity_map(mut self, identity_map: Arc<IdentityMap>) -> Self {
        self.identity_map = identity_map;
        self
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn identity_map(&self) -> &Arc<IdentityMap> {
        &self.identity_map
    }

    pub fn namespace(&self) -> &str {
        &self.schema.namespace
    }

    pub fn table(&self, name: &str) -> Result<&TableModel> {
        self.schema.table(name)
    }

    // ========================================================================
    // Materialization
    // ========================================================================

    /// Turn a row into the tracked entity for its id.
    ///
    /// An entity already tracked for the id is returned unchanged.
    pub(crate) fn materialize(&self, table: &str, row: &Row) -> Result<Entity> {
        let data = Data::from_row(Arc::clone(&self.schema), table, row)?;
        let Some(id) = data.id().cloned() else {
            return Err(Error::row_state(
                RowStateErrorKind::MissingPrimaryKey,
                table,
                "fetched row has no primary key",
            ));
        };
        if let Some(existing) = self.identity_map.get(self.namespace(), table, &id) {
            return Ok(existing);
        }
        Ok(self.identity_map.get_or_insert(Entity::new(id, data)))
    }

    pub(crate) fn materialize_all(&self, table: &str, rows: &[Row]) -> Result<Collection> {
        rows.iter().map(|row| self.materialize(table, row)).collect()
    }

    pub(crate) async fn fetch_collection(
        &self,
        cx: &Cx,
        table: &str,
        query: QueryBuilder,
    ) -> Outcome<Collection, Error> {
        let rows = match query.fetch_all(cx, &self.connection).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        match self.materialize_all(table, &rows) {
            Ok(collection) => Outcome::Ok(collection),
            Err(e) => Outcome::Err(e),
        }
    }

    // ========================================================================
    // Factory Operations
    // ========================================================================

    /// Fetch one entity by id; tracked entities are returned without a query.
    #[tracing::instrument(level = "debug", skip(self, cx, id))]
    pub async fn get(&self, cx: &Cx, table: &str, id: impl Into<Value>) -> Outcome<Option<Entity>, Error> {
        let id = id.into();
        if let Err(e) = self.schema.table(table) {
            return Outcome::Err(e);
        }
        if let Some(hit) = self.identity_map.get(self.namespace(), table, &id) {
            tracing::trace!(table, "Identity map hit");
            return Outcome::Ok(Some(hit));
        }
        let query = QueryBuilder::select(table).filter(PRIMARY_KEY, id).limit(1);
        match self.fetch_collection(cx, table, query).await {
            Outcome::Ok(found) => Outcome::Ok(found.into_iter().next()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Fetch several entities by id with at most one query.
    ///
    /// The result follows the order of `ids`, without duplicates and without
    /// ids that have no row.
    #[tracing::instrument(level = "debug", skip(self, cx, ids), fields(ids = ids.len()))]
    pub async fn get_many(&self, cx: &Cx, table: &str, ids: &[Value]) -> Outcome<Collection, Error> {
        match self.fetch_many(cx, table, ids).await {
            Outcome::Ok((collection, _)) => Outcome::Ok(collection),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// [`get_many`](Self::get_many), also reporting how many statements ran.
    pub(crate) async fn fetch_many(
        &self,
        cx: &Cx,
        table: &str,
        ids: &[Value],
    ) -> Outcome<(Collection, usize), Error> {
        if let Err(e) = self.schema.table(table) {
            return Outcome::Err(e);
        }

        let mut unique: Vec<&Value> = Vec::with_capacity(ids.len());
        for id in ids.iter().filter(|v| !v.is_null()) {
            if !unique.iter().any(|seen| seen.same_key(id)) {
                unique.push(id);
            }
        }

        let mut found: HashMap<u64, Entity> = HashMap::with_capacity(unique.len());
        let mut misses: Vec<Value> = Vec::new();
        for id in &unique {
            match self.identity_map.get(self.namespace(), table, id) {
                Some(hit) => {
                    found.insert(id.key_hash(), hit);
                }
                None => misses.push((*id).clone()),
            }
        }

        let mut statements = 0;
        if !misses.is_empty() {
            let query = QueryBuilder::select(table).filter(PRIMARY_KEY, misses);
            let fetched = match self.fetch_collection(cx, table, query).await {
                Outcome::Ok(fetched) => fetched,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            statements += 1;
            for entity in fetched {
                found.insert(entity.id().key_hash(), entity);
            }
        }

        let collection = unique
            .iter()
            .filter_map(|id| found.get(&id.key_hash()).cloned())
            .collect();
        Outcome::Ok((collection, statements))
    }

    /// Re-fetch an entity as a new instance, replacing the tracked one.
    #[tracing::instrument(level = "debug", skip(self, cx, entity), fields(table = entity.table()))]
    pub async fn refresh(&self, cx: &Cx, entity: &Entity) -> Outcome<Option<Entity>, Error> {
        self.identity_map
            .evict(entity.namespace(), entity.table(), entity.id());
        self.get(cx, entity.table(), entity.id().clone()).await
    }

    /// Re-read an entity's row and swap its snapshot in place.
    ///
    /// Returns `false` (and stops tracking the entity) when the row is gone.
    #[tracing::instrument(level = "debug", skip(self, cx, entity), fields(table = entity.table()))]
    pub async fn reload(&self, cx: &Cx, entity: &Entity) -> Outcome<bool, Error> {
        match self.fetch_snapshot(cx, entity.table(), entity.id()).await {
            Outcome::Ok(Some(data)) => {
                entity.swap(data);
                Outcome::Ok(true)
            }
            Outcome::Ok(None) => {
                self.identity_map
                    .evict(entity.namespace(), entity.table(), entity.id());
                Outcome::Ok(false)
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Read one row as a locked snapshot without touching the identity map.
    pub(crate) async fn fetch_snapshot(
        &self,
        cx: &Cx,
        table: &str,
        id: &Value,
    ) -> Outcome<Option<Data>, Error> {
        let query = QueryBuilder::select(table)
            .filter(PRIMARY_KEY, id.clone())
            .limit(1);
        let row = match query.fetch_one(cx, &self.connection).await {
            Outcome::Ok(row) => row,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        match row.map(|row| Data::from_row(Arc::clone(&self.schema), table, &row)) {
            Some(Ok(data)) => Outcome::Ok(Some(data)),
            Some(Err(e)) => Outcome::Err(e),
            None => Outcome::Ok(None),
        }
    }

    /// First entity matching `filter`.
    #[tracing::instrument(level = "debug", skip(self, cx, filter))]
    pub async fn find(&self, cx: &Cx, table: &str, filter: Where) -> Outcome<Option<Entity>, Error> {
        match self
            .find_all(cx, table, filter, FindOptions::new().limit(1))
            .await
        {
            Outcome::Ok(found) => Outcome::Ok(found.into_iter().next()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Every entity matching `filter`, sorted and paged by `options`.
    #[tracing::instrument(level = "debug", skip(self, cx, filter, options))]
    pub async fn find_all(
        &self,
        cx: &Cx,
        table: &str,
        filter: Where,
        options: FindOptions,
    ) -> Outcome<Collection, Error> {
        if let Err(e) = self.schema.table(table) {
            return Outcome::Err(e);
        }
        let query = options.apply(QueryBuilder::select(table).filter_where(filter));
        self.fetch_collection(cx, table, query).await
    }

    /// Number of rows matching `filter`.
    #[tracing::instrument(level = "debug", skip(self, cx, filter))]
    pub async fn count_all(&self, cx: &Cx, table: &str, filter: Where) -> Outcome<i64, Error> {
        if let Err(e) = self.schema.table(table) {
            return Outcome::Err(e);
        }
        QueryBuilder::count(table)
            .filter_where(filter)
            .fetch_count(cx, &self.connection)
            .await
    }

    /// A new, unsaved row of `table`.
    pub fn create(&self, table: &str) -> Result<Data> {
        Data::new(Arc::clone(&self.schema), table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::project_schema;
    use crate::mock::MockConnection;

    fn block_on<F: Future>(f: F) -> F::Output {
        let rt = asupersync::runtime::RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        rt.block_on(f)
    }

    fn project_rows(ids: &[i64]) -> Vec<Row> {
        ids.iter()
            .map(|&id| {
                Row::new(
                    vec!["id".into(), "title".into()],
                    vec![Value::BigInt(id), Value::from(format!("project {id}"))],
                )
            })
            .collect()
    }

    #[test]
    fn config_namespace_must_match_graph() {
        let err = Session::with_config(
            MockConnection::new(),
            project_schema(),
            SessionConfig::new().namespace("tenant_b"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Schema(ref e) if e.kind == SchemaErrorKind::UnknownNamespace));

        let session = Session::new(MockConnection::new(), project_schema());
        assert_eq!(session.config().namespace, "public");
        assert!(session.config().reload_after_commit);
    }

    #[test]
    fn get_answers_repeat_lookups_from_identity_map() {
        let conn = MockConnection::new().respond("FROM \"project\"", project_rows(&[1]));
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();

        block_on(async {
            let first = match session.get(&cx, "project", 1i64).await {
                Outcome::Ok(Some(e)) => e,
                _ => panic!("get failed"),
            };
            let second = match session.get(&cx, "project", Value::Int(1)).await {
                Outcome::Ok(Some(e)) => e,
                _ => panic!("get failed"),
            };
            assert!(first.ptr_eq(&second));
        });
        assert_eq!(conn.select_count(), 1);
        assert_eq!(
            conn.statements(),
            vec!["SELECT * FROM \"project\" WHERE \"id\" = ?1 LIMIT 1".to_string()]
        );
    }

    #[test]
    fn get_unknown_table_fails_without_sql() {
        let conn = MockConnection::new();
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();
        let outcome = block_on(session.get(&cx, "nope", 1i64));
        assert!(matches!(outcome, Outcome::Err(Error::Schema(ref e)) if e.kind == SchemaErrorKind::TableNotFound));
        assert!(conn.statements().is_empty());
    }

    #[test]
    fn get_many_fetches_only_misses_in_requested_order() {
        let conn = MockConnection::new()
            .respond("LIMIT 1", project_rows(&[3]))
            .respond("IN (", project_rows(&[2]));
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();

        block_on(async {
            let cached = match session.get(&cx, "project", 3i64).await {
                Outcome::Ok(Some(e)) => e,
                _ => panic!("get failed"),
            };
            let ids = [Value::BigInt(2), Value::BigInt(3), Value::BigInt(2), Value::BigInt(5)];
            let found = match session.get_many(&cx, "project", &ids).await {
                Outcome::Ok(found) => found,
                _ => panic!("get_many failed"),
            };
            assert_eq!(found.ids(), vec![Value::BigInt(2), Value::BigInt(3)]);
            assert!(found.get(1).unwrap().ptr_eq(&cached));
        });

        let log = conn.log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].0, "SELECT * FROM \"project\" WHERE \"id\" IN (?1, ?2)");
        assert_eq!(log[1].1, vec![Value::BigInt(2), Value::BigInt(5)]);
    }

    #[test]
    fn refresh_yields_new_instance_reload_keeps_it() {
        let conn = MockConnection::new().respond("FROM \"project\"", project_rows(&[1]));
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();

        block_on(async {
            let original = match session.get(&cx, "project", 1i64).await {
                Outcome::Ok(Some(e)) => e,
                _ => panic!("get failed"),
            };
            let refreshed = match session.refresh(&cx, &original).await {
                Outcome::Ok(Some(e)) => e,
                _ => panic!("refresh failed"),
            };
            assert!(!refreshed.ptr_eq(&original));

            assert!(matches!(session.reload(&cx, &refreshed).await, Outcome::Ok(true)));
            let tracked = session.identity_map().get("public", "project", &Value::BigInt(1)).unwrap();
            assert!(tracked.ptr_eq(&refreshed));
        });
        assert_eq!(conn.select_count(), 3);
    }

    #[test]
    fn find_all_applies_filter_and_options() {
        let conn = MockConnection::new().respond("FROM \"project\"", project_rows(&[4, 5]));
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();

        let found = block_on(session.find_all(
            &cx,
            "project",
            Where::clause("title%", "Apollo%").unwrap(),
            FindOptions::new().order_by("-id").limit(2).offset(4),
        ));
        let Outcome::Ok(found) = found else {
            panic!("find_all failed");
        };
        assert_eq!(found.len(), 2);
        assert_eq!(
            conn.statements(),
            vec![
                "SELECT * FROM \"project\" WHERE \"title\" LIKE ?1 ORDER BY \"id\" DESC LIMIT 2 OFFSET 4"
                    .to_string()
            ]
        );
    }

    #[test]
    fn count_all_reads_first_column() {
        let conn = MockConnection::new().respond(
            "COUNT(*)",
            vec![Row::new(vec!["count".into()], vec![Value::BigInt(12)])],
        );
        let session = Session::new(conn, project_schema());
        let cx = Cx::for_testing();
        let count = block_on(session.count_all(&cx, "project", Where::default()));
        assert!(matches!(count, Outcome::Ok(12)));
    }

    #[test]
    fn padded_text_keys_are_separate_identities() {
        let rows = relgraph_schema::CatalogRows {
            columns: vec![
                relgraph_schema::ColumnRow::new("code", "id", "text"),
                relgraph_schema::ColumnRow::new("code", "label", "text"),
            ],
            foreign_keys: Vec::new(),
        };
        let schema = Arc::new(relgraph_schema::infer("public", &rows).unwrap());
        let bond = Row::new(
            vec!["id".into(), "label".into()],
            vec![Value::Text("007".into()), Value::from("bond")],
        );
        let conn = MockConnection::new().respond("FROM \"code\"", vec![bond]);
        let session = Session::new(conn.clone(), schema);
        let cx = Cx::for_testing();

        block_on(async {
            let padded = match session.get(&cx, "code", Value::Text("007".into())).await {
                Outcome::Ok(Some(e)) => e,
                _ => panic!("get failed"),
            };
            assert_eq!(padded.id(), &Value::Text("007".into()));

            // The mock answers every lookup with the same row; only the
            // statement count tells whether the identity map answered.
            let _ = session.get(&cx, "code", Value::Text("7".into())).await;
            assert_eq!(conn.select_count(), 2);
            assert!(
                session
                    .identity_map()
                    .get("public", "code", &Value::Text("7".into()))
                    .is_none()
            );
            assert!(
                session
                    .identity_map()
                    .get("public", "code", &Value::BigInt(7))
                    .is_none()
            );
        });
    }

    #[test]
    fn create_starts_new_rows() {
        let session = Session::new(MockConnection::new(), project_schema());
        let data = session.create("account").unwrap();
        assert_eq!(data.state(), RowState::New);
        assert!(data.id().is_none());
        assert!(session.create("ghost").is_err());
    }
}
