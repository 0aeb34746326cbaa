//! Relationship resolution.
//!
//! [`Session::join`] resolves one relationship of one entity.
//! [`Session::group_join`] resolves the same relationship for every member
//! of a [`Collection`] with a fixed number of statements:
//!
//! | kind         | statements                                           |
//! |--------------|------------------------------------------------------|
//! | one-to-one   | at most 1 (`id IN (...)`, cached ids skipped)        |
//! | many-to-one  | at most 1 (distinct foreign keys, cached ids skipped) |
//! | one-to-many  | 1 (`fk IN (...)`, grouped by foreign key)            |
//! | many-to-many | 1 pivot query, then at most 1 target query           |
//!
//! Unfiltered results are cached on each parent entity and reused until the
//! parent's state is replaced. Filtered results are never cached.

use crate::Session;
use crate::data::PRIMARY_KEY;
use crate::entity::{Collection, Entity, Related};
use asupersync::{Cx, Outcome};
use relgraph_core::{
    Connection, Error, PivotInfo, Relationship, RelationshipErrorKind, RelationshipKind, Result,
    Value,
};
use relgraph_query::{QueryBuilder, Where};
use std::collections::HashMap;

fn pivot_of(rel: &Relationship) -> Result<&PivotInfo> {
    rel.pivot.as_ref().ok_or_else(|| {
        Error::relationship(
            RelationshipErrorKind::Unknown,
            &rel.table,
            &rel.name,
            "many-to-many relationship has no pivot table",
        )
    })
}

fn multi_key_error(rel: &Relationship) -> Error {
    Error::relationship(
        RelationshipErrorKind::MultiKeyPivotUnsupported,
        &rel.table,
        &rel.name,
        format!(
            "pivot '{}' has more than two keys; pass a filter to resolve it",
            rel.pivot.as_ref().map_or("?", |p| p.table.as_str())
        ),
    )
}

fn qualified(table: &str, column: &str) -> String {
    format!("{table}.{column}")
}

/// Pivot projection `(local, remote)` for the given parent ids.
///
/// A filter applies to the target table, so it is only then joined in.
fn pivot_query(rel: &Relationship, pivot: &PivotInfo, parents: Value, filter: Option<Where>) -> QueryBuilder {
    let local = qualified(&pivot.table, &pivot.local_column);
    let remote = qualified(&pivot.table, &pivot.remote_column);
    let query = QueryBuilder::select(&pivot.table)
        .columns(&[local.as_str(), remote.as_str()])
        .filter(&local, parents);
    match filter {
        Some(filter) => {
            let target_id = qualified(&rel.target, PRIMARY_KEY);
            query
                .inner_join(&rel.target, &[(target_id.as_str(), remote.as_str())])
                .filter_where(filter)
        }
        None => query,
    }
}

fn lookup(found: &HashMap<u64, Entity>, key: Option<&Value>) -> Option<Entity> {
    key.filter(|k| !k.is_null())
        .and_then(|k| found.get(&k.key_hash()).cloned())
}

fn index_by_id(collection: Collection) -> HashMap<u64, Entity> {
    collection
        .into_iter()
        .map(|e| (e.id().key_hash(), e))
        .collect()
}

fn distinct_keys(keys: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for key in keys.into_iter().filter(|k| !k.is_null()) {
        if !out.iter().any(|seen| seen.same_key(&key)) {
            out.push(key);
        }
    }
    out
}

impl<C: Connection> Session<C> {
    /// Resolve relationship `name` of `entity`.
    ///
    /// Without a filter the result is taken from, and stored in, the
    /// entity's relationship cache.
    #[tracing::instrument(level = "debug", skip(self, cx, entity, filter), fields(table = entity.table()))]
    pub async fn join(
        &self,
        cx: &Cx,
        entity: &Entity,
        name: &str,
        filter: Option<Where>,
    ) -> Outcome<Related, Error> {
        let rel = match self.schema.relationship(entity.table(), name) {
            Ok(rel) => rel.clone(),
            Err(e) => return Outcome::Err(e),
        };
        if filter.is_none() {
            if let Some(cached) = entity.cached_relation(name) {
                tracing::trace!(relationship = name, "Relationship cache hit");
                return Outcome::Ok(cached);
            }
        }
        let cacheable = filter.is_none();

        let resolved = match rel.kind {
            RelationshipKind::OneToOne => {
                self.join_to_one(cx, &rel.target, Some(entity.id().clone()), filter)
                    .await
            }
            RelationshipKind::ManyToOne => {
                self.join_to_one(cx, &rel.target, entity.get(&rel.column), filter)
                    .await
            }
            RelationshipKind::OneToMany => {
                let query = QueryBuilder::select(&rel.target).filter(&rel.column, entity.id().clone());
                let query = match filter {
                    Some(filter) => query.filter_where(filter),
                    None => query,
                };
                match self.fetch_collection(cx, &rel.target, query).await {
                    Outcome::Ok(found) => Outcome::Ok(Related::Many(found)),
                    Outcome::Err(e) => Outcome::Err(e),
                    Outcome::Cancelled(r) => Outcome::Cancelled(r),
                    Outcome::Panicked(p) => Outcome::Panicked(p),
                }
            }
            RelationshipKind::ManyToMany => self.join_many_to_many(cx, &rel, entity, filter).await,
        };

        if let Outcome::Ok(related) = &resolved {
            if cacheable {
                entity.cache_relation(name, related.clone());
            }
        }
        resolved
    }

    async fn join_to_one(
        &self,
        cx: &Cx,
        target: &str,
        key: Option<Value>,
        filter: Option<Where>,
    ) -> Outcome<Related, Error> {
        let Some(key) = key.filter(|k| !k.is_null()) else {
            return Outcome::Ok(Related::One(None));
        };
        let found = match filter {
            None => self.get(cx, target, key).await,
            Some(filter) => {
                let query = QueryBuilder::select(target)
                    .filter(PRIMARY_KEY, key)
                    .filter_where(filter)
                    .limit(1);
                match self.fetch_collection(cx, target, query).await {
                    Outcome::Ok(found) => Outcome::Ok(found.into_iter().next()),
                    Outcome::Err(e) => Outcome::Err(e),
                    Outcome::Cancelled(r) => Outcome::Cancelled(r),
                    Outcome::Panicked(p) => Outcome::Panicked(p),
                }
            }
        };
        match found {
            Outcome::Ok(entity) => Outcome::Ok(Related::One(entity)),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    async fn join_many_to_many(
        &self,
        cx: &Cx,
        rel: &Relationship,
        entity: &Entity,
        filter: Option<Where>,
    ) -> Outcome<Related, Error> {
        let pivot = match pivot_of(rel) {
            Ok(pivot) => pivot,
            Err(e) => return Outcome::Err(e),
        };
        if rel.is_multi_key() && filter.is_none() {
            return Outcome::Err(multi_key_error(rel));
        }

        let rows = match pivot_query(rel, pivot, entity.id().clone(), filter)
            .fetch_all(cx, &self.connection)
            .await
        {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let ids: Vec<Value> = rows.iter().filter_map(|row| row.get(1).cloned()).collect();

        match self.get_many(cx, &rel.target, &ids).await {
            Outcome::Ok(found) => Outcome::Ok(Related::Many(found)),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Resolve relationship `name` for every member of `collection`.
    ///
    /// Returns one [`Related`] per member, in collection order. Members whose
    /// relationship is already cached are skipped when there is no filter;
    /// an empty collection issues no statements.
    #[tracing::instrument(level = "debug", skip(self, cx, collection, filter), fields(members = collection.len()))]
    pub async fn group_join(
        &self,
        cx: &Cx,
        collection: &Collection,
        name: &str,
        filter: Option<Where>,
    ) -> Outcome<Vec<Related>, Error> {
        let Some(first) = collection.first() else {
            return Outcome::Ok(Vec::new());
        };
        let table = first.table();
        if let Some(other) = collection.iter().find(|e| e.table() != table) {
            return Outcome::Err(Error::relationship(
                RelationshipErrorKind::WrongEntityType,
                table,
                name,
                format!("collection mixes '{table}' and '{}' entities", other.table()),
            ));
        }
        let rel = match self.schema.relationship(table, name) {
            Ok(rel) => rel.clone(),
            Err(e) => return Outcome::Err(e),
        };
        let cacheable = filter.is_none();

        let mut results: Vec<Option<Related>> = collection
            .iter()
            .map(|e| if cacheable { e.cached_relation(name) } else { None })
            .collect();
        let pending_slots: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, cached)| cached.is_none())
            .map(|(i, _)| i)
            .collect();
        let pending: Vec<&Entity> = pending_slots
            .iter()
            .filter_map(|&i| collection.get(i))
            .collect();

        if pending.is_empty() {
            tracing::debug!(relationship = name, "Every member already resolved");
            return Outcome::Ok(results.into_iter().flatten().collect());
        }

        let resolved = match rel.kind {
            RelationshipKind::OneToOne => {
                let keys: Vec<Option<Value>> = pending.iter().map(|e| Some(e.id().clone())).collect();
                self.group_to_one(cx, &rel, keys, filter).await
            }
            RelationshipKind::ManyToOne => {
                let keys: Vec<Option<Value>> = pending.iter().map(|e| e.get(&rel.column)).collect();
                self.group_to_one(cx, &rel, keys, filter).await
            }
            RelationshipKind::OneToMany => self.group_one_to_many(cx, &rel, &pending, filter).await,
            RelationshipKind::ManyToMany => self.group_many_to_many(cx, &rel, &pending, filter).await,
        };
        let (resolved, statements) = match resolved {
            Outcome::Ok(resolved) => resolved,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        for ((&slot, entity), related) in pending_slots.iter().zip(&pending).zip(resolved) {
            if cacheable {
                entity.cache_relation(name, related.clone());
            }
            results[slot] = Some(related);
        }

        tracing::info!(
            table,
            relationship = name,
            kind = rel.kind.as_str(),
            parent_count = collection.len(),
            resolved = pending.len(),
            statements,
            "Group-joined relationship"
        );
        Outcome::Ok(results.into_iter().flatten().collect())
    }

    /// Resolve to-one keys (`None` or NULL meaning "no related row").
    async fn group_to_one(
        &self,
        cx: &Cx,
        rel: &Relationship,
        keys: Vec<Option<Value>>,
        filter: Option<Where>,
    ) -> Outcome<(Vec<Related>, usize), Error> {
        let distinct = distinct_keys(keys.iter().flatten().cloned());
        let (found, statements) = match filter {
            None => match self.fetch_many(cx, &rel.target, &distinct).await {
                Outcome::Ok((found, statements)) => (index_by_id(found), statements),
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            },
            Some(_) if distinct.is_empty() => (HashMap::new(), 0),
            Some(filter) => {
                let query = QueryBuilder::select(&rel.target)
                    .filter(PRIMARY_KEY, distinct)
                    .filter_where(filter);
                match self.fetch_collection(cx, &rel.target, query).await {
                    Outcome::Ok(found) => (index_by_id(found), 1),
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
            }
        };
        let related = keys
            .iter()
            .map(|key| Related::One(lookup(&found, key.as_ref())))
            .collect();
        Outcome::Ok((related, statements))
    }

    async fn group_one_to_many(
        &self,
        cx: &Cx,
        rel: &Relationship,
        parents: &[&Entity],
        filter: Option<Where>,
    ) -> Outcome<(Vec<Related>, usize), Error> {
        let ids: Vec<Value> = parents.iter().map(|e| e.id().clone()).collect();
        let query = QueryBuilder::select(&rel.target).filter(&rel.column, ids);
        let query = match filter {
            Some(filter) => query.filter_where(filter),
            None => query,
        };
        let rows = match query.fetch_all(cx, &self.connection).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut groups: HashMap<u64, Collection> = HashMap::new();
        for row in &rows {
            let Some(fk) = row.get_by_name(&rel.column).filter(|v| !v.is_null()) else {
                continue;
            };
            let key = fk.key_hash();
            match self.materialize(&rel.target, row) {
                Ok(child) => groups.entry(key).or_default().push(child),
                Err(e) => return Outcome::Err(e),
            }
        }

        let related = parents
            .iter()
            .map(|parent| Related::Many(groups.get(&parent.id().key_hash()).cloned().unwrap_or_default()))
            .collect();
        Outcome::Ok((related, 1))
    }

    async fn group_many_to_many(
        &self,
        cx: &Cx,
        rel: &Relationship,
        parents: &[&Entity],
        filter: Option<Where>,
    ) -> Outcome<(Vec<Related>, usize), Error> {
        let pivot = match pivot_of(rel) {
            Ok(pivot) => pivot,
            Err(e) => return Outcome::Err(e),
        };
        if rel.is_multi_key() && filter.is_none() {
            return Outcome::Err(multi_key_error(rel));
        }

        let ids: Vec<Value> = parents.iter().map(|e| e.id().clone()).collect();
        let rows = match pivot_query(rel, pivot, Value::from(ids), filter)
            .fetch_all(cx, &self.connection)
            .await
        {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let pairs: Vec<(Value, Value)> = rows
            .iter()
            .filter_map(|row| Some((row.get(0)?.clone(), row.get(1)?.clone())))
            .filter(|(local, remote)| !local.is_null() && !remote.is_null())
            .collect();
        let siblings = distinct_keys(pairs.iter().map(|(_, remote)| remote.clone()));

        let (found, fetched) = match self.fetch_many(cx, &rel.target, &siblings).await {
            Outcome::Ok((found, statements)) => (index_by_id(found), statements),
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut groups: HashMap<u64, Collection> = HashMap::new();
        for (local, remote) in &pairs {
            let Some(sibling) = lookup(&found, Some(remote)) else {
                continue;
            };
            let group = groups.entry(local.key_hash()).or_default();
            if !group.contains(&sibling) {
                group.push(sibling);
            }
        }

        let related = parents
            .iter()
            .map(|parent| Related::Many(groups.get(&parent.id().key_hash()).cloned().unwrap_or_default()))
            .collect();
        Outcome::Ok((related, 1 + fetched))
    }

    /// Every entity related to any member of `collection`, without duplicates.
    pub async fn related_all(&self, cx: &Cx, collection: &Collection, name: &str) -> Outcome<Collection, Error> {
        let resolved = match self.group_join(cx, collection, name, None).await {
            Outcome::Ok(resolved) => resolved,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let mut all = Collection::default();
        for related in resolved {
            for entity in related.into_collection() {
                if !all.contains(&entity) {
                    all.push(entity);
                }
            }
        }
        Outcome::Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::project_schema;
    use crate::mock::MockConnection;
    use relgraph_core::Row;

    fn block_on<F: Future>(f: F) -> F::Output {
        let rt = asupersync::runtime::RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        rt.block_on(f)
    }

    fn project_row(id: i64, owner: Option<i64>) -> Row {
        Row::new(
            vec!["id".into(), "title".into(), "owner_id".into()],
            vec![Value::BigInt(id), Value::from(format!("project {id}")), Value::from(owner)],
        )
    }

    fn account_row(id: i64) -> Row {
        Row::new(
            vec!["id".into(), "name".into()],
            vec![Value::BigInt(id), Value::from(format!("account {id}"))],
        )
    }

    fn pivot_row(project: i64, account: i64) -> Row {
        Row::new(
            vec!["project_id".into(), "account_id".into()],
            vec![Value::BigInt(project), Value::BigInt(account)],
        )
    }

    fn projects(session: &Session<MockConnection>, rows: &[Row]) -> Collection {
        rows.iter()
            .map(|row| session.materialize("project", row).unwrap())
            .collect()
    }

    fn ok<T>(outcome: Outcome<T, Error>) -> T {
        match outcome {
            Outcome::Ok(value) => value,
            Outcome::Err(e) => panic!("unexpected error: {e}"),
            _ => panic!("operation did not complete"),
        }
    }

    #[test]
    fn many_to_one_join_is_cached() {
        let conn = MockConnection::new().respond("FROM \"account\"", vec![account_row(7)]);
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();
        let project = session.materialize("project", &project_row(1, Some(7))).unwrap();

        block_on(async {
            let owner = ok(session.join(&cx, &project, "owner", None).await);
            assert_eq!(owner.as_one().map(|e| e.id().clone()), Some(Value::BigInt(7)));
            let again = ok(session.join(&cx, &project, "owner", None).await);
            assert!(again.as_one().unwrap().ptr_eq(owner.as_one().unwrap()));
        });
        assert_eq!(conn.statements().len(), 1);
    }

    #[test]
    fn null_foreign_key_resolves_without_sql() {
        let conn = MockConnection::new();
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();
        let project = session.materialize("project", &project_row(1, None)).unwrap();

        let owner = ok(block_on(session.join(&cx, &project, "owner", None)));
        assert!(matches!(owner, Related::One(None)));
        assert!(conn.statements().is_empty());
    }

    #[test]
    fn unknown_relationship_is_an_error() {
        let session = Session::new(MockConnection::new(), project_schema());
        let cx = Cx::for_testing();
        let project = session.materialize("project", &project_row(1, None)).unwrap();
        let outcome = block_on(session.join(&cx, &project, "tags", None));
        assert!(matches!(
            outcome,
            Outcome::Err(ref e) if e.relationship_kind() == Some(RelationshipErrorKind::Unknown)
        ));
    }

    #[test]
    fn one_to_many_join_filters_on_foreign_key() {
        let conn = MockConnection::new()
            .respond("FROM \"project\"", vec![project_row(1, Some(7)), project_row(2, Some(7))]);
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();
        let account = session.materialize("account", &account_row(7)).unwrap();

        let owned = ok(block_on(session.join(&cx, &account, "project_owner", None)));
        assert_eq!(owned.as_many().unwrap().len(), 2);
        assert_eq!(
            conn.log(),
            vec![(
                "SELECT * FROM \"project\" WHERE \"owner_id\" = ?1".to_string(),
                vec![Value::BigInt(7)]
            )]
        );
    }

    #[test]
    fn many_to_many_join_reads_pivot_then_targets() {
        let conn = MockConnection::new()
            .respond("FROM \"account_project\"", vec![pivot_row(1, 2), pivot_row(1, 3)])
            .respond("FROM \"account\"", vec![account_row(2), account_row(3)]);
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();
        let project = session.materialize("project", &project_row(1, None)).unwrap();

        let accounts = ok(block_on(session.join(&cx, &project, "accounts", None)));
        assert_eq!(
            accounts.as_many().unwrap().ids(),
            vec![Value::BigInt(2), Value::BigInt(3)]
        );
        let statements = conn.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("SELECT \"account_project\".\"project_id\", \"account_project\".\"account_id\""));
        assert!(!statements[0].contains("JOIN"));
        assert!(statements[1].starts_with("SELECT * FROM \"account\" WHERE \"id\" IN"));
    }

    #[test]
    fn group_join_many_to_many_uses_two_statements() {
        let conn = MockConnection::new()
            .respond(
                "FROM \"account_project\"",
                vec![pivot_row(1, 10), pivot_row(1, 11), pivot_row(2, 11), pivot_row(3, 12)],
            )
            .respond("FROM \"account\"", vec![account_row(10), account_row(11), account_row(12)]);
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();
        let parents = projects(&session, &[project_row(1, None), project_row(2, None), project_row(3, None)]);

        let resolved = ok(block_on(session.group_join(&cx, &parents, "accounts", None)));
        let ids: Vec<Vec<Value>> = resolved
            .iter()
            .map(|r| r.as_many().unwrap().ids())
            .collect();
        assert_eq!(
            ids,
            vec![
                vec![Value::BigInt(10), Value::BigInt(11)],
                vec![Value::BigInt(11)],
                vec![Value::BigInt(12)],
            ]
        );
        assert_eq!(conn.statements().len(), 2);
        assert_eq!(conn.log()[0].1, vec![Value::BigInt(1), Value::BigInt(2), Value::BigInt(3)]);

        let shared_first = resolved[0].as_many().unwrap().get(1).unwrap();
        let shared_second = resolved[1].as_many().unwrap().get(0).unwrap();
        assert!(shared_first.ptr_eq(shared_second));

        // Cached on every parent now.
        ok(block_on(session.group_join(&cx, &parents, "accounts", None)));
        ok(block_on(session.join(&cx, parents.get(2).unwrap(), "accounts", None)));
        assert_eq!(conn.statements().len(), 2);
    }

    #[test]
    fn filtered_group_join_joins_target_and_skips_cache() {
        let conn = MockConnection::new()
            .respond("FROM \"account_project\"", vec![pivot_row(1, 10)])
            .respond("FROM \"account\"", vec![account_row(10)]);
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();
        let parents = projects(&session, &[project_row(1, None), project_row(2, None)]);

        let filter = Where::clause("account.name%", "account%").unwrap();
        let resolved = ok(block_on(session.group_join(&cx, &parents, "accounts", Some(filter))));
        assert_eq!(resolved[0].as_many().unwrap().len(), 1);
        assert!(resolved[1].as_many().unwrap().is_empty());

        let statements = conn.statements();
        assert!(statements[0].contains("INNER JOIN \"account\""));
        assert!(statements[0].contains("LIKE"));
        assert!(!parents.get(0).unwrap().has_cached_relation("accounts"));
    }

    #[test]
    fn group_join_many_to_one_deduplicates_keys() {
        let conn = MockConnection::new().respond("FROM \"account\"", vec![account_row(1), account_row(2)]);
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();
        let parents = projects(
            &session,
            &[project_row(1, Some(1)), project_row(2, Some(1)), project_row(3, Some(2)), project_row(4, None)],
        );

        let owners = ok(block_on(session.group_join(&cx, &parents, "owner", None)));
        let ids: Vec<Option<Value>> = owners
            .iter()
            .map(|r| r.as_one().map(|e| e.id().clone()))
            .collect();
        assert_eq!(
            ids,
            vec![Some(Value::BigInt(1)), Some(Value::BigInt(1)), Some(Value::BigInt(2)), None]
        );
        let log = conn.log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1, vec![Value::BigInt(1), Value::BigInt(2)]);
    }

    #[test]
    fn group_join_one_to_many_groups_by_foreign_key() {
        let conn = MockConnection::new().respond(
            "FROM \"project\"",
            vec![project_row(1, Some(7)), project_row(2, Some(8)), project_row(3, Some(7))],
        );
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();
        let accounts: Collection = [7, 8, 9]
            .iter()
            .map(|&id| session.materialize("account", &account_row(id)).unwrap())
            .collect();

        let owned = ok(block_on(session.group_join(&cx, &accounts, "project_owner", None)));
        let ids: Vec<Vec<Value>> = owned.iter().map(|r| r.as_many().unwrap().ids()).collect();
        assert_eq!(
            ids,
            vec![
                vec![Value::BigInt(1), Value::BigInt(3)],
                vec![Value::BigInt(2)],
                vec![],
            ]
        );
        assert_eq!(conn.statements(), vec!["SELECT * FROM \"project\" WHERE \"owner_id\" IN (?1, ?2, ?3)".to_string()]);
    }

    #[test]
    fn group_join_edge_cases() {
        let conn = MockConnection::new();
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();

        let empty = ok(block_on(session.group_join(&cx, &Collection::default(), "accounts", None)));
        assert!(empty.is_empty());

        let mixed: Collection = vec![
            session.materialize("project", &project_row(1, None)).unwrap(),
            session.materialize("account", &account_row(1)).unwrap(),
        ]
        .into_iter()
        .collect();
        let outcome = block_on(session.group_join(&cx, &mixed, "accounts", None));
        assert!(matches!(
            outcome,
            Outcome::Err(ref e) if e.relationship_kind() == Some(RelationshipErrorKind::WrongEntityType)
        ));
        assert!(conn.statements().is_empty());
    }

    #[test]
    fn related_all_flattens_without_duplicates() {
        let conn = MockConnection::new()
            .respond("FROM \"account_project\"", vec![pivot_row(1, 10), pivot_row(2, 10), pivot_row(2, 11)])
            .respond("FROM \"account\"", vec![account_row(10), account_row(11)]);
        let session = Session::new(conn, project_schema());
        let cx = Cx::for_testing();
        let parents = projects(&session, &[project_row(1, None), project_row(2, None)]);

        let all = ok(block_on(session.related_all(&cx, &parents, "accounts")));
        assert_eq!(all.ids(), vec![Value::BigInt(10), Value::BigInt(11)]);
    }

    fn assignment_schema() -> std::sync::Arc<relgraph_schema::Schema> {
        use relgraph_schema::{CatalogRows, ColumnRow, ForeignKeyRow, infer};
        let rows = CatalogRows {
            columns: vec![
                ColumnRow::new("account", "id", "integer"),
                ColumnRow::new("project", "id", "integer"),
                ColumnRow::new("role", "id", "integer"),
                ColumnRow::new("assignment", "account_id", "integer"),
                ColumnRow::new("assignment", "project_id", "integer"),
                ColumnRow::new("assignment", "role_id", "integer"),
            ],
            foreign_keys: vec![
                ForeignKeyRow::new("assignment", "account_id", "account", "id"),
                ForeignKeyRow::new("assignment", "project_id", "project", "id"),
                ForeignKeyRow::new("assignment", "role_id", "role", "id"),
            ],
        };
        std::sync::Arc::new(infer("public", &rows).unwrap())
    }

    fn is_multi_key<T>(outcome: &Outcome<T, Error>) -> bool {
        matches!(
            outcome,
            Outcome::Err(e) if e.relationship_kind() == Some(RelationshipErrorKind::MultiKeyPivotUnsupported)
        )
    }

    #[test]
    fn three_key_pivot_needs_a_filter() {
        let conn = MockConnection::new();
        let session = Session::new(conn.clone(), assignment_schema());
        let cx = Cx::for_testing();
        let bare = |id: i64| Row::new(vec!["id".into()], vec![Value::BigInt(id)]);
        let parents: Collection = [1, 2]
            .iter()
            .map(|&id| session.materialize("project", &bare(id)).unwrap())
            .collect();

        let single = block_on(session.join(&cx, parents.get(0).unwrap(), "accounts", None));
        assert!(is_multi_key(&single));
        let grouped = block_on(session.group_join(&cx, &parents, "roles", None));
        assert!(is_multi_key(&grouped));
        assert!(conn.statements().is_empty());
        assert!(!parents.get(0).unwrap().has_cached_relation("accounts"));

        let mut draft = session.create("project").unwrap();
        let err = draft.set_member_ids("accounts", vec![Value::BigInt(1)]).unwrap_err();
        assert_eq!(
            err.relationship_kind(),
            Some(RelationshipErrorKind::MultiKeyPivotUnsupported)
        );
    }
}
