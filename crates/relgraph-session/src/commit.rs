//! Commit protocol.
//!
//! Committing a [`Data`] writes its row and its many-to-many memberships in
//! one transaction:
//!
//! 1. `BEGIN` (unless transactions are disabled)
//! 2. the row statement: `DELETE`, `INSERT`, or an `UPDATE` of the dirty columns
//! 3. per changed many-to-many relationship: one `DELETE` of the pivot rows,
//!    then one `INSERT` per member
//! 4. `COMMIT`
//!
//! If a statement fails the transaction is rolled back and the failure is
//! reported as a [`CommitError`] carrying the statement text.
//! After a successful commit the tracked entity receives a fresh locked
//! snapshot (re-read from the database by default) and loses its cached
//! relationships.

use crate::Session;
use crate::data::{Data, RowState};
use crate::entity::Entity;
use asupersync::{Cx, Outcome};
use relgraph_core::{
    CommitError, Connection, Dialect, Error, PivotInfo, RelationshipErrorKind, Result,
    RowStateErrorKind, Value,
};
use relgraph_query::{QueryBuilder, Statement};

/// How a commit statement reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Affected-row count is discarded.
    Execute,
    /// The generated id is kept.
    Insert,
}

/// One rendered statement of a commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitStep {
    pub kind: StepKind,
    pub statement: Statement,
}

impl CommitStep {
    fn new(kind: StepKind, query: QueryBuilder, dialect: Dialect) -> Result<Self> {
        Ok(Self {
            kind,
            statement: query.resolve_with(dialect)?,
        })
    }
}

/// Everything a commit will write, rendered before the transaction opens.
#[derive(Debug, Clone)]
pub struct CommitPlan {
    pub table: String,
    pub state: RowState,
    /// `None` when an unlocked row only changed memberships.
    pub row: Option<CommitStep>,
    /// Replacement member ids per pivot.
    pub members: Vec<(PivotInfo, Vec<Value>)>,
}

impl CommitPlan {
    /// Validate `data` and render its row statement.
    pub fn build(data: &Data, dialect: Dialect) -> Result<Self> {
        let table = data.table();
        let state = data.state();
        let row = match state {
            RowState::Locked => {
                return Err(Error::row_state(
                    RowStateErrorKind::NotCommittable,
                    table,
                    "locked snapshots cannot be committed; unlock the entity first",
                ));
            }
            RowState::Deleted => {
                let id = require_id(data)?;
                let query = QueryBuilder::delete(table).filter(crate::data::PRIMARY_KEY, id);
                Some(CommitStep::new(StepKind::Execute, query, dialect)?)
            }
            RowState::New => {
                let mut query = QueryBuilder::insert(table);
                for column in data.dirty_columns() {
                    if let Some(value) = data.get(column) {
                        query = query.set(column, value.clone());
                    }
                }
                Some(CommitStep::new(StepKind::Insert, query, dialect)?)
            }
            RowState::Unlocked => {
                let id = require_id(data)?;
                let mut dirty = data.dirty_columns().peekable();
                if dirty.peek().is_none() {
                    None
                } else {
                    let mut query = QueryBuilder::update(table);
                    for column in dirty {
                        if let Some(value) = data.get(column) {
                            query = query.set(column, value.clone());
                        }
                    }
                    let query = query.filter(crate::data::PRIMARY_KEY, id);
                    Some(CommitStep::new(StepKind::Execute, query, dialect)?)
                }
            }
        };

        let mut members = Vec::new();
        if state != RowState::Deleted {
            for (name, ids) in data.dirty_members() {
                let rel = data.schema().relationship(table, name)?;
                let pivot = rel.pivot.clone().ok_or_else(|| {
                    Error::relationship(
                        RelationshipErrorKind::Unknown,
                        table,
                        name,
                        "many-to-many relationship has no pivot table",
                    )
                })?;
                members.push((pivot, ids.to_vec()));
            }
        }

        Ok(Self {
            table: table.to_string(),
            state,
            row,
            members,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.row.is_none() && self.members.is_empty()
    }

    /// Pivot statements once the row id is known.
    pub fn pivot_steps(&self, id: &Value, dialect: Dialect) -> Result<Vec<CommitStep>> {
        let mut steps = Vec::new();
        for (pivot, ids) in &self.members {
            let clear = QueryBuilder::delete(&pivot.table).filter(&pivot.local_column, id.clone());
            steps.push(CommitStep::new(StepKind::Execute, clear, dialect)?);
            for member in ids {
                let link = QueryBuilder::insert(&pivot.table)
                    .set(&pivot.local_column, id.clone())
                    .set(&pivot.remote_column, member.clone());
                steps.push(CommitStep::new(StepKind::Execute, link, dialect)?);
            }
        }
        Ok(steps)
    }
}

fn require_id(data: &Data) -> Result<Value> {
    data.id().cloned().ok_or_else(|| {
        Error::row_state(
            RowStateErrorKind::MissingPrimaryKey,
            data.table(),
            "row has no primary key",
        )
    })
}

impl<C: Connection> Session<C> {
    /// Write `data` to the database.
    ///
    /// Returns the tracked entity holding the committed state, or `None`
    /// when the row was deleted.
    #[tracing::instrument(level = "debug", skip(self, cx, data), fields(table = data.table(), state = ?data.state()))]
    pub async fn commit(&self, cx: &Cx, data: Data) -> Outcome<Option<Entity>, Error> {
        let dialect = self.connection.dialect();
        let plan = match CommitPlan::build(&data, dialect) {
            Ok(plan) => plan,
            Err(e) => return Outcome::Err(e),
        };
        let table = plan.table.clone();

        if plan.is_empty() {
            tracing::debug!(table = %table, "Nothing to commit");
            let Some(id) = data.id().cloned() else {
                return Outcome::Err(Error::row_state(
                    RowStateErrorKind::MissingPrimaryKey,
                    &table,
                    "row has no primary key",
                ));
            };
            if let Some(existing) = self.identity_map.get(self.namespace(), &table, &id) {
                return Outcome::Ok(Some(existing));
            }
            return Outcome::Ok(Some(self.track(id, data.into_locked())));
        }

        if self.config.use_transactions {
            match self.connection.begin(cx).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        let mut statements = 0usize;
        let mut id = data.id().cloned();
        if let Some(step) = &plan.row {
            match self.run_step(cx, &table, step).await {
                Outcome::Ok(generated) => {
                    if id.is_none() {
                        id = generated.map(Value::BigInt);
                    }
                }
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
            statements += 1;
        }
        let Some(id) = id else {
            self.rollback_quietly(cx, &table).await;
            return Outcome::Err(Error::row_state(
                RowStateErrorKind::MissingPrimaryKey,
                &table,
                "insert did not produce a primary key",
            ));
        };

        let pivot_steps = match plan.pivot_steps(&id, dialect) {
            Ok(steps) => steps,
            Err(e) => {
                self.rollback_quietly(cx, &table).await;
                return Outcome::Err(e);
            }
        };
        for step in &pivot_steps {
            match self.run_step(cx, &table, step).await {
                Outcome::Ok(_) => statements += 1,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        if self.config.use_transactions {
            match self.connection.commit(cx).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => {
                    self.rollback_quietly(cx, &table).await;
                    return Outcome::Err(e);
                }
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        tracing::info!(
            table = %table,
            state = ?plan.state,
            statements,
            memberships = plan.members.len(),
            "Commit complete"
        );

        if plan.state == RowState::Deleted {
            if let Some(gone) = self.identity_map.evict(self.namespace(), &table, &id) {
                gone.invalidate_relations();
            }
            return Outcome::Ok(None);
        }

        let snapshot = if self.config.reload_after_commit {
            match self.fetch_snapshot(cx, &table, &id).await {
                Outcome::Ok(Some(fresh)) => fresh,
                Outcome::Ok(None) => {
                    tracing::warn!(table = %table, "Committed row not found on reload");
                    local_snapshot(data, &id)
                }
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        } else {
            local_snapshot(data, &id)
        };
        Outcome::Ok(Some(self.track(id, snapshot)))
    }

    /// Install `snapshot` as the state of the entity tracked for `id`.
    fn track(&self, id: Value, snapshot: Data) -> Entity {
        match self.identity_map.get(self.namespace(), snapshot.table(), &id) {
            Some(existing) => {
                existing.swap(snapshot);
                existing
            }
            None => self.identity_map.get_or_insert(Entity::new(id, snapshot)),
        }
    }

    async fn run_step(&self, cx: &Cx, table: &str, step: &CommitStep) -> Outcome<Option<i64>, Error> {
        let Statement { sql, params, .. } = &step.statement;
        tracing::debug!(table, sql = %sql, params = params.len(), "Executing commit statement");
        let outcome = match step.kind {
            StepKind::Execute => self.connection.execute(cx, sql, params).await.map(|_| None),
            StepKind::Insert => self.connection.insert(cx, sql, params).await.map(Some),
        };
        match outcome {
            Outcome::Ok(generated) => Outcome::Ok(generated),
            Outcome::Err(e) => {
                tracing::warn!(table, sql = %sql, error = %e, "Commit statement failed");
                self.rollback_quietly(cx, table).await;
                Outcome::Err(Error::Commit(CommitError {
                    table: table.to_string(),
                    sql: sql.clone(),
                    param_count: params.len(),
                    source: Box::new(e),
                }))
            }
            Outcome::Cancelled(r) => {
                self.rollback_quietly(cx, table).await;
                Outcome::Cancelled(r)
            }
            Outcome::Panicked(p) => {
                self.rollback_quietly(cx, table).await;
                Outcome::Panicked(p)
            }
        }
    }

    async fn rollback_quietly(&self, cx: &Cx, table: &str) {
        if !self.config.use_transactions {
            return;
        }
        match self.connection.rollback(cx).await {
            Outcome::Ok(()) => tracing::debug!(table, "Commit rolled back"),
            Outcome::Err(e) => tracing::warn!(table, error = %e, "Rollback failed"),
            Outcome::Cancelled(_) | Outcome::Panicked(_) => {
                tracing::warn!(table, "Rollback did not complete");
            }
        }
    }
}

fn local_snapshot(data: Data, id: &Value) -> Data {
    let mut snapshot = data.into_locked();
    snapshot.set_id(id.clone());
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::{locked, project_schema};
    use crate::mock::MockConnection;
    use crate::{Session, SessionConfig};
    use relgraph_core::Row;
    use std::sync::Arc;

    fn block_on<F: Future>(f: F) -> F::Output {
        let rt = asupersync::runtime::RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        rt.block_on(f)
    }

    fn project_row(id: i64, title: &str) -> Row {
        Row::new(
            vec!["id".into(), "title".into()],
            vec![Value::BigInt(id), Value::from(title)],
        )
    }

    #[test]
    fn plan_rejects_locked_rows() {
        let schema = project_schema();
        let err = CommitPlan::build(&locked(&schema, "project", 1, "Apollo"), Dialect::Sqlite)
            .unwrap_err();
        assert!(matches!(err, Error::RowState(ref e) if e.kind == RowStateErrorKind::NotCommittable));
    }

    #[test]
    fn plan_updates_only_dirty_columns() {
        let schema = project_schema();
        let mut working = locked(&schema, "project", 1, "Apollo").unlocked();
        assert!(CommitPlan::build(&working, Dialect::Sqlite).unwrap().is_empty());

        working.set("title", "Gemini").unwrap();
        let plan = CommitPlan::build(&working, Dialect::Sqlite).unwrap();
        let row = plan.row.unwrap();
        assert_eq!(row.kind, StepKind::Execute);
        assert_eq!(
            row.statement.sql,
            "UPDATE \"project\" SET \"title\" = ?1 WHERE \"id\" = ?2"
        );
        assert_eq!(row.statement.params, vec![Value::from("Gemini"), Value::BigInt(1)]);
    }

    #[test]
    fn plan_renders_pivot_replacement() {
        let schema = project_schema();
        let mut working = locked(&schema, "project", 4, "Apollo").unlocked();
        working
            .set_member_ids("accounts", vec![Value::BigInt(1), Value::BigInt(2)])
            .unwrap();
        let plan = CommitPlan::build(&working, Dialect::Postgres).unwrap();
        assert!(plan.row.is_none());

        let steps = plan.pivot_steps(&Value::BigInt(4), Dialect::Postgres).unwrap();
        let sql: Vec<_> = steps.iter().map(|s| s.statement.sql.as_str()).collect();
        assert_eq!(
            sql,
            vec![
                "DELETE FROM \"account_project\" WHERE \"project_id\" = $1",
                "INSERT INTO \"account_project\" (\"project_id\", \"account_id\") VALUES ($1, $2)",
                "INSERT INTO \"account_project\" (\"project_id\", \"account_id\") VALUES ($1, $2)",
            ]
        );
        assert_eq!(steps[2].statement.params, vec![Value::BigInt(4), Value::BigInt(2)]);
    }

    #[test]
    fn insert_tracks_generated_id() {
        let conn = MockConnection::new()
            .with_next_id(42)
            .respond("FROM \"project\"", vec![project_row(42, "Apollo")]);
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();

        let entity = block_on(async {
            let mut data = session.create("project").unwrap();
            data.set("title", "Apollo").unwrap();
            match session.commit(&cx, data).await {
                Outcome::Ok(Some(entity)) => entity,
                _ => panic!("commit failed"),
            }
        });

        assert_eq!(entity.id(), &Value::BigInt(42));
        assert_eq!(entity.data().state(), RowState::Locked);
        assert!(session.identity_map().get("public", "project", &Value::Int(42)).unwrap().ptr_eq(&entity));
        assert_eq!(
            conn.statements(),
            vec![
                "BEGIN".to_string(),
                "INSERT INTO \"project\" (\"title\") VALUES (?1)".to_string(),
                "COMMIT".to_string(),
                "SELECT * FROM \"project\" WHERE \"id\" = ?1 LIMIT 1".to_string(),
            ]
        );
    }

    #[test]
    fn update_swaps_state_of_tracked_instance() {
        let conn = MockConnection::new().respond("FROM \"project\"", vec![project_row(1, "Gemini")]);
        let session = Session::with_config(
            conn.clone(),
            project_schema(),
            SessionConfig::new().reload_after_commit(false),
        )
        .unwrap();
        let cx = Cx::for_testing();

        block_on(async {
            let original = match session.get(&cx, "project", 1i64).await {
                Outcome::Ok(Some(entity)) => entity,
                _ => panic!("get failed"),
            };
            let mut working = original.unlock();
            working.set("title", "Mercury").unwrap();
            let committed = match session.commit(&cx, working).await {
                Outcome::Ok(Some(entity)) => entity,
                _ => panic!("commit failed"),
            };
            assert!(committed.ptr_eq(&original));
            assert_eq!(original.get("title"), Some(Value::from("Mercury")));
            assert_eq!(original.data().state(), RowState::Locked);
        });
    }

    #[test]
    fn failure_rolls_back_and_names_statement() {
        let conn = MockConnection::new().fail_on("INSERT INTO \"account_project\"");
        let session = Session::new(conn.clone(), project_schema());
        let cx = Cx::for_testing();
        let schema = Arc::clone(session.schema());

        let err = block_on(async {
            let mut working = locked(&schema, "project", 4, "Apollo").unlocked();
            working.set_member_ids("accounts", vec![Value::BigInt(9)]).unwrap();
            match session.commit(&cx, working).await {
                Outcome::Err(e) => e,
                _ => panic!("commit should fail"),
            }
        });

        let Error::Commit(commit) = err else {
            panic!("expected a commit error");
        };
        assert_eq!(commit.table, "project");
        assert!(commit.sql.starts_with("INSERT INTO \"account_project\""));
        assert_eq!(commit.param_count, 2);
        let statements = conn.statements();
        assert_eq!(statements.first().map(String::as_str), Some("BEGIN"));
        assert_eq!(statements.last().map(String::as_str), Some("ROLLBACK"));
        assert!(!statements.iter().any(|s| s == "COMMIT"));
    }

    #[test]
    fn delete_evicts_entity() {
        let conn = MockConnection::new().respond("FROM \"project\"", vec![project_row(3, "Apollo")]);
        let session = Session::with_config(
            conn.clone(),
            project_schema(),
            SessionConfig::new().use_transactions(false),
        )
        .unwrap();
        let cx = Cx::for_testing();

        block_on(async {
            let entity = match session.get(&cx, "project", 3i64).await {
                Outcome::Ok(Some(entity)) => entity,
                _ => panic!("get failed"),
            };
            let mut working = entity.unlock();
            working.mark_deleted().unwrap();
            assert!(matches!(session.commit(&cx, working).await, Outcome::Ok(None)));
        });

        assert!(session.identity_map().is_empty());
        assert_eq!(
            conn.statements().last().map(String::as_str),
            Some("DELETE FROM \"project\" WHERE \"id\" = ?1")
        );
        assert!(!conn.statements().iter().any(|s| s == "BEGIN"));
    }
}
