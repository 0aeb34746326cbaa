//! Scripted connection for session unit tests.

use asupersync::{Cx, Outcome};
use relgraph_core::{Connection, Dialect, Error, QueryError, QueryErrorKind, Row, Value};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    responses: Vec<(String, Vec<Row>)>,
    fail_on: Option<String>,
    next_id: i64,
    log: Vec<(String, Vec<Value>)>,
}

/// Answers queries with the rows of the first registered pattern the SQL contains.
#[derive(Clone, Default)]
pub(crate) struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub(crate) fn new() -> Self {
        let conn = Self::default();
        conn.state.lock().expect("lock poisoned").next_id = 1;
        conn
    }

    pub(crate) fn respond(self, pattern: &str, rows: Vec<Row>) -> Self {
        self.state
            .lock()
            .expect("lock poisoned")
            .responses
            .push((pattern.to_string(), rows));
        self
    }

    pub(crate) fn fail_on(self, pattern: &str) -> Self {
        self.state.lock().expect("lock poisoned").fail_on = Some(pattern.to_string());
        self
    }

    pub(crate) fn with_next_id(self, id: i64) -> Self {
        self.state.lock().expect("lock poisoned").next_id = id;
        self
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.log().into_iter().map(|(sql, _)| sql).collect()
    }

    pub(crate) fn log(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().expect("lock poisoned").log.clone()
    }

    pub(crate) fn select_count(&self) -> usize {
        self.statements()
            .iter()
            .filter(|sql| sql.starts_with("SELECT"))
            .count()
    }

    fn record(&self, sql: &str, params: &[Value]) -> Result<(), Error> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.log.push((sql.to_string(), params.to_vec()));
        match &state.fail_on {
            Some(pattern) if sql.contains(pattern.as_str()) => Err(Error::Query(QueryError {
                kind: QueryErrorKind::Constraint,
                sql: Some(sql.to_string()),
                sqlstate: Some("23505".to_string()),
                message: "duplicate key value".to_string(),
                source: None,
            })),
            _ => Ok(()),
        }
    }
}

impl Connection for MockConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let outcome = match self.record(sql, params) {
            Ok(()) => {
                let state = self.state.lock().expect("lock poisoned");
                let rows = state
                    .responses
                    .iter()
                    .find(|(pattern, _)| sql.contains(pattern.as_str()))
                    .map(|(_, rows)| rows.clone())
                    .unwrap_or_default();
                Outcome::Ok(rows)
            }
            Err(e) => Outcome::Err(e),
        };
        async move { outcome }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = match self.record(sql, params) {
            Ok(()) => Outcome::Ok(1),
            Err(e) => Outcome::Err(e),
        };
        async move { outcome }
    }

    fn insert(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        let outcome = match self.record(sql, params) {
            Ok(()) => {
                let mut state = self.state.lock().expect("lock poisoned");
                let id = state.next_id;
                state.next_id += 1;
                Outcome::Ok(id)
            }
            Err(e) => Outcome::Err(e),
        };
        async move { outcome }
    }
}
