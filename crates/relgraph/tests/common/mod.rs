//! In-memory database for integration tests.
//!
//! `FakeDatabase` understands the SQLite-dialect statement shapes relgraph
//! emits (catalog reads, `SELECT *`, pivot projections, counts, inserts,
//! updates, deletes and transaction keywords), routed by regular expression.
//! Every statement is logged so tests can assert on statement counts.

#![allow(dead_code)]

use asupersync::{Cx, Outcome};
use regex::Regex;
use relgraph::{Connection, Dialect, Error, Row, Value};
use relgraph_core::{QueryError, QueryErrorKind};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Debug, Clone, Default)]
struct FakeTable {
    columns: Vec<(String, String)>,
    rows: Vec<BTreeMap<String, Value>>,
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, FakeTable>,
    foreign_keys: Vec<(String, String, String)>,
    snapshot: Option<BTreeMap<String, FakeTable>>,
    fail_when: Option<Regex>,
    log: Vec<String>,
}

struct Routes {
    catalog_columns: Regex,
    catalog_foreign_keys: Regex,
    count: Regex,
    select_all: Regex,
    select_columns: Regex,
    insert: Regex,
    insert_default: Regex,
    update: Regex,
    delete: Regex,
    condition: Regex,
    qualified: Regex,
    order: Regex,
}

fn routes() -> &'static Routes {
    static ROUTES: OnceLock<Routes> = OnceLock::new();
    ROUTES.get_or_init(|| Routes {
        catalog_columns: Regex::new(r"pragma_table_info").expect("regex"),
        catalog_foreign_keys: Regex::new(r"pragma_foreign_key_list").expect("regex"),
        count: Regex::new(r#"^SELECT COUNT\(\*\) AS "count" FROM "(\w+)"(?: WHERE (.+))?$"#).expect("regex"),
        select_all: Regex::new(
            r#"^SELECT \* FROM "(\w+)"(?: WHERE (.+?))?(?: ORDER BY (.+?))?(?: LIMIT (\d+))?(?: OFFSET (\d+))?$"#,
        )
        .expect("regex"),
        select_columns: Regex::new(r#"^SELECT (.+?) FROM "(\w+)" WHERE (.+)$"#).expect("regex"),
        insert: Regex::new(r#"^INSERT INTO "(\w+)" \((.+)\) VALUES \((.+)\)$"#).expect("regex"),
        insert_default: Regex::new(r#"^INSERT INTO "(\w+)" DEFAULT VALUES$"#).expect("regex"),
        update: Regex::new(r#"^UPDATE "(\w+)" SET (.+) WHERE (.+)$"#).expect("regex"),
        delete: Regex::new(r#"^DELETE FROM "(\w+)"(?: WHERE (.+))?$"#).expect("regex"),
        condition: Regex::new(r#"^(?:"\w+"\.)?"(\w+)" (=|!=|<>|>=|<=|>|<|NOT IN|IN|NOT LIKE|LIKE) (.+)$"#)
            .expect("regex"),
        qualified: Regex::new(r#"^(?:"\w+"\.)?"(\w+)"$"#).expect("regex"),
        order: Regex::new(r#"^"(\w+)"(?: (ASC|DESC))?$"#).expect("regex"),
    })
}

fn failure(sql: &str, message: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Constraint,
        sql: Some(sql.to_string()),
        sqlstate: Some("23505".to_string()),
        message: message.to_string(),
        source: None,
    })
}

fn unsupported(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        sqlstate: None,
        message: "statement shape not supported by the fake database".to_string(),
        source: None,
    })
}

fn token(raw: &str, params: &[Value]) -> Value {
    let raw = raw.trim();
    if raw == "NULL" {
        return Value::Null;
    }
    if let Some(index) = raw.strip_prefix('?') {
        let index: usize = index.parse().unwrap_or(0);
        return params.get(index.wrapping_sub(1)).cloned().unwrap_or(Value::Null);
    }
    if let Some(text) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        return Value::Text(text.replace("''", "'"));
    }
    Value::Text(raw.to_string())
}

fn list(raw: &str, params: &[Value]) -> Vec<Value> {
    raw.trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(", ")
        .map(|t| token(t, params))
        .collect()
}

fn same(a: &Value, b: &Value) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => a.as_str().is_some() && a.as_str() == b.as_str(),
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.as_str().unwrap_or("").cmp(b.as_str().unwrap_or("")),
    }
}

fn like(value: &Value, pattern: &Value) -> bool {
    let (Some(text), Some(pattern)) = (value.as_str(), pattern.as_str()) else {
        return false;
    };
    let starts = pattern.starts_with('%');
    let ends = pattern.ends_with('%');
    let core = pattern.trim_matches('%');
    match (starts, ends) {
        (true, true) => text.contains(core),
        (false, true) => text.starts_with(core),
        (true, false) => text.ends_with(core),
        (false, false) => text == core,
    }
}

type Predicate = Box<dyn Fn(&BTreeMap<String, Value>) -> bool>;

fn predicate(where_sql: Option<&str>, params: &[Value], sql: &str) -> Result<Predicate, Error> {
    let Some(where_sql) = where_sql else {
        return Ok(Box::new(|_| true));
    };
    if where_sql == "false" {
        return Ok(Box::new(|_| false));
    }
    let mut checks: Vec<Predicate> = Vec::new();
    for part in where_sql.split(" AND ") {
        let caps = routes().condition.captures(part).ok_or_else(|| unsupported(sql))?;
        let column = caps[1].to_string();
        let op = caps[2].to_string();
        let rhs = caps[3].to_string();
        let check: Predicate = match op.as_str() {
            "IN" | "NOT IN" => {
                let items = list(&rhs, params);
                let negate = op == "NOT IN";
                Box::new(move |row| {
                    let v = row.get(&column).cloned().unwrap_or(Value::Null);
                    items.iter().any(|i| same(&v, i)) != negate
                })
            }
            "LIKE" | "NOT LIKE" => {
                let pattern = token(&rhs, params);
                let negate = op == "NOT LIKE";
                Box::new(move |row| {
                    let v = row.get(&column).cloned().unwrap_or(Value::Null);
                    like(&v, &pattern) != negate
                })
            }
            _ => {
                let expected = token(&rhs, params);
                Box::new(move |row| {
                    let v = row.get(&column).cloned().unwrap_or(Value::Null);
                    let ord = compare(&v, &expected);
                    match op.as_str() {
                        "=" => same(&v, &expected),
                        "!=" | "<>" => !same(&v, &expected),
                        ">" => ord == Ordering::Greater,
                        "<" => ord == Ordering::Less,
                        ">=" => ord != Ordering::Less,
                        _ => ord != Ordering::Greater,
                    }
                })
            }
        };
        checks.push(check);
    }
    Ok(Box::new(move |row| checks.iter().all(|c| c(row))))
}

/// An in-memory, regex-routed stand-in for a SQLite connection.
#[derive(Clone, Default)]
pub struct FakeDatabase {
    state: Arc<Mutex<State>>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(self, name: &str, columns: &[(&str, &str)]) -> Self {
        self.state.lock().expect("lock poisoned").tables.insert(
            name.to_string(),
            FakeTable {
                columns: columns
                    .iter()
                    .map(|(c, t)| ((*c).to_string(), (*t).to_string()))
                    .collect(),
                rows: Vec::new(),
            },
        );
        self
    }

    pub fn foreign_key(self, table: &str, column: &str, references: &str) -> Self {
        self.state.lock().expect("lock poisoned").foreign_keys.push((
            table.to_string(),
            column.to_string(),
            references.to_string(),
        ));
        self
    }

    pub fn row(self, table: &str, values: &[(&str, Value)]) -> Self {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            let fake = state.tables.get_mut(table).expect("seeded table exists");
            fake.rows.push(
                values
                    .iter()
                    .map(|(c, v)| ((*c).to_string(), v.clone()))
                    .collect(),
            );
        }
        self
    }

    /// Make every statement matching `pattern` fail with a constraint error.
    pub fn fail_when(&self, pattern: &str) {
        self.state.lock().expect("lock poisoned").fail_when = Some(Regex::new(pattern).expect("regex"));
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().expect("lock poisoned").log.clone()
    }

    pub fn clear_log(&self) {
        self.state.lock().expect("lock poisoned").log.clear();
    }

    pub fn rows(&self, table: &str) -> Vec<BTreeMap<String, Value>> {
        self.state
            .lock()
            .expect("lock poisoned")
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<(Vec<Row>, u64, i64), Error> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.log.push(sql.to_string());
        if state.fail_when.as_ref().is_some_and(|re| re.is_match(sql)) {
            return Err(failure(sql, "injected failure"));
        }
        let r = routes();

        match sql {
            "BEGIN" => {
                state.snapshot = Some(state.tables.clone());
                return Ok((Vec::new(), 0, 0));
            }
            "COMMIT" => {
                state.snapshot = None;
                return Ok((Vec::new(), 0, 0));
            }
            "ROLLBACK" => {
                if let Some(snapshot) = state.snapshot.take() {
                    state.tables = snapshot;
                }
                return Ok((Vec::new(), 0, 0));
            }
            _ => {}
        }

        if r.catalog_columns.is_match(sql) {
            let names = vec!["table_name".to_string(), "column_name".to_string(), "data_type".to_string()];
            let rows = state
                .tables
                .iter()
                .flat_map(|(table, fake)| {
                    let names = names.clone();
                    fake.columns.iter().map(move |(column, ty)| {
                        Row::new(
                            names.clone(),
                            vec![Value::from(table.as_str()), Value::from(column.as_str()), Value::from(ty.as_str())],
                        )
                    })
                })
                .collect();
            return Ok((rows, 0, 0));
        }

        if r.catalog_foreign_keys.is_match(sql) {
            let names = vec![
                "table_name".to_string(),
                "column_name".to_string(),
                "referenced_table_name".to_string(),
                "referenced_column_name".to_string(),
            ];
            let rows = state
                .foreign_keys
                .iter()
                .map(|(table, column, references)| {
                    Row::new(
                        names.clone(),
                        vec![
                            Value::from(table.as_str()),
                            Value::from(column.as_str()),
                            Value::from(references.as_str()),
                            Value::Null,
                        ],
                    )
                })
                .collect();
            return Ok((rows, 0, 0));
        }

        if let Some(caps) = r.count.captures(sql) {
            let keep = predicate(caps.get(2).map(|m| m.as_str()), params, sql)?;
            let fake = state.tables.get(&caps[1]).ok_or_else(|| unsupported(sql))?;
            let n = fake.rows.iter().filter(|row| keep(row)).count();
            let row = Row::new(vec!["count".to_string()], vec![Value::BigInt(n as i64)]);
            return Ok((vec![row], 0, 0));
        }

        if let Some(caps) = r.select_all.captures(sql) {
            let keep = predicate(caps.get(2).map(|m| m.as_str()), params, sql)?;
            let fake = state.tables.get(&caps[1]).ok_or_else(|| unsupported(sql))?;
            let mut rows: Vec<_> = fake.rows.iter().filter(|row| keep(row)).cloned().collect();
            if let Some(order) = caps.get(3) {
                let o = r.order.captures(order.as_str()).ok_or_else(|| unsupported(sql))?;
                let column = o[1].to_string();
                let descending = o.get(2).is_some_and(|d| d.as_str() == "DESC");
                rows.sort_by(|a, b| {
                    let ord = compare(
                        a.get(&column).unwrap_or(&Value::Null),
                        b.get(&column).unwrap_or(&Value::Null),
                    );
                    if descending { ord.reverse() } else { ord }
                });
            }
            let offset = caps.get(5).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
            let limit = caps.get(4).and_then(|m| m.as_str().parse().ok()).unwrap_or(usize::MAX);
            let names: Vec<String> = fake.columns.iter().map(|(c, _)| c.clone()).collect();
            let out = rows
                .into_iter()
                .skip(offset)
                .take(limit)
                .map(|row| {
                    let values = names
                        .iter()
                        .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                        .collect();
                    Row::new(names.clone(), values)
                })
                .collect();
            return Ok((out, 0, 0));
        }

        if let Some(caps) = r.select_columns.captures(sql) {
            let mut projection = Vec::new();
            for part in caps[1].split(", ") {
                let c = r.qualified.captures(part).ok_or_else(|| unsupported(sql))?;
                projection.push(c[1].to_string());
            }
            let keep = predicate(Some(&caps[3]), params, sql)?;
            let fake = state.tables.get(&caps[2]).ok_or_else(|| unsupported(sql))?;
            let out = fake
                .rows
                .iter()
                .filter(|row| keep(row))
                .map(|row| {
                    let values = projection
                        .iter()
                        .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                        .collect();
                    Row::new(projection.clone(), values)
                })
                .collect();
            return Ok((out, 0, 0));
        }

        if let Some(caps) = r.insert.captures(sql) {
            let columns: Vec<String> = caps[2]
                .split(", ")
                .map(|c| c.trim_matches('"').to_string())
                .collect();
            let values = list(&caps[3], params);
            let table = caps[1].to_string();
            return Self::insert_row(&mut state, &table, columns.into_iter().zip(values).collect(), sql);
        }

        if let Some(caps) = r.insert_default.captures(sql) {
            let table = caps[1].to_string();
            return Self::insert_row(&mut state, &table, BTreeMap::new(), sql);
        }

        if let Some(caps) = r.update.captures(sql) {
            let mut assignments = Vec::new();
            for part in caps[2].split(", ") {
                let (column, value) = part.split_once(" = ").ok_or_else(|| unsupported(sql))?;
                assignments.push((column.trim_matches('"').to_string(), token(value, params)));
            }
            let keep = predicate(Some(&caps[3]), params, sql)?;
            let fake = state.tables.get_mut(&caps[1]).ok_or_else(|| unsupported(sql))?;
            let mut affected = 0;
            for row in fake.rows.iter_mut().filter(|row| keep(row)) {
                for (column, value) in &assignments {
                    row.insert(column.clone(), value.clone());
                }
                affected += 1;
            }
            return Ok((Vec::new(), affected, 0));
        }

        if let Some(caps) = r.delete.captures(sql) {
            let keep = predicate(caps.get(2).map(|m| m.as_str()), params, sql)?;
            let fake = state.tables.get_mut(&caps[1]).ok_or_else(|| unsupported(sql))?;
            let before = fake.rows.len();
            fake.rows.retain(|row| !keep(row));
            return Ok((Vec::new(), (before - fake.rows.len()) as u64, 0));
        }

        Err(unsupported(sql))
    }

    fn insert_row(
        state: &mut State,
        table: &str,
        mut row: BTreeMap<String, Value>,
        sql: &str,
    ) -> Result<(Vec<Row>, u64, i64), Error> {
        let fake = state.tables.get_mut(table).ok_or_else(|| unsupported(sql))?;
        let has_id = fake.columns.iter().any(|(c, _)| c == "id");
        let mut id = 0;
        if has_id {
            id = match row.get("id").and_then(Value::as_i64) {
                Some(explicit) => explicit,
                None => {
                    let next = fake
                        .rows
                        .iter()
                        .filter_map(|r| r.get("id").and_then(Value::as_i64))
                        .max()
                        .unwrap_or(0)
                        + 1;
                    row.insert("id".to_string(), Value::BigInt(next));
                    next
                }
            };
            if fake
                .rows
                .iter()
                .any(|r| r.get("id").and_then(Value::as_i64) == Some(id))
            {
                return Err(failure(sql, "duplicate primary key"));
            }
        }
        fake.rows.push(row);
        Ok((Vec::new(), 1, id))
    }
}

impl Connection for FakeDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let outcome = match self.run(sql, params) {
            Ok((rows, _, _)) => Outcome::Ok(rows),
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
        let outcome = match self.run(sql, params) {
            Ok((_, affected, _)) => Outcome::Ok(affected),
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
        let outcome = match self.run(sql, params) {
            Ok((_, _, id)) => Outcome::Ok(id),
            Err(e) => Outcome::Err(e),
        };
        async move { outcome }
    }
}

/// Accounts, projects owned by accounts, and the `account_project` pivot.
pub fn project_database() -> FakeDatabase {
    FakeDatabase::new()
        .table("account", &[("id", "integer"), ("name", "text")])
        .table(
            "project",
            &[
                ("id", "integer"),
                ("title", "text"),
                ("date_created", "timestamp"),
                ("owner_id", "integer"),
            ],
        )
        .table("account_project", &[("account_id", "integer"), ("project_id", "integer")])
        .foreign_key("project", "owner_id", "account")
        .foreign_key("account_project", "account_id", "account")
        .foreign_key("account_project", "project_id", "project")
        .row("account", &[("id", Value::BigInt(1)), ("name", Value::from("ada"))])
        .row("account", &[("id", Value::BigInt(2)), ("name", Value::from("grace"))])
        .row("account", &[("id", Value::BigInt(3)), ("name", Value::from("linus"))])
        .row(
            "project",
            &[
                ("id", Value::BigInt(1)),
                ("title", Value::from("Apollo")),
                ("date_created", Value::from("2024-01-01 00:00:00")),
                ("owner_id", Value::BigInt(1)),
            ],
        )
        .row(
            "project",
            &[
                ("id", Value::BigInt(2)),
                ("title", Value::from("Gemini")),
                ("date_created", Value::from("2024-02-01 00:00:00")),
                ("owner_id", Value::BigInt(2)),
            ],
        )
        .row(
            "project",
            &[
                ("id", Value::BigInt(3)),
                ("title", Value::from("Mercury")),
                ("date_created", Value::from("2024-03-01 00:00:00")),
                ("owner_id", Value::BigInt(1)),
            ],
        )
        .row("account_project", &[("account_id", Value::BigInt(1)), ("project_id", Value::BigInt(1))])
        .row("account_project", &[("account_id", Value::BigInt(1)), ("project_id", Value::BigInt(2))])
        .row("account_project", &[("account_id", Value::BigInt(2)), ("project_id", Value::BigInt(2))])
        .row("account_project", &[("account_id", Value::BigInt(3)), ("project_id", Value::BigInt(3))])
}

pub fn block_on<F: Future>(f: F) -> F::Output {
    let rt = asupersync::runtime::RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(f)
}

/// Unwrap an outcome, panicking with the error message.
pub fn ok<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(value) => value,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        _ => panic!("operation did not complete"),
    }
}

/// A session over [`project_database`], introspected through the connection.
pub fn project_session(db: &FakeDatabase) -> relgraph::Session<FakeDatabase> {
    let cx = Cx::for_testing();
    let session = ok(block_on(
        relgraph::SessionBuilder::new()
            .namespace("main")
            .connect(&cx, db.clone()),
    ));
    db.clear_log();
    session
}
