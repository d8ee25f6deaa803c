//! In-memory [SqlSource] replaying canned result sets.
//!
//! Queries are answered from result sets registered per query text, and
//! statements are recorded with their bound parameters. Failures can be
//! injected per statement, per fetch and on commit.

use std::collections::{HashMap, HashSet};

use super::{Cursor, CursorColumn, Params, SqlError, SqlErrorKind, SqlResult, SqlSource};
use crate::value::Value;

/// A statement executed against a [ScriptedSource].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStmt {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone)]
struct ResultSet {
    columns: Vec<CursorColumn>,
    rows: Vec<Vec<Value>>,
    fail_after: Option<usize>,
}

#[derive(Debug, Default)]
pub struct ScriptedSource {
    connect: Option<String>,
    in_trans: bool,
    results: HashMap<String, ResultSet>,
    failing: HashSet<String>,
    fail_commit: bool,
    executed: Vec<ExecutedStmt>,
    pending: usize,
    transactions: Vec<&'static str>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the result set returned by `query`.
    pub fn with_result(
        mut self,
        query: impl Into<String>,
        columns: Vec<CursorColumn>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.results.insert(
            query.into(),
            ResultSet {
                columns,
                rows,
                fail_after: None,
            },
        );
        self
    }

    /// Makes `sql` fail, as a query or as a statement.
    pub fn fail_on(&mut self, sql: impl Into<String>) {
        self.failing.insert(sql.into());
    }

    /// Makes fetching from `query` fail once `rows` rows have been returned.
    pub fn fail_fetch_after(&mut self, query: &str, rows: usize) {
        if let Some(set) = self.results.get_mut(query) {
            set.fail_after = Some(rows);
        }
    }

    pub fn fail_commit(&mut self) {
        self.fail_commit = true;
    }

    /// Statements that took effect: committed ones and those run outside a
    /// transaction.
    pub fn executed(&self) -> &[ExecutedStmt] {
        &self.executed[..self.executed.len() - self.pending]
    }

    /// Transaction events in order: `begin`, `commit` or `rollback`.
    pub fn transactions(&self) -> &[&'static str] {
        &self.transactions
    }

    fn check_open(&self) -> SqlResult<()> {
        if self.connect.is_none() {
            return Err(SqlError::new(SqlErrorKind::ConnectFailed, "not connected"));
        }
        Ok(())
    }

    fn check_script(&self, sql: &str, kind: SqlErrorKind) -> SqlResult<()> {
        if self.failing.contains(sql) {
            return Err(SqlError::new(kind, format!("scripted failure for {sql:?}")));
        }
        Ok(())
    }
}

impl SqlSource for ScriptedSource {
    fn open(&mut self, connect: &str) -> SqlResult<()> {
        self.check_script(connect, SqlErrorKind::ConnectFailed)?;
        self.connect = Some(connect.to_owned());
        Ok(())
    }

    fn close(&mut self) {
        self.connect = None;
        self.in_trans = false;
    }

    fn is_open(&self) -> bool {
        self.connect.is_some()
    }

    fn exec_stmt(&mut self, stmt: &str, params: Option<&dyn Params>) -> SqlResult<()> {
        self.check_open()?;
        self.check_script(stmt, SqlErrorKind::ExecFailed)?;
        let params = params
            .map(|p| (0..p.num_params()).map(|n| p.param(n).clone()).collect())
            .unwrap_or_default();
        self.executed.push(ExecutedStmt {
            sql: stmt.to_owned(),
            params,
        });
        if self.in_trans {
            self.pending += 1;
        }
        Ok(())
    }

    fn exec_query(&mut self, query: &str) -> SqlResult<Box<dyn Cursor>> {
        self.check_open()?;
        self.check_script(query, SqlErrorKind::ExecFailed)?;
        let set = self.results.get(query).cloned().ok_or_else(|| {
            SqlError::new(SqlErrorKind::ExecFailed, format!("no result set for {query:?}"))
        })?;
        Ok(Box::new(ScriptedCursor {
            set,
            next: 0,
            current: None,
        }))
    }

    fn create_params(&mut self, stmt: &str, count: usize) -> SqlResult<Box<dyn Params>> {
        self.check_open()?;
        self.check_script(stmt, SqlErrorKind::AllocFailed)?;
        Ok(Box::new(ScriptedParams {
            values: vec![Value::Null; count],
        }))
    }

    fn in_trans(&self) -> bool {
        self.in_trans
    }

    fn begin_trans(&mut self) -> SqlResult<()> {
        self.check_open()?;
        if self.in_trans {
            return Err(SqlError::new(
                SqlErrorKind::TransFailed,
                "transaction already open",
            ));
        }
        self.in_trans = true;
        self.transactions.push("begin");
        Ok(())
    }

    fn commit_trans(&mut self) -> SqlResult<()> {
        if !self.in_trans || self.fail_commit {
            return Err(SqlError::new(SqlErrorKind::TransFailed, "commit failed"));
        }
        self.in_trans = false;
        self.pending = 0;
        self.transactions.push("commit");
        Ok(())
    }

    fn rollback_trans(&mut self) -> SqlResult<()> {
        if !self.in_trans {
            return Err(SqlError::new(SqlErrorKind::TransFailed, "no open transaction"));
        }
        let kept = self.executed.len() - self.pending;
        self.executed.truncate(kept);
        self.pending = 0;
        self.in_trans = false;
        self.transactions.push("rollback");
        Ok(())
    }
}

struct ScriptedCursor {
    set: ResultSet,
    next: usize,
    current: Option<usize>,
}

impl Cursor for ScriptedCursor {
    fn num_columns(&self) -> usize {
        self.set.columns.len()
    }

    fn column(&self, n: usize) -> &CursorColumn {
        &self.set.columns[n]
    }

    fn fetch(&mut self) -> SqlResult<bool> {
        if self.set.fail_after == Some(self.next) {
            return Err(SqlError::new(
                SqlErrorKind::FetchFailed,
                format!("fetch failed at row {}", self.next),
            ));
        }
        if self.next >= self.set.rows.len() {
            self.current = None;
            return Ok(false);
        }
        self.current = Some(self.next);
        self.next += 1;
        Ok(true)
    }

    fn value(&self, n: usize) -> Value {
        self.current
            .and_then(|row| self.set.rows[row].get(n).cloned())
            .unwrap_or(Value::Null)
    }
}

struct ScriptedParams {
    values: Vec<Value>,
}

impl Params for ScriptedParams {
    fn num_params(&self) -> usize {
        self.values.len()
    }

    fn param(&self, n: usize) -> &Value {
        &self.values[n]
    }

    fn set_value(&mut self, n: usize, value: &Value) {
        self.values[n] = value.clone();
    }
}
