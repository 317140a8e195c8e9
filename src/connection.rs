//! Connection boundary.
//!
//! The adapter never talks to a driver directly. It hands compiled
//! statements to a [`Connection`] and gets raw rows (or documents) back.
//! Pooling, transactions and wire protocols belong to the implementation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use polydal_core::{CompiledStatement, RawRow, Value};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Errors raised by a connection, passed through to the caller unchanged
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Transaction error: {0}")]
    Transaction(String),
}

/// What a fetch returns: driver tuples for SQL backends, documents for
/// document backends
#[derive(Debug, Clone, PartialEq)]
pub enum ResultSet {
    Rows(Vec<RawRow>),
    Documents(Vec<JsonValue>),
}

impl ResultSet {
    pub fn len(&self) -> usize {
        match self {
            ResultSet::Rows(rows) => rows.len(),
            ResultSet::Documents(docs) => docs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single physical connection. Calls are synchronous and never
/// concurrent: the adapter serializes access.
pub trait Connection: Send {
    /// Run a write statement; returns the number of affected rows.
    fn execute(&mut self, statement: &CompiledStatement) -> Result<u64, ConnectionError>;

    /// Run a read statement producing `arity` columns per row.
    fn fetch_all(
        &mut self,
        statement: &CompiledStatement,
        arity: usize,
    ) -> Result<ResultSet, ConnectionError>;

    /// Key generated by the last insert, if the backend reports one.
    fn last_insert_id(&mut self) -> Result<Option<Value>, ConnectionError>;

    fn commit(&mut self) -> Result<(), ConnectionError>;

    fn rollback(&mut self) -> Result<(), ConnectionError>;
}

#[derive(Debug, Clone)]
enum Reply {
    Result(ResultSet),
    Affected(u64),
    Fail(ConnectionError),
}

#[derive(Debug, Default)]
struct Script {
    replies: Vec<(String, Reply)>,
    executed: Vec<String>,
    insert_ids: Vec<Value>,
    last_insert_id: Option<Value>,
    commits: usize,
    rollbacks: usize,
}

/// In-memory connection for tests.
///
/// Replies are matched by substring against the statement text, first
/// match wins; unmatched reads return no rows and unmatched writes report
/// one affected row. Clones share state, so a test can keep a handle after
/// moving a clone into an adapter.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnection {
    script: Arc<Mutex<Script>>,
    executions: Arc<AtomicUsize>,
    latency: Option<Duration>,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, to widen race windows in concurrency tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Answer statements containing `pattern` with `rows`.
    pub fn on_fetch(self, pattern: &str, rows: Vec<RawRow>) -> Self {
        self.reply(pattern, Reply::Result(ResultSet::Rows(rows)))
    }

    /// Answer statements containing `pattern` with `docs`.
    pub fn on_find(self, pattern: &str, docs: Vec<JsonValue>) -> Self {
        self.reply(pattern, Reply::Result(ResultSet::Documents(docs)))
    }

    pub fn on_execute(self, pattern: &str, affected: u64) -> Self {
        self.reply(pattern, Reply::Affected(affected))
    }

    pub fn on_error(self, pattern: &str, error: ConnectionError) -> Self {
        self.reply(pattern, Reply::Fail(error))
    }

    /// Keys handed out by successive inserts.
    pub fn with_insert_ids(self, ids: Vec<Value>) -> Self {
        self.script.lock().insert_ids = ids;
        self
    }

    fn reply(self, pattern: &str, reply: Reply) -> Self {
        self.script.lock().replies.push((pattern.to_string(), reply));
        self
    }

    /// Statement texts in execution order
    pub fn executed(&self) -> Vec<String> {
        self.script.lock().executed.clone()
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.script.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.script.lock().rollbacks
    }

    fn run(&self, statement: &CompiledStatement) -> Option<Reply> {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        self.executions.fetch_add(1, Ordering::SeqCst);
        let text = statement.text();
        let mut script = self.script.lock();
        let reply = script
            .replies
            .iter()
            .find(|(pattern, _)| text.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone());
        script.executed.push(text);
        reply
    }
}

impl Connection for ScriptedConnection {
    fn execute(&mut self, statement: &CompiledStatement) -> Result<u64, ConnectionError> {
        let reply = self.run(statement);
        let mut script = self.script.lock();
        match reply {
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Affected(n)) => Ok(n),
            Some(Reply::Result(set)) => Ok(set.len() as u64),
            None => {
                if statement.text().starts_with("INSERT") || statement.text().contains("\"insert\"") {
                    let next = (!script.insert_ids.is_empty()).then(|| script.insert_ids.remove(0));
                    script.last_insert_id = next;
                }
                Ok(1)
            }
        }
    }

    fn fetch_all(
        &mut self,
        statement: &CompiledStatement,
        _arity: usize,
    ) -> Result<ResultSet, ConnectionError> {
        match self.run(statement) {
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Result(set)) => Ok(set),
            Some(Reply::Affected(_)) | None => Ok(match statement.as_document() {
                Some(_) => ResultSet::Documents(Vec::new()),
                None => ResultSet::Rows(Vec::new()),
            }),
        }
    }

    fn last_insert_id(&mut self) -> Result<Option<Value>, ConnectionError> {
        Ok(self.script.lock().last_insert_id.clone())
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        self.script.lock().commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ConnectionError> {
        self.script.lock().rollbacks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polydal_core::RawValue;

    fn sql(text: &str) -> CompiledStatement {
        CompiledStatement::sql(text.to_string(), vec!["c".to_string()])
    }

    #[test]
    fn test_replies_match_by_substring() {
        let mut conn = ScriptedConnection::new()
            .on_fetch("FROM person", vec![vec![RawValue::Int(1)]])
            .on_error("FROM broken", ConnectionError::Backend("boom".into()));

        let rows = conn.fetch_all(&sql("SELECT person.id FROM person;"), 1).unwrap();
        assert_eq!(rows, ResultSet::Rows(vec![vec![RawValue::Int(1)]]));
        assert!(conn.fetch_all(&sql("SELECT x FROM broken;"), 1).is_err());
        assert!(conn.fetch_all(&sql("SELECT y FROM other;"), 1).unwrap().is_empty());
        assert_eq!(conn.executions(), 3);
        assert_eq!(conn.executed()[0], "SELECT person.id FROM person;");
    }

    #[test]
    fn test_clones_share_state() {
        let handle = ScriptedConnection::new().with_insert_ids(vec![Value::Int(7)]);
        let mut conn = handle.clone();
        conn.execute(&sql("INSERT INTO person(name) VALUES ('a');")).unwrap();
        assert_eq!(conn.last_insert_id().unwrap(), Some(Value::Int(7)));
        conn.commit().unwrap();
        conn.rollback().unwrap();
        assert_eq!(handle.executions(), 1);
        assert_eq!((handle.commits(), handle.rollbacks()), (1, 1));
    }
}
