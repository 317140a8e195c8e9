//! Unique-constraint conflict handlers.
//!
//! An insert that violates a unique constraint normally fails with the
//! connection's error. A table may register a handler that decides the
//! outcome instead, e.g. returning the key of the row already present.

use std::sync::Arc;

use polydal_core::{Field, Value};

/// What the handler sees
#[derive(Debug)]
pub struct Conflict<'a> {
    pub table: &'a str,
    pub values: &'a [(Field, Value)],
    /// Backend message of the violated constraint
    pub message: &'a str,
}

impl Conflict<'_> {
    /// Value the insert tried to store in `field`
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(f, _)| f.name() == field)
            .map(|(_, v)| v)
    }
}

/// Handler decision
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictOutcome {
    /// Treat the insert as done, reporting this key (if any)
    Resolved(Option<Value>),
    /// Fail with a conflict error carrying this message
    Reject(String),
    /// Surface the connection error unchanged
    Propagate,
}

pub type ConflictHandler = Arc<dyn Fn(&Conflict<'_>) -> ConflictOutcome + Send + Sync>;
