//! Per-call execution records.
//!
//! Every executing adapter call takes an [`ExecutionContext`] and appends
//! one [`StatementRecord`] per statement it sends to the connection (or
//! serves from the cache). Nothing is kept in global or thread-local state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How a statement was served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    /// Not a cached call
    Bypass,
    Hit,
    Miss,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementRecord {
    pub text: String,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub cache: CacheOutcome,
    /// Rows returned (reads) or affected (writes)
    pub rows: u64,
    /// Rows dropped by non-strict decoding
    pub rows_skipped: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionContext {
    statements: Vec<StatementRecord>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: StatementRecord) {
        self.statements.push(record);
    }

    pub fn statements(&self) -> &[StatementRecord] {
        &self.statements
    }

    pub fn last(&self) -> Option<&StatementRecord> {
        self.statements.last()
    }

    pub fn total_duration(&self) -> Duration {
        self.statements.iter().map(|s| s.duration).sum()
    }

    pub fn cache_hits(&self) -> usize {
        self.statements
            .iter()
            .filter(|s| s.cache == CacheOutcome::Hit)
            .count()
    }

    pub fn rows_skipped(&self) -> usize {
        self.statements.iter().map(|s| s.rows_skipped).sum()
    }

    pub fn clear(&mut self) {
        self.statements.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cache: CacheOutcome, ms: u64, skipped: usize) -> StatementRecord {
        StatementRecord {
            text: "SELECT 1;".to_string(),
            started_at: Utc::now(),
            duration: Duration::from_millis(ms),
            cache,
            rows: 1,
            rows_skipped: skipped,
        }
    }

    #[test]
    fn test_totals() {
        let mut ctx = ExecutionContext::new();
        ctx.record(record(CacheOutcome::Miss, 5, 0));
        ctx.record(record(CacheOutcome::Hit, 0, 2));
        ctx.record(record(CacheOutcome::Bypass, 7, 1));

        assert_eq!(ctx.statements().len(), 3);
        assert_eq!(ctx.total_duration(), Duration::from_millis(12));
        assert_eq!(ctx.cache_hits(), 1);
        assert_eq!(ctx.rows_skipped(), 3);
        assert_eq!(ctx.last().unwrap().cache, CacheOutcome::Bypass);

        ctx.clear();
        assert!(ctx.last().is_none());
    }
}
