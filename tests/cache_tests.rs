//! Select Cache Tests
//!
//! Tests for:
//! - Coalescing of concurrent cold-cache selects
//! - Expiry and re-fetch
//! - Keys scoped by backend URI

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{adapter, shop};
use polydal::{CacheOutcome, ExecutionContext, ScriptedConnection, SelectCache};
use polydal_core::{RawValue, Select};

fn person_rows() -> Vec<Vec<RawValue>> {
    vec![
        vec![RawValue::Text("ann".into())],
        vec![RawValue::Text("bob".into())],
    ]
}

#[test]
fn test_concurrent_cold_selects_execute_once() {
    let s = shop();
    let conn = ScriptedConnection::new()
        .with_latency(Duration::from_millis(100))
        .on_fetch("FROM person", person_rows());
    let db = Arc::new(adapter("sqlite://shop.db", conn.clone(), &s.tables()));
    let select = Select::new([s.person.field("name").unwrap()]);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let db = Arc::clone(&db);
            let select = select.clone();
            thread::spawn(move || {
                let mut ctx = ExecutionContext::new();
                let rows = db.select_cached(&select, None, &mut ctx).unwrap();
                (rows.to_json(), ctx.last().unwrap().cache)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(conn.executions(), 1);
    assert!(results.iter().all(|(rows, _)| rows == &results[0].0));
    assert_eq!(results.iter().filter(|(_, c)| *c == CacheOutcome::Miss).count(), 1);
    assert_eq!(results.iter().filter(|(_, c)| *c == CacheOutcome::Hit).count(), 7);

    let stats = db.cache_stats();
    assert_eq!((stats.hits, stats.misses), (7, 1));
}

#[test]
fn test_expired_entry_is_fetched_again() {
    let s = shop();
    let conn = ScriptedConnection::new().on_fetch("FROM person", person_rows());
    let db = adapter("sqlite://shop.db", conn.clone(), &s.tables());
    let select = Select::new([s.person.field("name").unwrap()]);
    let ttl = Some(Duration::from_millis(20));
    let mut ctx = ExecutionContext::new();

    db.select_cached(&select, ttl, &mut ctx).unwrap();
    db.select_cached(&select, ttl, &mut ctx).unwrap();
    assert_eq!(conn.executions(), 1);

    thread::sleep(Duration::from_millis(50));
    db.select_cached(&select, ttl, &mut ctx).unwrap();
    assert_eq!(conn.executions(), 2);
    let outcomes: Vec<CacheOutcome> = ctx.statements().iter().map(|r| r.cache).collect();
    assert_eq!(outcomes, vec![CacheOutcome::Miss, CacheOutcome::Hit, CacheOutcome::Miss]);
}

#[test]
fn test_failed_fetch_is_not_cached() {
    let s = shop();
    let conn = ScriptedConnection::new().on_error(
        "FROM person",
        polydal::ConnectionError::Backend("connection reset".into()),
    );
    let db = adapter("sqlite://shop.db", conn.clone(), &s.tables());
    let select = Select::new([s.person.field("name").unwrap()]);
    let mut ctx = ExecutionContext::new();

    assert!(db.select_cached(&select, None, &mut ctx).is_err());
    assert!(db.select_cached(&select, None, &mut ctx).is_err());
    assert_eq!(conn.executions(), 2);
    assert_eq!(db.cache_stats().entries, 0);
}

#[test]
fn test_uncached_select_always_executes() {
    let s = shop();
    let conn = ScriptedConnection::new().on_fetch("FROM person", person_rows());
    let db = adapter("sqlite://shop.db", conn.clone(), &s.tables());
    let select = Select::new([s.person.field("name").unwrap()]);
    let mut ctx = ExecutionContext::new();

    db.select(&select, &mut ctx).unwrap();
    db.select(&select, &mut ctx).unwrap();
    assert_eq!(conn.executions(), 2);
    assert!(ctx.statements().iter().all(|r| r.cache == CacheOutcome::Bypass));
}

#[test]
fn test_keys_depend_on_backend_uri() {
    let statement = "SELECT \"person\".\"name\" FROM \"person\";";
    let a = SelectCache::<()>::cache_key("sqlite://a.db", statement);
    let b = SelectCache::<()>::cache_key("sqlite://b.db", statement);
    assert_ne!(a, b);
    assert_eq!(a, SelectCache::<()>::cache_key("sqlite://a.db", statement));
}
