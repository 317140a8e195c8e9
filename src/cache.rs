//! Select result cache.
//!
//! Entries are keyed by a digest of the backend URI and the compiled
//! statement text. Lookups are single-flight: while one caller executes a
//! missing key, every other caller for that key waits and then shares the
//! first caller's result. Entries expire after their TTL and the cache
//! holds at most `capacity` entries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use sha2::{Digest, Sha256};

enum SlotState<V> {
    Pending,
    Ready {
        value: Arc<V>,
        expires: Instant,
        last_access: Instant,
    },
    Failed,
}

struct Slot<V> {
    state: Mutex<SlotState<V>>,
    ready: Condvar,
}

impl<V> Slot<V> {
    fn pending() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            ready: Condvar::new(),
        }
    }

    fn settle(&self, state: SlotState<V>) {
        *self.state.lock() = state;
        self.ready.notify_all();
    }
}

/// Marks the slot failed if the leader unwinds before settling it, so
/// waiters never block on a key nobody is computing.
struct Flight<'a, V> {
    cache: &'a SelectCache<V>,
    key: &'a str,
    slot: &'a Arc<Slot<V>>,
    settled: bool,
}

impl<V> Drop for Flight<'_, V> {
    fn drop(&mut self) {
        if !self.settled {
            self.slot.settle(SlotState::Failed);
            self.cache.remove_slot(self.key, self.slot);
        }
    }
}

/// Where a cached value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Miss,
}

/// Single-flight TTL cache for select results.
pub struct SelectCache<V> {
    entries: DashMap<String, Arc<Slot<V>>>,
    capacity: usize,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V> SelectCache<V> {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
            capacity: capacity.max(1),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// SHA-256 hex digest of `(backend_uri, statement)`.
    pub fn cache_key(backend_uri: &str, statement: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(backend_uri.as_bytes());
        hasher.update([0u8]);
        hasher.update(statement.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Cached value for `key`, or the result of `compute` stored under it.
    ///
    /// At most one `compute` runs per key at a time; concurrent callers
    /// wait for it. Errors are returned to the computing caller only and
    /// are not cached: waiters then retry.
    pub fn get_or_compute<E, F>(&self, key: &str, ttl: Option<Duration>, compute: F) -> Result<(Arc<V>, Lookup), E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let mut compute = Some(compute);
        loop {
            let (slot, leader) = self.claim(key);
            if leader {
                if let Some(run) = compute.take() {
                    return self.lead(key, &slot, ttl, run);
                }
            }

            let mut state = slot.state.lock();
            while matches!(*state, SlotState::Pending) {
                slot.ready.wait(&mut state);
            }
            let hit = match &mut *state {
                SlotState::Ready {
                    value,
                    expires,
                    last_access,
                } if *expires > Instant::now() => {
                    *last_access = Instant::now();
                    Some(Arc::clone(value))
                }
                _ => None,
            };
            drop(state);
            match hit {
                Some(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok((value, Lookup::Hit));
                }
                None => self.remove_slot(key, &slot),
            }
        }
    }

    fn lead<E, F>(&self, key: &str, slot: &Arc<Slot<V>>, ttl: Option<Duration>, run: F) -> Result<(Arc<V>, Lookup), E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let mut flight = Flight {
            cache: self,
            key,
            slot,
            settled: false,
        };
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = Arc::new(run()?);
        let now = Instant::now();
        slot.settle(SlotState::Ready {
            value: Arc::clone(&value),
            expires: now + ttl.unwrap_or(self.default_ttl),
            last_access: now,
        });
        flight.settled = true;
        Ok((value, Lookup::Miss))
    }

    /// Existing slot for `key`, or a fresh pending one owned by the caller.
    fn claim(&self, key: &str) -> (Arc<Slot<V>>, bool) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity {
            self.evict();
        }
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(e) => (Arc::clone(e.get()), false),
            Entry::Vacant(e) => {
                let slot = Arc::new(Slot::pending());
                e.insert(Arc::clone(&slot));
                (slot, true)
            }
        }
    }

    fn remove_slot(&self, key: &str, slot: &Arc<Slot<V>>) {
        self.entries.remove_if(key, |_, current| Arc::ptr_eq(current, slot));
    }

    /// Drop expired entries, then the least recently used ready entry if
    /// the cache is still full.
    fn evict(&self) {
        let now = Instant::now();
        let mut expired = Vec::new();
        let mut oldest: Option<(String, Instant)> = None;
        for entry in self.entries.iter() {
            let Some(state) = entry.value().state.try_lock() else {
                continue;
            };
            if let SlotState::Ready {
                expires, last_access, ..
            } = &*state
            {
                if *expires <= now {
                    expired.push(entry.key().clone());
                } else if oldest.as_ref().map_or(true, |(_, t)| last_access < t) {
                    oldest = Some((entry.key().clone(), *last_access));
                }
            }
        }
        let mut removed = 0;
        for key in expired {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        if self.entries.len() >= self.capacity {
            if let Some((key, _)) = oldest {
                if self.entries.remove(&key).is_some() {
                    removed += 1;
                }
            }
        }
        self.evictions.fetch_add(removed, Ordering::Relaxed);
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}
