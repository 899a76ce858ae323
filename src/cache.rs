//! Bounded in-memory cache with per-entry TTL and LRU eviction.
//!
//! Used by the authorizer to memoize secret lookups for the lifetime of a
//! warm Lambda instance. The clock is injected so expiry can be driven
//! deterministically in tests.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Delegates to `std::time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<Instant>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) += duration;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
    last_used: u64,
}

/// TTL cache holding at most `capacity` entries.
///
/// An entry is never returned once `ttl` has elapsed since it was inserted.
/// When full, expired entries are dropped first, then the least recently
/// used one.
///
/// Not synchronized; wrap it in a `Mutex` to share it.
#[derive(Debug)]
pub struct TtlCache<K, V, C = SystemClock> {
    entries: HashMap<K, Entry<V>>,
    capacity: usize,
    ttl: Duration,
    clock: C,
    tick: u64,
}

impl<K: Eq + Hash + Clone, V> TtlCache<K, V> {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, SystemClock)
    }
}

impl<K: Eq + Hash + Clone, V, C: Clock> TtlCache<K, V, C> {
    #[must_use]
    pub fn with_clock(capacity: usize, ttl: Duration, clock: C) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.min(1024)),
            capacity,
            ttl,
            clock,
            tick: 0,
        }
    }

    /// Returns a clone of the live value for `key`, marking it recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        V: Clone,
    {
        let now = self.clock.now();
        let expired = self.entries.get(key)?.expires_at <= now;
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.tick += 1;
        let entry = self.entries.get_mut(key)?;
        entry.last_used = self.tick;
        Some(entry.value.clone())
    }

    /// Inserts or replaces `key`, restarting its TTL.
    pub fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        let now = self.clock.now();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict(now);
        }
        self.tick += 1;
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
                last_used: self.tick,
            },
        );
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict(&mut self, now: Instant) {
        self.entries.retain(|_, entry| entry.expires_at > now);
        if self.entries.len() < self.capacity {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(oldest) = oldest {
            self.entries.remove(&oldest);
        }
    }
}
