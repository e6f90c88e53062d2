//! Memoization cache used for search results, facets and term vectors.
//!
//! The indexer only depends on the [`Cache`] trait; [`MemoryCache`] is the
//! in-process implementation. Values are type-erased and recovered with
//! [`CacheExt::get_as`].

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use chrono::Utc;
use log::debug;
use parking_lot::RwLock;

use crate::error::Result;

/// A cached value.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// Aliases are followed at most this many times.
const MAX_ALIAS_HOPS: usize = 8;

pub trait Cache: Send + Sync + fmt::Debug {
    /// Value of `key`, following aliases.
    fn get(&self, key: &str) -> Option<CacheValue>;

    /// Store `value` under `key`, replacing an alias of that name.
    fn put(&self, key: &str, value: CacheValue);

    /// Epoch millis at which the value of `key` was last stored.
    fn updated_at(&self, key: &str) -> Option<i64>;

    fn invalidate(&self, key: &str);

    /// Drop every key starting with `prefix`. Returns the number dropped.
    fn invalidate_prefix(&self, prefix: &str) -> usize;

    /// Make `alias` resolve to whatever `canonical` holds.
    fn alias_key(&self, alias: &str, canonical: &str);

    /// Store `value` unless `key` was updated at or after `since`.
    /// Returns whether the value was stored.
    fn set_if_newer(&self, key: &str, value: CacheValue, since: i64) -> bool {
        match self.updated_at(key) {
            Some(updated) if updated >= since => false,
            _ => {
                self.put(key, value);
                true
            }
        }
    }
}

/// A value together with the index generation it was computed from.
struct AtGeneration<T> {
    generation: u64,
    value: Arc<T>,
}

/// Typed helpers over any [`Cache`].
pub trait CacheExt: Cache {
    /// Value of `key` if it holds a `T`.
    fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key).and_then(|v| v.downcast::<T>().ok())
    }

    /// Value of `key`, computing and storing it on a miss.
    fn get_or_compute<T, F>(&self, key: &str, compute: F) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.get_as::<T>(key) {
            return Ok(value);
        }
        debug!("cache miss: {key}");
        let value = Arc::new(compute()?);
        self.put(key, value.clone());
        Ok(value)
    }

    /// Like [`get_or_compute`](CacheExt::get_or_compute), but a value
    /// computed from another index `generation` is recomputed.
    fn get_or_compute_at<T, F>(&self, generation: u64, key: &str, compute: F) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Result<T>,
    {
        if let Some(cached) = self.get_as::<AtGeneration<T>>(key) {
            if cached.generation == generation {
                return Ok(cached.value.clone());
            }
        }
        debug!("cache miss: {key} (generation {generation})");
        let value = Arc::new(compute()?);
        self.put(
            key,
            Arc::new(AtGeneration {
                generation,
                value: value.clone(),
            }),
        );
        Ok(value)
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

/// Deterministic key for `parts` under `prefix`; equal parts in equal
/// order always give the same key, across processes too.
pub fn cache_key<S: AsRef<str>>(prefix: &str, parts: &[S]) -> String {
    let mut hasher = crc32fast::Hasher::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update(&[0]);
    }
    format!("{prefix}/{:08x}", hasher.finalize())
}

/// Entries a [`MemoryCache`] holds unless told otherwise.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

#[derive(Clone)]
enum Slot {
    Value { value: CacheValue, updated: i64 },
    Alias(String),
}

#[derive(Default)]
struct Slots {
    map: AHashMap<String, (Slot, u64)>,
    /// Keys in storing order, tagged with the stamp they were stored with.
    /// Entries whose stamp no longer matches the map are stale.
    order: VecDeque<(String, u64)>,
    next_stamp: u64,
}

impl Slots {
    fn insert(&mut self, key: &str, slot: Slot, capacity: usize) {
        self.next_stamp += 1;
        let stamp = self.next_stamp;
        self.map.insert(key.to_string(), (slot, stamp));
        self.order.push_back((key.to_string(), stamp));
        while self.map.len() > capacity {
            let Some((oldest, stamp)) = self.order.pop_front() else {
                break;
            };
            if self.map.get(&oldest).is_some_and(|(_, s)| *s == stamp) {
                self.map.remove(&oldest);
            }
        }
        if self.order.len() > capacity.saturating_mul(2) {
            let map = &self.map;
            self.order
                .retain(|(key, stamp)| map.get(key).is_some_and(|(_, s)| s == stamp));
        }
    }
}

/// In-memory cache holding at most `capacity` keys. Once full, the key
/// stored longest ago is evicted first.
pub struct MemoryCache {
    slots: RwLock<Slots>,
    capacity: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `capacity` keys, aliases included.
    pub fn with_capacity(capacity: usize) -> Self {
        MemoryCache {
            slots: RwLock::new(Slots::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().map.is_empty()
    }

    pub fn clear(&self) {
        let mut slots = self.slots.write();
        slots.map.clear();
        slots.order.clear();
    }

    fn resolve(&self, key: &str) -> Option<(CacheValue, i64)> {
        let slots = self.slots.read();
        let mut current = key;
        for _ in 0..MAX_ALIAS_HOPS {
            match &slots.map.get(current)?.0 {
                Slot::Value { value, updated } => return Some((value.clone(), *updated)),
                Slot::Alias(target) => current = target.as_str(),
            }
        }
        None
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<CacheValue> {
        self.resolve(key).map(|(value, _)| value)
    }

    fn put(&self, key: &str, value: CacheValue) {
        let slot = Slot::Value {
            value,
            updated: Utc::now().timestamp_millis(),
        };
        self.slots.write().insert(key, slot, self.capacity);
    }

    fn updated_at(&self, key: &str) -> Option<i64> {
        self.resolve(key).map(|(_, updated)| updated)
    }

    fn invalidate(&self, key: &str) {
        self.slots.write().map.remove(key);
    }

    fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut slots = self.slots.write();
        let before = slots.map.len();
        slots.map.retain(|key, _| !key.starts_with(prefix));
        let dropped = before - slots.map.len();
        if dropped > 0 {
            debug!("dropped {dropped} cache entries under {prefix}");
        }
        dropped
    }

    fn alias_key(&self, alias: &str, canonical: &str) {
        if alias == canonical {
            return;
        }
        debug!("creating alias {alias} => {canonical}");
        self.slots
            .write()
            .insert(alias, Slot::Alias(canonical.to_string()), self.capacity);
    }
}
