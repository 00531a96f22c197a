// Bounded, thread-safe, time-expiring response cache.
// Sits between the search client and the upstream API to absorb duplicate
// requests during short windows.

use std::{
    collections::{BTreeMap, HashSet},
    time::{Duration, Instant},
};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::error::ApiError;

/// Diagnostic counters; observational only.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub eviction_count: usize,
    pub expired_count: usize,
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Generic bounded TTL cache.
///
/// Reads go straight through the sharded map and never take the index lock;
/// all mutations serialize on it, which is what keeps `size() <= capacity`
/// true after every `set`. An expired entry is never returned: it is dropped
/// on the read that finds it, or by the housekeeping sweep that runs at the
/// start of every `set`.
pub struct TtlCache<V> {
    store: DashMap<String, CacheEntry<V>>,
    // expires_at -> keys carrying that expiry; nearest-expiry eviction pops
    // from the front. Entries can go stale when a key is overwritten, so
    // removal always re-checks the stored expiry.
    index: Mutex<BTreeMap<Instant, HashSet<String>>>,
    capacity: usize,
    stats: RwLock<CacheStats>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(capacity: usize) -> Result<Self, ApiError> {
        if capacity == 0 {
            return Err(ApiError::InvalidArgument(
                "cache capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            store: DashMap::new(),
            index: Mutex::new(BTreeMap::new()),
            capacity,
            stats: RwLock::new(CacheStats::default()),
        })
    }

    /// Returns the stored value only while it is still fresh.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        if let Some(entry) = self.store.get(key) {
            if now < entry.expires_at {
                self.stats.write().hit_count += 1;
                return Some(entry.value.clone());
            }
            drop(entry);
            // lazy removal; the index entry is swept on the next set
            if self.store.remove_if(key, |_, e| now >= e.expires_at).is_some() {
                self.stats.write().expired_count += 1;
            }
        }
        self.stats.write().miss_count += 1;
        None
    }

    /// Insert or overwrite `key` with `expires_at = now + ttl`, evicting the
    /// entry nearest to expiry when a new key would exceed capacity.
    pub fn set(&self, key: String, value: V, ttl: Duration) -> Result<(), ApiError> {
        if ttl.is_zero() {
            return Err(ApiError::InvalidArgument(
                "cache TTL must be positive".to_string(),
            ));
        }
        let now = Instant::now();
        let expires_at = now + ttl;

        let mut index = self.index.lock();
        self.sweep_expired(&mut index, now);

        if let Some(existing) = self.store.get(&key) {
            let old_expiry = existing.expires_at;
            drop(existing);
            if let Some(keys) = index.get_mut(&old_expiry) {
                keys.remove(&key);
                if keys.is_empty() {
                    index.remove(&old_expiry);
                }
            }
        } else if self.store.len() >= self.capacity {
            self.evict_nearest(&mut index);
        }

        self.store.insert(key.clone(), CacheEntry { value, expires_at });
        index.entry(expires_at).or_default().insert(key);
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.store.len()
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.read().clone();
        stats.items_count = self.store.len();
        stats
    }

    // Caller holds the index lock.
    fn sweep_expired(&self, index: &mut BTreeMap<Instant, HashSet<String>>, now: Instant) {
        while let Some(bucket) = index.first_entry() {
            if *bucket.key() > now {
                break;
            }
            let instant = *bucket.key();
            for key in bucket.remove() {
                if self
                    .store
                    .remove_if(&key, |_, e| e.expires_at == instant)
                    .is_some()
                {
                    self.stats.write().expired_count += 1;
                }
            }
        }
    }

    // Removes exactly one live entry, the one with the smallest expires_at.
    // Caller holds the index lock and has verified the store is at capacity.
    fn evict_nearest(&self, index: &mut BTreeMap<Instant, HashSet<String>>) {
        while let Some(mut bucket) = index.first_entry() {
            let instant = *bucket.key();
            let candidate = bucket.get().iter().next().cloned();
            match candidate {
                Some(key) => {
                    bucket.get_mut().remove(&key);
                    if bucket.get().is_empty() {
                        bucket.remove();
                    }
                    if self
                        .store
                        .remove_if(&key, |_, e| e.expires_at == instant)
                        .is_some()
                    {
                        self.stats.write().eviction_count += 1;
                        return;
                    }
                    // stale index entry for an overwritten key; keep scanning
                }
                None => {
                    bucket.remove();
                }
            }
        }
    }
}
