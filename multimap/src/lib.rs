//! A sharded, concurrent `Key -> {Value, ...}` map where each key's whole
//! value set carries a single expiration timestamp.
//!
//! This is the authorization kernel's workhorse: "which groups may use
//! cluster X", "which applications may group G install on cluster X", and
//! "which groups is user U a member of" are all answered here without a
//! database round trip, as long as the category hasn't expired.
//!
//! Expiration is lazy: nothing sweeps the map in the background. A lookup
//! that lands on an expired entry treats it as absent and drops it.

use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

mod cache;
pub use cache::TtlCache;

struct Category<V> {
    values: HashSet<V>,
    expire_at: Instant,
}

impl<V> Category<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expire_at
    }
}

/// A shard-local map from key to its value category.
type Shard<K, V> = Mutex<std::collections::HashMap<K, Category<V>>>;

pub struct TtlMultimap<K, V> {
    shards: Vec<Shard<K, V>>,
}

const DEFAULT_SHARD_COUNT: usize = 16;

impl<K, V> Default for TtlMultimap<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new(DEFAULT_SHARD_COUNT)
    }
}

impl<K, V> TtlMultimap<K, V>
where
    K: Hash + Eq,
{
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let mut shards = Vec::with_capacity(shard_count);
        shards.resize_with(shard_count, || Mutex::new(std::collections::HashMap::new()));
        Self { shards }
    }

    fn shard_for(&self, key: &K) -> &Shard<K, V> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }
}

impl<K, V> TtlMultimap<K, V>
where
    K: Hash + Eq + Clone,
    V: Hash + Eq + Clone,
{
    /// Inserts `v` under `k`. If the key is new or its category has expired,
    /// the category starts fresh with the given TTL. Returns whether `v` was
    /// newly present in the (possibly just-reset) value set.
    pub fn insert(&self, k: K, v: V, ttl: Duration) -> bool {
        let shard = self.shard_for(&k);
        let mut map = shard.lock();
        let now = Instant::now();
        let entry = map.entry(k).or_insert_with(|| Category {
            values: HashSet::new(),
            expire_at: now + ttl,
        });
        if entry.is_expired(now) {
            entry.values.clear();
            entry.expire_at = now + ttl;
        }
        entry.values.insert(v)
    }

    /// Ensures `v` is present under `k`, replacing any value that compares
    /// equal to it (useful when `V`'s `Eq` only covers part of its fields).
    pub fn insert_or_assign(&self, k: K, v: V, ttl: Duration) {
        let shard = self.shard_for(&k);
        let mut map = shard.lock();
        let now = Instant::now();
        let entry = map.entry(k).or_insert_with(|| Category {
            values: HashSet::new(),
            expire_at: now + ttl,
        });
        if entry.is_expired(now) {
            entry.values.clear();
            entry.expire_at = now + ttl;
        }
        entry.values.replace(v);
    }

    /// Removes the whole key and its value set. Returns the number of values
    /// that were removed (0 if the key was absent or already expired).
    pub fn erase(&self, k: &K) -> usize {
        let shard = self.shard_for(k);
        let mut map = shard.lock();
        match map.remove(k) {
            Some(cat) if !cat.is_expired(Instant::now()) => cat.values.len(),
            _ => 0,
        }
    }

    /// Removes one `(k, v)` pair. If the value set becomes empty, the key is
    /// dropped entirely. Returns whether anything was removed.
    pub fn erase_value(&self, k: &K, v: &V) -> bool {
        let shard = self.shard_for(k);
        let mut map = shard.lock();
        let now = Instant::now();
        let Some(entry) = map.get_mut(k) else {
            return false;
        };
        if entry.is_expired(now) {
            map.remove(k);
            return false;
        }
        let removed = entry.values.remove(v);
        if entry.values.is_empty() {
            map.remove(k);
        }
        removed
    }

    pub fn contains_key(&self, k: &K) -> bool {
        self.with_live_entry(k, |_| true).unwrap_or(false)
    }

    pub fn contains(&self, k: &K, v: &V) -> bool {
        self.with_live_entry(k, |entry| entry.values.contains(v))
            .unwrap_or(false)
    }

    /// Size of the value set under `k` (0 if absent or expired).
    pub fn count(&self, k: &K) -> usize {
        self.with_live_entry(k, |entry| entry.values.len())
            .unwrap_or(0)
    }

    /// Snapshot of the value set under `k`.
    pub fn find(&self, k: &K) -> Vec<V> {
        self.with_live_entry(k, |entry| entry.values.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Refreshes the TTL of the key's whole category. Returns whether the key
    /// existed (and was not already expired).
    pub fn update_expiration(&self, k: &K, ttl: Duration) -> bool {
        let shard = self.shard_for(k);
        let mut map = shard.lock();
        let now = Instant::now();
        match map.get_mut(k) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expire_at = now + ttl;
                true
            }
            Some(_) => {
                map.remove(k);
                false
            }
            None => false,
        }
    }

    /// Runs `f` against the live (non-expired) entry for `k`, lazily evicting
    /// it first if it has expired.
    fn with_live_entry<R>(&self, k: &K, f: impl FnOnce(&Category<V>) -> R) -> Option<R> {
        let shard = self.shard_for(k);
        let mut map = shard.lock();
        let now = Instant::now();
        match map.get(k) {
            Some(entry) if entry.is_expired(now) => {
                map.remove(k);
                None
            }
            Some(entry) => Some(f(entry)),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn insert_dedupes_and_reports_newly_inserted() {
        let map: TtlMultimap<&str, &str> = TtlMultimap::new(4);
        assert!(map.insert("cluster-1", "group-a", Duration::from_secs(60)));
        assert!(!map.insert("cluster-1", "group-a", Duration::from_secs(60)));
        assert!(map.insert("cluster-1", "group-b", Duration::from_secs(60)));
        assert_eq!(map.count(&"cluster-1"), 2);
    }

    #[test]
    fn erase_value_drops_key_when_empty() {
        let map: TtlMultimap<&str, &str> = TtlMultimap::new(4);
        map.insert("cluster-1", "group-a", Duration::from_secs(60));
        assert!(map.erase_value(&"cluster-1", &"group-a"));
        assert!(!map.contains_key(&"cluster-1"));
    }

    #[test]
    fn expired_category_is_treated_as_absent() {
        let map: TtlMultimap<&str, &str> = TtlMultimap::new(4);
        map.insert("cluster-1", "group-a", Duration::from_millis(5));
        thread::sleep(Duration::from_millis(20));
        assert!(!map.contains(&"cluster-1", &"group-a"));
        assert_eq!(map.count(&"cluster-1"), 0);
    }

    #[test]
    fn update_expiration_refreshes_whole_category() {
        let map: TtlMultimap<&str, &str> = TtlMultimap::new(4);
        map.insert("cluster-1", "group-a", Duration::from_millis(20));
        map.insert("cluster-1", "group-b", Duration::from_millis(20));
        thread::sleep(Duration::from_millis(10));
        assert!(map.update_expiration(&"cluster-1", Duration::from_secs(60)));
        thread::sleep(Duration::from_millis(15));
        // Both values are still live: TTL is per-category, not per-value.
        assert!(map.contains(&"cluster-1", &"group-a"));
        assert!(map.contains(&"cluster-1", &"group-b"));
    }

    #[test]
    fn insert_or_assign_is_idempotent() {
        let map: TtlMultimap<&str, &str> = TtlMultimap::new(4);
        map.insert_or_assign("cluster-1", "group-a", Duration::from_secs(60));
        map.insert_or_assign("cluster-1", "group-a", Duration::from_secs(60));
        assert_eq!(map.count(&"cluster-1"), 1);
    }

    #[test]
    fn erase_removes_whole_key() {
        let map: TtlMultimap<&str, &str> = TtlMultimap::new(4);
        map.insert("cluster-1", "group-a", Duration::from_secs(60));
        map.insert("cluster-1", "group-b", Duration::from_secs(60));
        assert_eq!(map.erase(&"cluster-1"), 2);
        assert_eq!(map.erase(&"cluster-1"), 0);
    }
}
