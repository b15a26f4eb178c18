//! A sharded, single-valued sibling of [`crate::TtlMultimap`]: `Key -> Value`
//! instead of `Key -> {Value}`. This is the by-id/by-name cache tier shape,
//! kept as a direct sharded map rather than folding it into the multimap
//! (which would mean modeling a single value as a one-element set, exactly
//! the kind of nested-container emulation the container is meant to avoid).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Slot<V> {
    value: V,
    expire_at: Instant,
}

type Shard<K, V> = Mutex<std::collections::HashMap<K, Slot<V>>>;

pub struct TtlCache<K, V> {
    shards: Vec<Shard<K, V>>,
}

const DEFAULT_SHARD_COUNT: usize = 16;

impl<K, V> Default for TtlCache<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new(DEFAULT_SHARD_COUNT)
    }
}

impl<K, V> TtlCache<K, V>
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

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Inserts or replaces the value for `k`, setting a fresh expiry.
    pub fn put(&self, k: K, v: V, ttl: Duration) {
        let shard = self.shard_for(&k);
        let mut map = shard.lock();
        map.insert(
            k,
            Slot {
                value: v,
                expire_at: Instant::now() + ttl,
            },
        );
    }

    /// Returns a clone of the cached value if present and not expired,
    /// lazily evicting it otherwise.
    pub fn get(&self, k: &K) -> Option<V> {
        let shard = self.shard_for(k);
        let mut map = shard.lock();
        let now = Instant::now();
        match map.get(k) {
            Some(slot) if now < slot.expire_at => Some(slot.value.clone()),
            Some(_) => {
                map.remove(k);
                None
            }
            None => None,
        }
    }

    /// Refreshes TTL on a live entry without touching its value. Returns
    /// whether an entry was found.
    pub fn touch(&self, k: &K, ttl: Duration) -> bool {
        let shard = self.shard_for(k);
        let mut map = shard.lock();
        let now = Instant::now();
        match map.get_mut(k) {
            Some(slot) if now < slot.expire_at => {
                slot.expire_at = now + ttl;
                true
            }
            Some(_) => {
                map.remove(k);
                false
            }
            None => false,
        }
    }

    pub fn invalidate(&self, k: &K) {
        let shard = self.shard_for(k);
        shard.lock().remove(k);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn put_then_get_round_trips() {
        let cache: TtlCache<&str, u32> = TtlCache::new(4);
        cache.put("a", 1, Duration::from_secs(60));
        assert_eq!(cache.get(&"a"), Some(1));
    }

    #[test]
    fn expired_entries_are_evicted_lazily() {
        let cache: TtlCache<&str, u32> = TtlCache::new(4);
        cache.put("a", 1, Duration::from_millis(5));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn invalidate_removes_entry_immediately() {
        let cache: TtlCache<&str, u32> = TtlCache::new(4);
        cache.put("a", 1, Duration::from_secs(60));
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
    }
}
