//! Result cache - reuse a finished transformation for identical uploads.
//!
//! Entries are keyed by the SHA-256 of the uploaded bytes together with the
//! separator, so the same file grouped with two separators is two entries.
//! The cache lives in memory only and is bounded; once full, the least
//! recently used entry is evicted.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Content hash of (file bytes, separator).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(bytes: &[u8], separator: &str) -> Self {
        let mut hasher = Sha256::new();
        // Length prefix keeps (bytes, separator) pairs from colliding.
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
        hasher.update(separator.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

struct Entry<V> {
    value: Arc<V>,
    last_used: u64,
}

struct Inner<V> {
    entries: HashMap<CacheKey, Entry<V>>,
    clock: u64,
}

/// Bounded in-memory cache of shared results.
pub struct ResultCache<V> {
    capacity: usize,
    inner: Mutex<Inner<V>>,
}

impl<V> ResultCache<V> {
    /// A cache holding at most `capacity` entries. Zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity),
                clock: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an entry, marking it as recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<V>> {
        let mut inner = self.lock();
        inner.clock += 1;
        let now = inner.clock;
        inner.entries.get_mut(key).map(|entry| {
            entry.last_used = now;
            Arc::clone(&entry.value)
        })
    }

    /// Store a value and return the shared handle to it.
    pub fn insert(&self, key: CacheKey, value: V) -> Arc<V> {
        let value = Arc::new(value);
        if self.capacity == 0 {
            return value;
        }

        let mut inner = self.lock();
        inner.clock += 1;
        let now = inner.clock;
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
            }
        }
        inner.entries.insert(
            key,
            Entry {
                value: Arc::clone(&value),
                last_used: now,
            },
        );
        value
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        // A panic while holding the lock cannot leave entries half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_depends_on_separator() {
        let a = CacheKey::new(b"Type,Object Name", " OR ");
        let b = CacheKey::new(b"Type,Object Name", "; ");

        assert_ne!(a, b);
        assert_eq!(a, CacheKey::new(b"Type,Object Name", " OR "));
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_key_boundary_between_bytes_and_separator() {
        assert_ne!(CacheKey::new(b"ab", "c"), CacheKey::new(b"a", "bc"));
    }

    #[test]
    fn test_get_after_insert() {
        let cache = ResultCache::new(2);
        let key = CacheKey::new(b"x", ",");

        assert!(cache.get(&key).is_none());
        cache.insert(key.clone(), 7);
        assert_eq!(cache.get(&key).as_deref(), Some(&7));
    }

    #[test]
    fn test_least_recently_used_evicted() {
        let cache = ResultCache::new(2);
        let (a, b, c) = (
            CacheKey::new(b"a", ","),
            CacheKey::new(b"b", ","),
            CacheKey::new(b"c", ","),
        );

        cache.insert(a.clone(), "a");
        cache.insert(b.clone(), "b");
        cache.get(&a);
        cache.insert(c.clone(), "c");

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_none());
        assert!(cache.get(&c).is_some());
    }

    #[test]
    fn test_zero_capacity_disables() {
        let cache = ResultCache::new(0);
        let key = CacheKey::new(b"a", ",");

        let value = cache.insert(key.clone(), 1);
        assert_eq!(*value, 1);
        assert!(cache.is_empty());
        assert!(cache.get(&key).is_none());
    }
}
