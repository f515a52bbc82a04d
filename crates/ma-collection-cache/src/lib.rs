//! Process-wide cache for compiled collection paths.
//!
//! Two tiers: every compiled value that is still referenced anywhere is
//! reachable through a weak map, and the most recently used ones are kept
//! alive by a bounded LRU. A value evicted from the LRU survives as long as
//! some caller still holds it, and is found again through the weak tier.

use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};

use lru::LruCache;
use parking_lot::{Mutex, RwLock};

pub struct CompiledCache<K: Hash + Eq, V> {
    weak: RwLock<HashMap<K, Weak<V>>>,
    strong: Mutex<LruCache<K, Arc<V>>>,
}

impl<K: Hash + Eq + Clone, V> CompiledCache<K, V> {
    /// `capacity` bounds the strong tier only.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            weak: RwLock::new(HashMap::new()),
            strong: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let hit = self.weak.read().get(key).and_then(Weak::upgrade)?;
        self.promote(key, &hit);
        Some(hit)
    }

    /// Returns the cached value for `key`, compiling and publishing it on a
    /// miss. Concurrent misses on one key compile once. Compile errors are
    /// returned as is and leave nothing behind.
    pub fn get_or_compile<E>(
        &self,
        key: K,
        compile: impl FnOnce(&K) -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        if let Some(hit) = self.get(&key) {
            tracing::trace!("compiled cache hit");
            return Ok(hit);
        }

        let mut weak = self.weak.write();
        if let Some(hit) = weak.get(&key).and_then(Weak::upgrade) {
            drop(weak);
            self.promote(&key, &hit);
            return Ok(hit);
        }

        let value = Arc::new(compile(&key)?);
        weak.retain(|_, w| w.strong_count() > 0);
        weak.insert(key.clone(), Arc::downgrade(&value));
        let live = weak.len();
        drop(weak);

        self.strong.lock().put(key, Arc::clone(&value));
        tracing::debug!(live, "compiled cache miss; value published");
        Ok(value)
    }

    /// Entries kept alive by the LRU tier.
    pub fn len_strong(&self) -> usize {
        self.strong.lock().len()
    }

    /// Entries still reachable, whether or not the LRU holds them.
    pub fn len_weak(&self) -> usize {
        self.weak
            .read()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn clear(&self) {
        let mut weak = self.weak.write();
        weak.clear();
        self.strong.lock().clear();
    }

    fn promote(&self, key: &K, value: &Arc<V>) {
        let mut strong = self.strong.lock();
        if strong.get(key).is_none() {
            strong.put(key.clone(), Arc::clone(value));
        }
    }
}
