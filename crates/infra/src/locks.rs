//! Keyed async locks.
//!
//! One `tokio::sync::Mutex` per key, created on first use. Multi-key
//! acquisition always takes keys in ascending order, so two callers locking
//! overlapping key sets cannot deadlock.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Idle slots are pruned once the registry grows past this many keys.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

/// Guards for a set of keys, released together on drop.
#[derive(Debug)]
pub struct LockSet<K> {
    keys: BTreeSet<K>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Clone + Ord + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a single key.
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        self.slot(key).lock_owned().await
    }

    /// Lock every key in `keys` (duplicates allowed), in ascending key order.
    pub async fn lock_all<'k, I>(&self, keys: I) -> LockSet<K>
    where
        I: IntoIterator<Item = &'k K>,
        K: 'k,
    {
        let keys: BTreeSet<K> = keys.into_iter().cloned().collect();
        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.slot(key).lock_owned().await);
        }
        LockSet {
            keys,
            _guards: guards,
        }
    }

    fn slot(&self, key: &K) -> Arc<AsyncMutex<()>> {
        // The map holds no invariant a panic could break; keep using it.
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }
        if slots.len() >= PRUNE_THRESHOLD {
            // Strong count 1 means no holder and no waiter.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        }
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<K: Ord> LockSet<K> {
    pub fn covers(&self, key: &K) -> bool {
        self.keys.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.keys.iter()
    }
}
