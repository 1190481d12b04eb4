//! Keyed single-flight guard
//!
//! At most one guard per key exists at a time. The guard releases its key on
//! drop, so early returns and errors cannot leave a key stuck.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
pub struct InFlight<K> {
    active: Arc<Mutex<HashSet<K>>>,
}

impl<K> Default for InFlight<K> {
    fn default() -> Self {
        Self {
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> InFlight<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or `None` if it is already claimed
    pub fn try_acquire(&self, key: K) -> Option<InFlightGuard<K>> {
        if !lock(&self.active).insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            active: Arc::clone(&self.active),
            key,
        })
    }
}

#[derive(Debug)]
pub struct InFlightGuard<K: Eq + Hash> {
    active: Arc<Mutex<HashSet<K>>>,
    key: K,
}

impl<K: Eq + Hash> Drop for InFlightGuard<K> {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.key);
    }
}

// The set stays consistent even if a holder panicked
fn lock<K>(set: &Mutex<HashSet<K>>) -> MutexGuard<'_, HashSet<K>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused() {
        let flights = InFlight::new();
        let guard = flights.try_acquire("session-1".to_string());
        assert!(guard.is_some());
        assert!(flights.try_acquire("session-1".to_string()).is_none());
        assert!(flights.try_acquire("session-2".to_string()).is_some());
    }

    #[test]
    fn test_drop_releases_key() {
        let flights = InFlight::new();
        {
            let _guard = flights.try_acquire(7u64).unwrap();
            assert!(flights.try_acquire(7).is_none());
        }
        assert!(flights.try_acquire(7).is_some());
    }
}
