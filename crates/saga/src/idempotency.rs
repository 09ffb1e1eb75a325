//! Duplicate suppression for at-least-once delivery.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Bounded set of keys a stage has finished handling.
///
/// A redelivered record whose key is already in the ledger is acknowledged
/// without repeating its side effects. When full, the oldest key is
/// evicted first.
#[derive(Debug)]
pub struct ProcessedLedger {
    capacity: usize,
    inner: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    keys: HashSet<String>,
    order: VecDeque<String>,
}

impl ProcessedLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(LedgerState::default()),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        match self.inner.lock() {
            Ok(state) => state.keys.contains(key),
            Err(poisoned) => poisoned.into_inner().keys.contains(key),
        }
    }

    /// Records `key`. Returns false if it was already present.
    pub fn mark(&self, key: &str) -> bool {
        let mut state = match self.inner.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !state.keys.insert(key.to_string()) {
            return false;
        }
        state.order.push_back(key.to_string());
        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.keys.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(state) => state.keys.len(),
            Err(poisoned) => poisoned.into_inner().keys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounded map of results a stage produced but has not finished acting on.
///
/// A retried record reuses the stored result instead of recomputing it.
/// Entries are removed once handled; when full, the oldest entry is evicted
/// first, so results of records that were dead-lettered do not accumulate.
#[derive(Debug)]
pub struct PendingResults<V> {
    capacity: usize,
    inner: Mutex<PendingState<V>>,
}

#[derive(Debug)]
struct PendingState<V> {
    values: HashMap<String, V>,
    order: VecDeque<String>,
}

impl<V: Clone> PendingResults<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(PendingState {
                values: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PendingState<V>> {
        match self.inner.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.state().values.get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: V) {
        let mut state = self.state();
        if state.values.insert(key.to_string(), value).is_some() {
            return;
        }
        state.order.push_back(key.to_string());
        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.values.remove(&oldest);
            }
        }
    }

    pub fn remove(&self, key: &str) {
        let mut state = self.state();
        if state.values.remove(key).is_some() {
            state.order.retain(|k| k != key);
        }
    }

    pub fn len(&self) -> usize {
        self.state().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_is_reported_once() {
        let ledger = ProcessedLedger::new(10);
        assert!(ledger.mark("o-1"));
        assert!(!ledger.mark("o-1"));
        assert!(ledger.contains("o-1"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn oldest_key_is_evicted_at_capacity() {
        let ledger = ProcessedLedger::new(2);
        ledger.mark("a");
        ledger.mark("b");
        ledger.mark("c");

        assert!(!ledger.contains("a"));
        assert!(ledger.contains("b"));
        assert!(ledger.contains("c"));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn pending_results_are_bounded() {
        let pending = PendingResults::new(2);
        pending.insert("a", 1);
        pending.insert("b", 2);
        pending.insert("c", 3);

        assert_eq!(pending.get("a"), None);
        assert_eq!(pending.get("b"), Some(2));
        assert_eq!(pending.get("c"), Some(3));
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn removed_result_frees_its_slot() {
        let pending = PendingResults::new(2);
        pending.insert("a", 1);
        pending.insert("b", 2);
        pending.remove("a");
        pending.insert("c", 3);

        assert_eq!(pending.get("b"), Some(2));
        assert_eq!(pending.get("c"), Some(3));

        pending.insert("c", 4);
        assert_eq!(pending.get("c"), Some(4));
        assert_eq!(pending.len(), 2);
    }
}
