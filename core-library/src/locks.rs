//! Per-key critical sections
//!
//! The store has no transactions, so every check-then-act sequence over shared
//! state (a relationship pair, a playlist's membership rows and aggregate) runs
//! while holding an in-process lock for that key. Locks are created on first
//! use and evicted when the last holder or waiter goes away, so the table only
//! ever contains keys with an operation in flight.
//!
//! The table serializes callers within one process only. Two processes
//! toggling the same pair can still race; a store-side uniqueness constraint
//! is the only remedy for that.

use bridge_traits::store::RecordId;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Key of a critical section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// One relationship instance in a join collection.
    Pair {
        collection: &'static str,
        left: String,
        right: String,
    },
    /// Everything derived from one owning record (its join rows and aggregates).
    Owner {
        collection: &'static str,
        id: RecordId,
    },
}

impl LockKey {
    pub fn pair(collection: &'static str, left: impl ToString, right: impl ToString) -> Self {
        Self::Pair {
            collection,
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    pub fn owner(collection: &'static str, id: RecordId) -> Self {
        Self::Owner { collection, id }
    }
}

/// A lock and the number of callers holding or awaiting it.
struct Slot {
    mutex: Arc<Mutex<()>>,
    users: usize,
}

type LockTable<K> = HashMap<K, Slot>;

/// Lazily populated table of async mutexes keyed by `K`.
///
/// Cloning is cheap and clones share the same table.
pub struct KeyedLocks<K = LockKey> {
    table: Arc<StdMutex<LockTable<K>>>,
}

impl<K> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            table: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Wait for exclusive access to `key`.
    ///
    /// The returned guard releases the lock when dropped. A caller that is
    /// cancelled while waiting gives up its place in the table as well.
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let lease = Lease::acquire(&self.table, key);
        let guard = Arc::clone(&lease.mutex).lock_owned().await;

        KeyedGuard {
            _guard: guard,
            _lease: lease,
        }
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        lock_table(&self.table).len()
    }
}

fn lock_table<K>(table: &StdMutex<LockTable<K>>) -> MutexGuard<'_, LockTable<K>> {
    // The table is only mutated by short, non-panicking sections
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One caller's claim on a table entry, from the start of the wait until the
/// guard is released. The entry is evicted when the last claim goes away.
struct Lease<K: Eq + Hash> {
    key: K,
    mutex: Arc<Mutex<()>>,
    table: Arc<StdMutex<LockTable<K>>>,
}

impl<K: Eq + Hash + Clone> Lease<K> {
    fn acquire(table: &Arc<StdMutex<LockTable<K>>>, key: K) -> Self {
        let mutex = {
            let mut entries = lock_table(table);
            let slot = entries.entry(key.clone()).or_insert_with(|| Slot {
                mutex: Arc::new(Mutex::new(())),
                users: 0,
            });
            slot.users += 1;
            Arc::clone(&slot.mutex)
        };

        Self {
            key,
            mutex,
            table: Arc::clone(table),
        }
    }
}

impl<K: Eq + Hash> Drop for Lease<K> {
    fn drop(&mut self) {
        let mut entries = lock_table(&self.table);
        let Some(slot) = entries.get_mut(&self.key) else {
            return;
        };
        if !Arc::ptr_eq(&slot.mutex, &self.mutex) {
            return;
        }

        slot.users = slot.users.saturating_sub(1);
        if slot.users == 0 {
            entries.remove(&self.key);
            trace!("Evicted idle lock entry");
        }
    }
}

/// Exclusive access to one key. Dropping it releases the key.
///
/// Fields drop in order: the mutex is unlocked before the lease gives up the
/// table entry.
pub struct KeyedGuard<K: Eq + Hash> {
    _guard: OwnedMutexGuard<()>,
    _lease: Lease<K>,
}
