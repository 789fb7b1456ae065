//! Thread-safe registries of live connections and transactions.
//!
//! A registry is a map behind one `RwLock`. Disposal drains the map and leaves the
//! registry closed, so an insert that races with disposal is either drained or
//! rejected, never silently kept.

use crate::db::connection::{SubscriptionId, WeakConnection};
use crate::db::transaction::Transaction;
use crate::error::{SqlError, SqlResult};
use crate::models::{ConnectionId, TransactionId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;

/// Generic keyed registry that can be closed for further inserts.
pub struct Registry<K, V> {
    entries: RwLock<Option<HashMap<K, V>>>,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Copy,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Some(HashMap::new())),
        }
    }

    /// Insert an entry. Fails once the registry has been disposed.
    pub fn add(&self, key: K, value: V) -> SqlResult<()> {
        match self.entries.write().as_mut() {
            Some(entries) => {
                entries.insert(key, value);
                Ok(())
            }
            None => Err(SqlError::disposed("register a new entry")),
        }
    }

    /// Remove an entry, returning it if it was present.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.write().as_mut().and_then(|e| e.remove(key))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries
            .read()
            .as_ref()
            .is_some_and(|e| e.contains_key(key))
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.read().as_ref().and_then(|e| e.get(key).cloned())
    }

    pub fn len(&self) -> usize {
        self.entries.read().as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy of the entries.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.entries
            .read()
            .as_ref()
            .map(|e| e.iter().map(|(k, v)| (*k, v.clone())).collect())
            .unwrap_or_default()
    }

    /// Drain every entry and close the registry for further inserts.
    ///
    /// Returns an empty list when already disposed.
    pub fn dispose(&self) -> Vec<(K, V)> {
        self.entries
            .write()
            .take()
            .map(|e| e.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn is_disposed(&self) -> bool {
        self.entries.read().is_none()
    }
}

impl<K, V> Default for Registry<K, V>
where
    K: Eq + Hash + Copy,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A connection as tracked by the connection registry.
///
/// The registry holds only a weak reference; the caller owns the handle.
#[derive(Clone)]
pub struct TrackedConnection {
    pub handle: WeakConnection,
    pub subscription: SubscriptionId,
}

/// Registry of connections created by a `Sql` instance and not yet closed or broken.
pub type ConnectionRegistry = Registry<ConnectionId, TrackedConnection>;

/// Registry of transactions begun by a `Sql` instance and not yet ended.
pub type TransactionRegistry = Registry<TransactionId, Transaction>;
