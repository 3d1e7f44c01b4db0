//! Symbol-keyed state with last-access expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A stored value together with its bookkeeping timestamps.
#[derive(Debug, Clone)]
pub struct Expiring<V> {
    /// The stored value.
    pub value: V,
    /// When the entry was first inserted.
    pub created_at: Instant,
    /// Refreshed on every read.
    pub last_accessed: Instant,
}

impl<V> Expiring<V> {
    fn new(value: V) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            last_accessed: now,
        }
    }
}

/// Generic symbol-keyed store with optional last-access expiry.
///
/// Keys are case-insensitive by default (stored uppercased). Reads refresh
/// the entry's `last_accessed` stamp; when an expiration is configured, an
/// entry whose last access is older than the expiration is evicted by the
/// read that finds it, by [`remove_expired`](Self::remove_expired), or by the
/// interval task from [`spawn_evictor`](Self::spawn_evictor).
#[derive(Debug)]
pub struct ExpiringStateStore<V> {
    inner: Mutex<HashMap<String, Expiring<V>>>,
    expiration: Option<Duration>,
    case_insensitive: bool,
}

impl<V> Default for ExpiringStateStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ExpiringStateStore<V> {
    /// Case-insensitive store with no expiry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            expiration: None,
            case_insensitive: true,
        }
    }

    /// Store evicting entries whose last access is older than `expiration`.
    #[must_use]
    pub fn with_expiration(expiration: Duration) -> Self {
        Self {
            expiration: Some(expiration),
            ..Self::new()
        }
    }

    /// Switch to exact (case-sensitive) key matching.
    #[must_use]
    pub fn case_sensitive(mut self) -> Self {
        self.case_insensitive = false;
        self
    }

    fn key(&self, raw: &str) -> String {
        if self.case_insensitive {
            raw.to_uppercase()
        } else {
            raw.to_string()
        }
    }

    fn expired(&self, entry: &Expiring<V>, now: Instant) -> bool {
        self.expiration
            .is_some_and(|ttl| now.duration_since(entry.last_accessed) > ttl)
    }

    /// Number of live entries.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("mutex poisoned").len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry whose last access is older than the expiration.
    /// Returns the number of evicted entries.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("mutex poisoned");
        let before = inner.len();
        inner.retain(|_, entry| !self.expired(entry, now));
        before - inner.len()
    }

    /// Remove every entry matching the predicate. Returns the number removed.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn remove_stale(&self, mut predicate: impl FnMut(&str, &V) -> bool) -> usize {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        let before = inner.len();
        inner.retain(|key, entry| !predicate(key, &entry.value));
        before - inner.len()
    }

    /// Spawn a task that calls [`remove_expired`](Self::remove_expired) every
    /// `interval`. The task exits once the store is dropped; abort the handle
    /// to stop it earlier.
    pub fn spawn_evictor(store: &Arc<Self>, interval: Duration) -> JoinHandle<()>
    where
        V: Send + 'static,
    {
        let weak: Weak<Self> = Arc::downgrade(store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else { break };
                let evicted = store.remove_expired();
                if evicted > 0 {
                    tracing::debug!(evicted, "evicted expired symbol state");
                }
            }
        })
    }
}

impl<V: Clone> ExpiringStateStore<V> {
    /// Fetch the value for `key`, inserting `make()` if absent or expired.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn get_or_add(&self, key: &str, make: impl FnOnce() -> V) -> V {
        let key = self.key(key);
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("mutex poisoned");
        match inner.get_mut(&key) {
            Some(entry) if !self.expired(entry, now) => {
                entry.last_accessed = now;
                entry.value.clone()
            }
            _ => {
                let entry = Expiring::new(make());
                let value = entry.value.clone();
                inner.insert(key, entry);
                value
            }
        }
    }

    /// Fetch the value for `key` if present and unexpired, refreshing its
    /// last-access stamp. An expired entry is evicted and reads as absent.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn try_get(&self, key: &str) -> Option<V> {
        let key = self.key(key);
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("mutex poisoned");
        match inner.get_mut(&key) {
            Some(entry) if self.expired(entry, now) => {
                inner.remove(&key);
                None
            }
            Some(entry) => {
                entry.last_accessed = now;
                Some(entry.value.clone())
            }
            None => None,
        }
    }

    /// Insert or overwrite the value for `key`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn set(&self, key: &str, value: V) {
        let key = self.key(key);
        let mut inner = self.inner.lock().expect("mutex poisoned");
        inner.insert(key, Expiring::new(value));
    }

    /// Insert `value` if absent, otherwise mutate the existing entry in
    /// place. Returns the resulting value.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn add_or_update(&self, key: &str, value: V, update: impl FnOnce(&mut V)) -> V {
        let key = self.key(key);
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("mutex poisoned");
        match inner.get_mut(&key) {
            Some(entry) if !self.expired(entry, now) => {
                entry.last_accessed = now;
                update(&mut entry.value);
                entry.value.clone()
            }
            _ => {
                inner.insert(key.clone(), Expiring::new(value.clone()));
                value
            }
        }
    }

    /// Remove and return the value for `key`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn remove(&self, key: &str) -> Option<V> {
        let key = self.key(key);
        let mut inner = self.inner.lock().expect("mutex poisoned");
        inner.remove(&key).map(|entry| entry.value)
    }

    /// Whether `key` is present and unexpired. Does not refresh the entry.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let key = self.key(key);
        let now = Instant::now();
        let inner = self.inner.lock().expect("mutex poisoned");
        inner.get(&key).is_some_and(|entry| !self.expired(entry, now))
    }

    /// Copy of every live `(key, value)` pair.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, V)> {
        let now = Instant::now();
        let inner = self.inner.lock().expect("mutex poisoned");
        inner
            .iter()
            .filter(|(_, entry)| !self.expired(entry, now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Visit every live entry under the store lock. Keep the closure short.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn for_each(&self, mut visit: impl FnMut(&str, &V)) {
        let now = Instant::now();
        let inner = self.inner.lock().expect("mutex poisoned");
        for (key, entry) in inner.iter() {
            if !self.expired(entry, now) {
                visit(key, &entry.value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_fold_case_by_default() {
        let store = ExpiringStateStore::new();
        store.set("aapl", 1u32);
        assert_eq!(store.try_get("AAPL"), Some(1));
        assert!(store.contains("Aapl"));
    }

    #[test]
    fn case_sensitive_opt_out() {
        let store = ExpiringStateStore::new().case_sensitive();
        store.set("aapl", 1u32);
        assert_eq!(store.try_get("AAPL"), None);
    }

    #[test]
    fn add_or_update_mutates_existing() {
        let store = ExpiringStateStore::new();
        assert_eq!(store.add_or_update("AAPL", 1u32, |v| *v += 1), 1);
        assert_eq!(store.add_or_update("AAPL", 1u32, |v| *v += 1), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn read_evicts_expired_entries() {
        let store = ExpiringStateStore::with_expiration(Duration::from_secs(60));
        store.set("AAPL", 7u32);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.try_get("AAPL"), Some(7));

        // The read above refreshed the stamp; let it go fully stale now.
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.try_get("AAPL"), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn evictor_task_sweeps() {
        let store = Arc::new(ExpiringStateStore::with_expiration(Duration::from_secs(10)));
        store.set("AAPL", 1u32);
        store.set("MSFT", 2u32);

        let handle = ExpiringStateStore::spawn_evictor(&store, Duration::from_secs(30));
        tokio::time::advance(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;

        assert!(store.is_empty());
        handle.abort();
    }

    #[test]
    fn remove_stale_uses_predicate() {
        let store = ExpiringStateStore::new();
        store.set("AAPL", 1u32);
        store.set("MSFT", 9u32);
        let removed = store.remove_stale(|_, v| *v > 5);
        assert_eq!(removed, 1);
        assert!(store.contains("AAPL"));
        assert!(!store.contains("MSFT"));
    }
}
