//! Thread-safe subscription bookkeeping.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use nastro_types::{Subscription, SubscriptionKind};

/// Owns the `(symbol, kind)` subscription mapping for one streaming client.
///
/// Ids are process-unique and monotonically allocated from a per-provider
/// starting range. A symbol may be subscribed under multiple kinds at once;
/// each `(kind, symbol)` pair is reference-counted so removing one
/// subscription only removes the symbol from the kind's set when no other
/// live subscription references it.
///
/// All operations take a single internal lock; they are O(k) in the number of
/// subscriptions of the touched kind.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    next_id: u64,
    by_id: HashMap<u64, Subscription>,
    // kind -> symbol -> live subscription count
    by_kind: HashMap<SubscriptionKind, HashMap<String, u32>>,
}

impl SubscriptionRegistry {
    /// Create a registry allocating ids from `base_id` upward.
    #[must_use]
    pub fn new(base_id: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: base_id,
                by_id: HashMap::new(),
                by_kind: HashMap::new(),
            }),
        }
    }

    /// Allocate a subscription for `(symbol, kind)`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn add(
        &self,
        symbol: impl Into<String>,
        kind: SubscriptionKind,
        created_at: DateTime<Utc>,
    ) -> Subscription {
        let symbol = symbol.into();
        let mut inner = self.inner.lock().expect("mutex poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        let sub = Subscription {
            id,
            symbol: symbol.clone(),
            kind,
            created_at,
        };
        inner.by_id.insert(id, sub.clone());
        *inner
            .by_kind
            .entry(kind)
            .or_default()
            .entry(symbol)
            .or_insert(0) += 1;
        sub
    }

    /// Release a subscription by id. Returns the released record, or `None`
    /// if the id was unknown.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn remove(&self, id: u64) -> Option<Subscription> {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        let sub = inner.by_id.remove(&id)?;
        let prune_kind = match inner.by_kind.get_mut(&sub.kind) {
            Some(symbols) => {
                if let Some(count) = symbols.get_mut(&sub.symbol) {
                    *count -= 1;
                    if *count == 0 {
                        symbols.remove(&sub.symbol);
                    }
                }
                symbols.is_empty()
            }
            None => false,
        };
        if prune_kind {
            inner.by_kind.remove(&sub.kind);
        }
        Some(sub)
    }

    /// Symbols with at least one live subscription of `kind`, sorted.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn symbols_by_kind(&self, kind: SubscriptionKind) -> Vec<String> {
        let inner = self.inner.lock().expect("mutex poisoned");
        let mut symbols: Vec<String> = inner
            .by_kind
            .get(&kind)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        symbols.sort_unstable();
        symbols
    }

    /// Symbols with at least one live subscription of any kind, sorted and
    /// deduplicated.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn all_symbols(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("mutex poisoned");
        let mut symbols: Vec<String> = inner
            .by_kind
            .values()
            .flat_map(|m| m.keys().cloned())
            .collect();
        symbols.sort_unstable();
        symbols.dedup();
        symbols
    }

    /// Ids of every live subscription for `symbol`, across kinds, ascending.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn ids_for_symbol(&self, symbol: &str) -> Vec<u64> {
        let inner = self.inner.lock().expect("mutex poisoned");
        let mut ids: Vec<u64> = inner
            .by_id
            .values()
            .filter(|s| s.symbol == symbol)
            .map(|s| s.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Whether `(kind, symbol)` has at least one live subscription.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn contains(&self, kind: SubscriptionKind, symbol: &str) -> bool {
        let inner = self.inner.lock().expect("mutex poisoned");
        inner
            .by_kind
            .get(&kind)
            .is_some_and(|m| m.contains_key(symbol))
    }

    /// All live subscriptions, in id order.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Subscription> {
        let inner = self.inner.lock().expect("mutex poisoned");
        let mut subs: Vec<Subscription> = inner.by_id.values().cloned().collect();
        subs.sort_unstable_by_key(|s| s.id);
        subs
    }

    /// Number of live subscriptions.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("mutex poisoned").by_id.len()
    }

    /// Whether no subscriptions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every subscription.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        inner.by_id.clear();
        inner.by_kind.clear();
    }
}
