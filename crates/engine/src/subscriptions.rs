//! Publisher/subscriber association store.
//!
//! # Edge Direction
//!
//! ```text
//! P → S  means  "S subscribes to P"  (P is a publisher of S)
//! ```
//!
//! "Who has to react when P changes?" is a lookup of P's outgoing edges.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::entity_id::EntityKey;

/// Persisted many-to-many relation between publisher and subscriber keys.
///
/// Implementations enforce pair uniqueness: subscribing an existing pair is a
/// no-op. Lookups never fail; an unknown key simply has no edges.
pub trait SubscriptionStore {
    fn subscribe(&mut self, publishers: &[EntityKey], subscriber: EntityKey);

    fn unsubscribe(&mut self, publishers: &[EntityKey], subscriber: EntityKey);

    fn subscribers(&self, publisher: EntityKey) -> FxHashSet<EntityKey>;

    fn publishers(&self, subscriber: EntityKey) -> FxHashSet<EntityKey>;

    /// Total number of (publisher, subscriber) pairs.
    fn edge_count(&self) -> usize;

    /// Check store invariants. Panics if any are violated.
    fn assert_consistent(&self) {}
}

/// In-memory subscription store.
///
/// Maintains bidirectional adjacency for O(1) lookups:
/// - `subs[P]` = entities that subscribe to P
/// - `pubs[S]` = entities S subscribes to
///
/// # Invariants
///
/// 1. **Bidirectional consistency:** If P ∈ pubs[S] then S ∈ subs[P], and vice versa.
/// 2. **No dangling entries:** Empty sets are removed, not stored.
/// 3. **No duplicate edges:** Set semantics enforced by FxHashSet.
#[derive(Default, Debug, Clone)]
pub struct MemorySubscriptionStore {
    subs: FxHashMap<EntityKey, FxHashSet<EntityKey>>,
    pubs: FxHashMap<EntityKey, FxHashSet<EntityKey>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entities that have at least one subscriber.
    pub fn publisher_count(&self) -> usize {
        self.subs.len()
    }

    /// Returns the number of entities that follow at least one publisher.
    pub fn subscriber_count(&self) -> usize {
        self.pubs.len()
    }
}

impl SubscriptionStore for MemorySubscriptionStore {
    fn subscribe(&mut self, publishers: &[EntityKey], subscriber: EntityKey) {
        for publisher in publishers {
            self.subs.entry(*publisher).or_default().insert(subscriber);
            self.pubs.entry(subscriber).or_default().insert(*publisher);
        }
    }

    fn unsubscribe(&mut self, publishers: &[EntityKey], subscriber: EntityKey) {
        for publisher in publishers {
            if let Some(subscribers) = self.subs.get_mut(publisher) {
                subscribers.remove(&subscriber);
                if subscribers.is_empty() {
                    self.subs.remove(publisher);
                }
            }
            if let Some(pubs) = self.pubs.get_mut(&subscriber) {
                pubs.remove(publisher);
                if pubs.is_empty() {
                    self.pubs.remove(&subscriber);
                }
            }
        }
    }

    fn subscribers(&self, publisher: EntityKey) -> FxHashSet<EntityKey> {
        self.subs.get(&publisher).cloned().unwrap_or_default()
    }

    fn publishers(&self, subscriber: EntityKey) -> FxHashSet<EntityKey> {
        self.pubs.get(&subscriber).cloned().unwrap_or_default()
    }

    fn edge_count(&self) -> usize {
        self.subs.values().map(FxHashSet::len).sum()
    }

    fn assert_consistent(&self) {
        // Invariant 1: Bidirectional consistency (subs → pubs)
        for (publisher, subscribers) in &self.subs {
            for subscriber in subscribers {
                assert!(
                    self.pubs.get(subscriber).is_some_and(|p| p.contains(publisher)),
                    "Missing pub edge: {:?} should have {:?} in publishers",
                    subscriber,
                    publisher
                );
            }
        }

        // Invariant 1: Bidirectional consistency (pubs → subs)
        for (subscriber, publishers) in &self.pubs {
            for publisher in publishers {
                assert!(
                    self.subs.get(publisher).is_some_and(|s| s.contains(subscriber)),
                    "Missing sub edge: {:?} should have {:?} in subscribers",
                    publisher,
                    subscriber
                );
            }
        }

        // Invariant 2: No empty sets stored
        for (key, set) in self.subs.iter().chain(self.pubs.iter()) {
            assert!(!set.is_empty(), "Empty edge set stored for {:?}", key);
        }
    }
}
