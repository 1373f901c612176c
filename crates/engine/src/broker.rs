//! Broker: the publisher/subscriber graph driving propagation.
//!
//! The broker stores keys only. Turning a key back into a concrete entity is
//! the job of the [`EntityRegistry`], which maps a kind tag to a loader over
//! the repositories.

use rustc_hash::{FxHashMap, FxHashSet};
use uuid::Uuid;

use crate::entity::Entity;
use crate::entity_id::{CellId, EntityKey, EntityKind, SheetId, SindexId};
use crate::error::{EngineError, Result};
use crate::repository::Repositories;
use crate::subscriptions::{MemorySubscriptionStore, SubscriptionStore};

pub struct Broker {
    store: Box<dyn SubscriptionStore>,
}

impl Broker {
    pub fn new(store: Box<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemorySubscriptionStore::new()))
    }

    /// Add an edge from every publisher to `subscriber`.
    ///
    /// Re-subscribing an existing pair is a no-op. Self-subscription and edges
    /// that would close a cycle are rejected before anything is written.
    pub fn subscribe(&mut self, publishers: &[EntityKey], subscriber: EntityKey) -> Result<()> {
        if publishers.contains(&subscriber) {
            return Err(EngineError::SelfSubscription(subscriber));
        }
        if let Some(publisher) = self.would_create_cycle(publishers, subscriber) {
            return Err(EngineError::CycleDetected { publisher, subscriber });
        }
        log::trace!("subscribe {} -> {:?}", subscriber, publishers);
        self.store.subscribe(publishers, subscriber);
        Ok(())
    }

    pub fn unsubscribe(&mut self, publishers: &[EntityKey], subscriber: EntityKey) {
        log::trace!("unsubscribe {} -> {:?}", subscriber, publishers);
        self.store.unsubscribe(publishers, subscriber);
    }

    /// Entities that react when `publisher` changes. Empty if none.
    pub fn get_subscribers(&self, publisher: EntityKey) -> FxHashSet<EntityKey> {
        self.store.subscribers(publisher)
    }

    /// Entities `subscriber` follows. Empty if none.
    pub fn get_publishers(&self, subscriber: EntityKey) -> FxHashSet<EntityKey> {
        self.store.publishers(subscriber)
    }

    pub fn edge_count(&self) -> usize {
        self.store.edge_count()
    }

    /// Panics if the underlying store is inconsistent.
    pub fn assert_consistent(&self) {
        self.store.assert_consistent();
    }

    /// Check if adding edges `publishers → subscriber` would create a cycle.
    ///
    /// A cycle appears if any publisher is already downstream of the
    /// subscriber. We walk subscriber edges from `subscriber` and report the
    /// first publisher reached.
    pub fn would_create_cycle(
        &self,
        publishers: &[EntityKey],
        subscriber: EntityKey,
    ) -> Option<EntityKey> {
        let targets: FxHashSet<EntityKey> = publishers.iter().copied().collect();
        let mut visited = FxHashSet::default();
        let mut stack = vec![subscriber];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for downstream in self.store.subscribers(current) {
                if targets.contains(&downstream) {
                    return Some(downstream);
                }
                stack.push(downstream);
            }
        }

        None
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Loads entities of one kind from bare ids.
pub type Loader = fn(&Repositories, &[Uuid]) -> Result<Vec<Entity>>;

fn load_sheets(repos: &Repositories, ids: &[Uuid]) -> Result<Vec<Entity>> {
    let ids: Vec<SheetId> = ids.iter().copied().map(SheetId::from_uuid).collect();
    Ok(repos.sheets.get_many_by_id(&ids)?.into_iter().map(Entity::from).collect())
}

fn load_sindexes(repos: &Repositories, ids: &[Uuid]) -> Result<Vec<Entity>> {
    let ids: Vec<SindexId> = ids.iter().copied().map(SindexId::from_uuid).collect();
    Ok(repos.sindexes.get_many_by_id(&ids)?.into_iter().map(Entity::from).collect())
}

fn load_cells(repos: &Repositories, ids: &[Uuid]) -> Result<Vec<Entity>> {
    let ids: Vec<CellId> = ids.iter().copied().map(CellId::from_uuid).collect();
    Ok(repos.cells.get_many_by_id(&ids)?.into_iter().map(Entity::from).collect())
}

/// Kind tag → loader.
///
/// Entities that no longer exist are silently absent from the result; a key
/// whose tag has no loader is a wiring error.
#[derive(Clone)]
pub struct EntityRegistry {
    loaders: FxHashMap<String, Loader>,
}

impl EntityRegistry {
    /// Registry with no loaders.
    pub fn empty() -> Self {
        Self { loaders: FxHashMap::default() }
    }

    pub fn register(&mut self, tag: &str, loader: Loader) {
        self.loaders.insert(tag.to_string(), loader);
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.loaders.contains_key(tag)
    }

    /// Materialize keys into entities, grouped by kind, in key order.
    pub fn load(
        &self,
        repos: &Repositories,
        keys: impl IntoIterator<Item = EntityKey>,
    ) -> Result<Vec<Entity>> {
        let mut keys: Vec<EntityKey> = keys.into_iter().collect();
        keys.sort();

        let mut by_kind: Vec<(EntityKind, Vec<Uuid>)> = Vec::new();
        for key in keys {
            match by_kind.last_mut() {
                Some((kind, ids)) if *kind == key.kind => ids.push(key.id),
                _ => by_kind.push((key.kind, vec![key.id])),
            }
        }

        let mut entities = Vec::new();
        for (kind, ids) in by_kind {
            let loader = self.loaders.get(kind.tag()).ok_or_else(|| {
                EngineError::Invariant(format!("no loader registered for kind '{kind}'"))
            })?;
            entities.extend(loader(repos, &ids)?);
        }
        Ok(entities)
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(EntityKind::Sheet.tag(), load_sheets);
        registry.register(EntityKind::Sindex.tag(), load_sindexes);
        registry.register(EntityKind::Cell.tag(), load_cells);
        registry
    }
}
