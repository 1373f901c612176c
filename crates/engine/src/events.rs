//! Change events and the work queue the bus drains.
//!
//! Events carry full entity snapshots, never deltas. The `old` side of an
//! update is cloned at the moment of the transition, before the entity is
//! mutated, so handlers can diff against it.

use std::collections::VecDeque;
use std::fmt;

use crate::entity::Entity;
use crate::entity_id::{EntityKey, EntityKind};

/// Unique id of an event within a queue's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Updated,
    Deleted,
}

/// Dispatch key: transition × entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKind {
    pub transition: Transition,
    pub entity: EntityKind,
}

impl EventKind {
    pub const fn updated(entity: EntityKind) -> Self {
        Self { transition: Transition::Updated, entity }
    }

    pub const fn deleted(entity: EntityKind) -> Self {
        Self { transition: Transition::Deleted, entity }
    }

    pub const CELL_UPDATED: EventKind = EventKind::updated(EntityKind::Cell);
    pub const CELL_DELETED: EventKind = EventKind::deleted(EntityKind::Cell);
    pub const SINDEX_UPDATED: EventKind = EventKind::updated(EntityKind::Sindex);
    pub const SINDEX_DELETED: EventKind = EventKind::deleted(EntityKind::Sindex);
    pub const SHEET_UPDATED: EventKind = EventKind::updated(EntityKind::Sheet);
    pub const SHEET_DELETED: EventKind = EventKind::deleted(EntityKind::Sheet);
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transition = match self.transition {
            Transition::Updated => "updated",
            Transition::Deleted => "deleted",
        };
        write!(f, "{}.{}", self.entity, transition)
    }
}

/// Immutable record of a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Updated { id: EventId, old: Entity, new: Entity },
    Deleted { id: EventId, entity: Entity },
}

impl Event {
    pub fn id(&self) -> EventId {
        match self {
            Event::Updated { id, .. } | Event::Deleted { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Updated { new, .. } => EventKind::updated(new.kind()),
            Event::Deleted { entity, .. } => EventKind::deleted(entity.kind()),
        }
    }

    /// Key of the entity the event is about.
    pub fn subject(&self) -> EntityKey {
        match self {
            Event::Updated { new, .. } => new.key(),
            Event::Deleted { entity, .. } => entity.key(),
        }
    }
}

/// FIFO work queue of events.
///
/// The queue is the only place events are built, so ids stay unique for its
/// lifetime.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<Event>,
    next_id: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Append a raw event. Used to replay an event with its original id.
    pub fn append(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Build and append an `Updated` event. Returns its id.
    pub fn updated(&mut self, old: impl Into<Entity>, new: impl Into<Entity>) -> EventId {
        let id = self.allocate_id();
        self.events.push_back(Event::Updated {
            id,
            old: old.into(),
            new: new.into(),
        });
        id
    }

    /// Build and append a `Deleted` event. Returns its id.
    pub fn deleted(&mut self, entity: impl Into<Entity>) -> EventId {
        let id = self.allocate_id();
        self.events.push_back(Event::Deleted { id, entity: entity.into() });
        id
    }

    pub fn pop_front(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Drop every pending event (after a failed run).
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// Simple event collector for testing.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<Event>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Filter to events of one kind.
    pub fn of_kind(&self, kind: EventKind) -> Vec<&Event> {
        self.events.iter().filter(|e| e.kind() == kind).collect()
    }

    /// Number of events about one entity.
    pub fn count_for(&self, key: EntityKey) -> usize {
        self.events.iter().filter(|e| e.subject() == key).count()
    }
}
