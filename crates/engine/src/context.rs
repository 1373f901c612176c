//! Everything one propagation run needs, passed down explicitly.

use checkgrid_config::EngineSettings;

use crate::broker::{Broker, EntityRegistry};
use crate::events::EventQueue;
use crate::repository::Repositories;
use crate::subscriber::SubscriberFactory;

/// Collaborators shared by structural operations, subscribers and handlers.
///
/// A context is scoped to one caller; nothing in it is global. Handlers get
/// `&mut Context` and may append to `queue` while the bus is draining it.
pub struct Context {
    pub repos: Repositories,
    pub broker: Broker,
    pub registry: EntityRegistry,
    pub queue: EventQueue,
    pub factory: SubscriberFactory,
    pub settings: EngineSettings,
}

impl Context {
    pub fn new(repos: Repositories, broker: Broker, settings: EngineSettings) -> Self {
        Self {
            repos,
            broker,
            registry: EntityRegistry::default(),
            queue: EventQueue::new(),
            factory: SubscriberFactory::new(&settings),
            settings,
        }
    }

    /// In-memory repositories and subscription store.
    pub fn in_memory(settings: EngineSettings) -> Self {
        Self::new(Repositories::in_memory(), Broker::in_memory(), settings)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::in_memory(EngineSettings::default())
    }
}
