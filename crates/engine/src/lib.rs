pub mod broker;
pub mod bus;
pub mod cell;
pub mod context;
pub mod engine;
pub mod entity;
pub mod entity_id;
pub mod error;
pub mod events;
pub mod handlers;
pub mod repository;
pub mod sheet;
pub mod structure;
pub mod subscriber;
pub mod subscriptions;

#[cfg(test)]
pub mod harness;

pub use broker::{Broker, EntityRegistry};
pub use bus::{EventBus, RunReport};
pub use cell::{Cell, CellValue, Formula, FormulaOp, REF_ERROR, VALUE_ERROR};
pub use context::Context;
pub use engine::Engine;
pub use entity::Entity;
pub use entity_id::{CellId, EntityKey, EntityKind, SheetId, SindexId};
pub use error::{EngineError, Result};
pub use events::{Event, EventCollector, EventId, EventKind, EventQueue};
pub use repository::{Filter, MemoryRepository, OrderBy, Repositories, Repository};
pub use sheet::{Axis, Sheet, SheetInfo, SheetKind, Sindex};
pub use subscriber::{LinkState, Reaction, Subscriber, SubscriberFactory};
pub use subscriptions::{MemorySubscriptionStore, SubscriptionStore};
