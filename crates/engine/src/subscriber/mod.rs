//! Self-subscribers: what happens to an entity when one of its publishers
//! changes or disappears.
//!
//! The factory picks the behavior from the entity variant (and, for cells
//! and sheets, from data stored on the entity), so dispatch is an exhaustive
//! match rather than a runtime type lookup.

mod cell;
mod sheet;
mod sindex;

pub use cell::{CellSubscriber, LinkState, MultiParentCellSubscriber, SingleParentCellSubscriber};
pub use sheet::{CheckerSheetSubscriber, MirrorSheetSubscriber, SheetSubscriber};
pub use sindex::SindexSubscriber;

use checkgrid_config::{CheckerSettings, EngineSettings, PropagationSettings};

use crate::cell::Cell;
use crate::context::Context;
use crate::entity::Entity;
use crate::entity_id::EntityKey;
use crate::error::Result;
use crate::sheet::{SheetInfo, SheetKind, Sindex};

/// Outcome of a reaction, telling the handler what to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Nothing changed; nothing to save
    Unchanged,
    /// The subscriber's entity changed and must be saved
    Changed,
    /// The subscriber removed its own entity
    Removed,
}

/// Builds reactive wrappers around entities.
#[derive(Debug, Clone)]
pub struct SubscriberFactory {
    propagation: PropagationSettings,
    checker: CheckerSettings,
}

impl SubscriberFactory {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            propagation: settings.propagation.clone(),
            checker: settings.checker.clone(),
        }
    }

    pub fn create(&self, entity: Entity) -> Subscriber {
        match entity {
            Entity::Cell(cell) => Subscriber::Cell(self.create_cell_subscriber(cell)),
            Entity::Sindex(sindex) => Subscriber::Sindex(self.create_sindex_subscriber(sindex)),
            Entity::Sheet(info) => Subscriber::Sheet(self.create_sheet_subscriber(info)),
        }
    }

    /// Formula cells get the multi-parent behavior, all others mirror one parent.
    pub fn create_cell_subscriber(&self, cell: Cell) -> CellSubscriber {
        if cell.formula.is_some() {
            CellSubscriber::Multi(MultiParentCellSubscriber::new(cell, self.propagation.clone()))
        } else {
            CellSubscriber::Single(SingleParentCellSubscriber::new(cell, self.propagation.clone()))
        }
    }

    pub fn create_sindex_subscriber(&self, sindex: Sindex) -> SindexSubscriber {
        SindexSubscriber::new(sindex)
    }

    pub fn create_sheet_subscriber(&self, info: SheetInfo) -> SheetSubscriber {
        match info.kind {
            SheetKind::Regular => SheetSubscriber::Mirror(MirrorSheetSubscriber::new(info)),
            SheetKind::Checker => {
                SheetSubscriber::Checker(CheckerSheetSubscriber::new(info, self.checker.clone()))
            }
        }
    }
}

impl Default for SubscriberFactory {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

/// A subscriber of any kind.
#[derive(Debug, Clone)]
pub enum Subscriber {
    Cell(CellSubscriber),
    Sindex(SindexSubscriber),
    Sheet(SheetSubscriber),
}

impl Subscriber {
    pub fn key(&self) -> EntityKey {
        match self {
            Subscriber::Cell(s) => s.cell().key(),
            Subscriber::Sindex(s) => s.sindex().key(),
            Subscriber::Sheet(s) => s.info().key(),
        }
    }

    pub fn into_entity(self) -> Entity {
        match self {
            Subscriber::Cell(s) => s.into_cell().into(),
            Subscriber::Sindex(s) => s.into_sindex().into(),
            Subscriber::Sheet(s) => s.into_info().into(),
        }
    }

    /// React to a publisher's update. Mismatched kinds do not react.
    pub fn on_updated(&mut self, old: &Entity, new: &Entity, ctx: &mut Context) -> Result<Reaction> {
        match (self, old, new) {
            (Subscriber::Cell(s), Entity::Cell(old), Entity::Cell(new)) => {
                s.on_cell_updated(old, new, ctx)
            }
            (Subscriber::Sindex(s), Entity::Sindex(old), Entity::Sindex(new)) => {
                s.on_sindex_updated(old, new, ctx)
            }
            (Subscriber::Sheet(s), Entity::Sheet(old), Entity::Sheet(new)) => {
                s.on_sheet_updated(old, new, ctx)
            }
            (subscriber, _, new) => {
                log::warn!("{} cannot react to an update of {}", subscriber.key(), new.key());
                Ok(Reaction::Unchanged)
            }
        }
    }

    /// React to a publisher's deletion. Mismatched kinds do not react.
    pub fn on_deleted(&mut self, publisher: &Entity, ctx: &mut Context) -> Result<Reaction> {
        match (self, publisher) {
            (Subscriber::Cell(s), Entity::Cell(publisher)) => s.on_cell_deleted(publisher, ctx),
            (Subscriber::Sindex(s), Entity::Sindex(publisher)) => {
                s.on_sindex_deleted(publisher, ctx)
            }
            (Subscriber::Sheet(s), Entity::Sheet(publisher)) => s.on_sheet_deleted(publisher, ctx),
            (subscriber, publisher) => {
                log::warn!(
                    "{} cannot react to the deletion of {}",
                    subscriber.key(),
                    publisher.key()
                );
                Ok(Reaction::Unchanged)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellValue, FormulaOp};
    use crate::entity_id::{SheetId, SindexId};
    use crate::sheet::Axis;

    #[test]
    fn test_factory_dispatch() {
        let factory = SubscriberFactory::default();
        let sheet = SheetId::new();
        let plain = Cell::new(sheet, SindexId::new(), SindexId::new(), CellValue::Null);
        let formula = plain.clone().with_formula(FormulaOp::Sum);

        assert!(matches!(factory.create_cell_subscriber(plain), CellSubscriber::Single(_)));
        assert!(matches!(factory.create_cell_subscriber(formula), CellSubscriber::Multi(_)));

        let checker = SheetInfo::new("C", SheetKind::Checker);
        assert!(matches!(
            factory.create(checker.into()),
            Subscriber::Sheet(SheetSubscriber::Checker(_))
        ));
        let regular = SheetInfo::new("R", SheetKind::Regular);
        assert!(matches!(
            factory.create_sheet_subscriber(regular),
            SheetSubscriber::Mirror(_)
        ));

        let sindex = Sindex::new(sheet, Axis::Col, 0, 80);
        let key = sindex.key();
        let subscriber = factory.create(sindex.into());
        assert_eq!(subscriber.key(), key);
        assert!(matches!(subscriber.into_entity(), Entity::Sindex(_)));
    }

    #[test]
    fn test_mismatched_kinds_do_not_react() {
        let mut ctx = Context::default();
        let sheet = SheetId::new();
        let cell = Cell::new(sheet, SindexId::new(), SindexId::new(), CellValue::Int(1));
        let sindex: Entity = Sindex::new(sheet, Axis::Row, 0, 24).into();

        let mut subscriber = ctx.factory.create(cell.into());
        let reaction = subscriber.on_updated(&sindex, &sindex, &mut ctx).unwrap();
        assert_eq!(reaction, Reaction::Unchanged);
        assert!(ctx.queue.is_empty());
    }
}
