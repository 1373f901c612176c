//! Cell subscribers.
//!
//! A cell moves through `Unlinked → Synced ⇄ RefError → Unlinked`:
//!
//! - `follow_cells` links it and copies (or computes) the parent value
//! - `on_cell_updated` refreshes the value
//! - `on_cell_deleted` turns it into `REF_ERROR` until it is re-followed
//! - `unfollow_cells` unlinks it and clears the value
//!
//! Mirror cells take exactly one parent. Formula cells take as many as their
//! operation accepts.

use checkgrid_config::PropagationSettings;

use crate::broker::Broker;
use crate::cell::{Cell, CellValue, Formula};
use crate::context::Context;
use crate::entity_id::{CellId, EntityKey};
use crate::error::{EngineError, Result};
use crate::events::EventQueue;
use crate::subscriber::Reaction;

/// Where a cell stands with respect to its parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No publishers; the value is the cell's own
    Unlinked,
    /// Following and holding a derived value
    Synced,
    /// Following, but a parent is gone
    RefError,
}

/// Replace the cell value and enqueue an update carrying the old snapshot.
///
/// Returns false (and enqueues nothing) when the value is unchanged and
/// unchanged values are skipped.
fn assign_value(
    cell: &mut Cell,
    value: CellValue,
    propagation: &PropagationSettings,
    queue: &mut EventQueue,
) -> bool {
    if propagation.skip_unchanged && cell.value == value {
        log::trace!("{} unchanged at {}", cell.id, value);
        return false;
    }
    let old = cell.clone();
    cell.value = value;
    queue.updated(old, cell.clone());
    true
}

fn link_state(cell: &Cell, broker: &Broker) -> LinkState {
    if broker.get_publishers(cell.key()).is_empty() {
        LinkState::Unlinked
    } else if cell.value.is_ref_error() {
        LinkState::RefError
    } else {
        LinkState::Synced
    }
}

fn reaction(changed: bool) -> Reaction {
    if changed {
        Reaction::Changed
    } else {
        Reaction::Unchanged
    }
}

/// Mirrors the value of exactly one parent cell.
#[derive(Debug, Clone)]
pub struct SingleParentCellSubscriber {
    cell: Cell,
    propagation: PropagationSettings,
}

impl SingleParentCellSubscriber {
    pub fn new(cell: Cell, propagation: PropagationSettings) -> Self {
        Self { cell, propagation }
    }

    pub fn cell(&self) -> &Cell {
        &self.cell
    }

    pub fn into_cell(self) -> Cell {
        self.cell
    }

    /// Follow `publishers`, which must hold exactly one cell.
    ///
    /// Any previous parent is dropped. The parent value is copied and saved
    /// immediately.
    pub fn follow_cells(&mut self, publishers: &[Cell], ctx: &mut Context) -> Result<()> {
        let [parent] = publishers else {
            return Err(EngineError::Arity {
                expected: "exactly 1",
                actual: publishers.len(),
            });
        };
        let me = self.cell.key();
        let previous: Vec<EntityKey> = ctx
            .broker
            .get_publishers(me)
            .into_iter()
            .filter(|key| *key != parent.key())
            .collect();

        ctx.broker.subscribe(&[parent.key()], me)?;
        if !previous.is_empty() {
            ctx.broker.unsubscribe(&previous, me);
        }

        if assign_value(&mut self.cell, parent.value.clone(), &self.propagation, &mut ctx.queue) {
            ctx.repos.cells.update_one(self.cell.clone())?;
        }
        log::debug!("{} follows {}", self.cell.id, parent.id);
        Ok(())
    }

    /// Stop following `publishers` and clear the value.
    pub fn unfollow_cells(&mut self, publishers: &[Cell], ctx: &mut Context) -> Result<()> {
        let keys: Vec<EntityKey> = publishers.iter().map(Cell::key).collect();
        ctx.broker.unsubscribe(&keys, self.cell.key());

        if assign_value(&mut self.cell, CellValue::Null, &self.propagation, &mut ctx.queue) {
            ctx.repos.cells.update_one(self.cell.clone())?;
        }
        Ok(())
    }

    pub fn on_cell_updated(&mut self, _old: &Cell, actual: &Cell, ctx: &mut Context) -> Result<Reaction> {
        if actual.value.is_ref_error() && !self.propagation.ref_error.cascades() {
            log::trace!("{} holds its value; REF_ERROR is not cascaded", self.cell.id);
            return Ok(Reaction::Unchanged);
        }
        let changed =
            assign_value(&mut self.cell, actual.value.clone(), &self.propagation, &mut ctx.queue);
        Ok(reaction(changed))
    }

    pub fn on_cell_deleted(&mut self, publisher: &Cell, ctx: &mut Context) -> Result<Reaction> {
        log::debug!("{} lost its parent {}", self.cell.id, publisher.id);
        let changed =
            assign_value(&mut self.cell, CellValue::RefError, &self.propagation, &mut ctx.queue);
        Ok(reaction(changed))
    }

    pub fn link_state(&self, broker: &Broker) -> LinkState {
        link_state(&self.cell, broker)
    }
}

/// Computes its value from several parents through the cell's formula.
#[derive(Debug, Clone)]
pub struct MultiParentCellSubscriber {
    cell: Cell,
    propagation: PropagationSettings,
}

impl MultiParentCellSubscriber {
    pub fn new(cell: Cell, propagation: PropagationSettings) -> Self {
        Self { cell, propagation }
    }

    pub fn cell(&self) -> &Cell {
        &self.cell
    }

    pub fn into_cell(self) -> Cell {
        self.cell
    }

    fn formula(&self) -> Result<&Formula> {
        self.cell
            .formula
            .as_ref()
            .ok_or_else(|| EngineError::Invariant(format!("{} has no formula", self.cell.id)))
    }

    /// Current formula result over the stored parents, in operand order.
    ///
    /// A parent that no longer exists makes the result `REF_ERROR`.
    pub fn recompute(&self, ctx: &Context) -> Result<CellValue> {
        let formula = self.formula()?;
        let found = ctx.repos.cells.get_many_by_id(&formula.operands)?;
        if found.len() != formula.operands.len() {
            return Ok(CellValue::RefError);
        }
        let values: Vec<CellValue> = found.into_iter().map(|c| c.value).collect();
        Ok(formula.op.apply(&values))
    }

    /// Add `publishers` as operands, in order, and recompute.
    pub fn follow_cells(&mut self, publishers: &[Cell], ctx: &mut Context) -> Result<()> {
        let formula = self.formula()?;
        let mut operands = formula.operands.clone();
        for parent in publishers {
            if !operands.contains(&parent.id) {
                operands.push(parent.id);
            }
        }
        if publishers.is_empty() || !formula.op.accepts(operands.len()) {
            return Err(EngineError::Arity {
                expected: formula.op.arity(),
                actual: operands.len(),
            });
        }

        let keys: Vec<EntityKey> = publishers.iter().map(Cell::key).collect();
        ctx.broker.subscribe(&keys, self.cell.key())?;
        if let Some(formula) = self.cell.formula.as_mut() {
            formula.operands = operands;
        }

        let value = self.recompute(ctx)?;
        assign_value(&mut self.cell, value, &self.propagation, &mut ctx.queue);
        ctx.repos.cells.update_one(self.cell.clone())?;
        Ok(())
    }

    /// Drop `publishers` from the operands; clear the value if none remain.
    pub fn unfollow_cells(&mut self, publishers: &[Cell], ctx: &mut Context) -> Result<()> {
        let keys: Vec<EntityKey> = publishers.iter().map(Cell::key).collect();
        ctx.broker.unsubscribe(&keys, self.cell.key());

        let removed: Vec<CellId> = publishers.iter().map(|c| c.id).collect();
        if let Some(formula) = self.cell.formula.as_mut() {
            formula.operands.retain(|id| !removed.contains(id));
        }

        let value = if self.formula()?.operands.is_empty() {
            CellValue::Null
        } else {
            self.recompute(ctx)?
        };
        assign_value(&mut self.cell, value, &self.propagation, &mut ctx.queue);
        ctx.repos.cells.update_one(self.cell.clone())?;
        Ok(())
    }

    pub fn on_cell_updated(&mut self, _old: &Cell, actual: &Cell, ctx: &mut Context) -> Result<Reaction> {
        if actual.value.is_ref_error() && !self.propagation.ref_error.cascades() {
            log::trace!("{} holds its value; REF_ERROR is not cascaded", self.cell.id);
            return Ok(Reaction::Unchanged);
        }
        let value = self.recompute(ctx)?;
        let changed = assign_value(&mut self.cell, value, &self.propagation, &mut ctx.queue);
        Ok(reaction(changed))
    }

    pub fn on_cell_deleted(&mut self, publisher: &Cell, ctx: &mut Context) -> Result<Reaction> {
        log::debug!("{} lost operand {}", self.cell.id, publisher.id);
        let changed =
            assign_value(&mut self.cell, CellValue::RefError, &self.propagation, &mut ctx.queue);
        Ok(reaction(changed))
    }

    pub fn link_state(&self, broker: &Broker) -> LinkState {
        link_state(&self.cell, broker)
    }
}

/// Cell behavior chosen by the factory.
#[derive(Debug, Clone)]
pub enum CellSubscriber {
    Single(SingleParentCellSubscriber),
    Multi(MultiParentCellSubscriber),
}

impl CellSubscriber {
    pub fn cell(&self) -> &Cell {
        match self {
            CellSubscriber::Single(s) => s.cell(),
            CellSubscriber::Multi(s) => s.cell(),
        }
    }

    pub fn into_cell(self) -> Cell {
        match self {
            CellSubscriber::Single(s) => s.into_cell(),
            CellSubscriber::Multi(s) => s.into_cell(),
        }
    }

    pub fn follow_cells(&mut self, publishers: &[Cell], ctx: &mut Context) -> Result<()> {
        match self {
            CellSubscriber::Single(s) => s.follow_cells(publishers, ctx),
            CellSubscriber::Multi(s) => s.follow_cells(publishers, ctx),
        }
    }

    pub fn unfollow_cells(&mut self, publishers: &[Cell], ctx: &mut Context) -> Result<()> {
        match self {
            CellSubscriber::Single(s) => s.unfollow_cells(publishers, ctx),
            CellSubscriber::Multi(s) => s.unfollow_cells(publishers, ctx),
        }
    }

    pub fn on_cell_updated(&mut self, old: &Cell, actual: &Cell, ctx: &mut Context) -> Result<Reaction> {
        match self {
            CellSubscriber::Single(s) => s.on_cell_updated(old, actual, ctx),
            CellSubscriber::Multi(s) => s.on_cell_updated(old, actual, ctx),
        }
    }

    pub fn on_cell_deleted(&mut self, publisher: &Cell, ctx: &mut Context) -> Result<Reaction> {
        match self {
            CellSubscriber::Single(s) => s.on_cell_deleted(publisher, ctx),
            CellSubscriber::Multi(s) => s.on_cell_deleted(publisher, ctx),
        }
    }

    pub fn link_state(&self, broker: &Broker) -> LinkState {
        match self {
            CellSubscriber::Single(s) => s.link_state(broker),
            CellSubscriber::Multi(s) => s.link_state(broker),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::FormulaOp;
    use crate::entity_id::{SheetId, SindexId};
    use crate::events::{Event, EventKind};

    fn stored_cell(ctx: &mut Context, value: CellValue) -> Cell {
        let cell = Cell::new(SheetId::new(), SindexId::new(), SindexId::new(), value);
        ctx.repos.cells.add_many(vec![cell.clone()]).unwrap();
        cell
    }

    fn stored_formula(ctx: &mut Context, op: FormulaOp) -> Cell {
        let cell = Cell::new(SheetId::new(), SindexId::new(), SindexId::new(), CellValue::Null)
            .with_formula(op);
        ctx.repos.cells.add_many(vec![cell.clone()]).unwrap();
        cell
    }

    #[test]
    fn test_mirror_follow_copies_value() {
        let mut ctx = Context::default();
        let parent = stored_cell(&mut ctx, CellValue::Int(7));
        let child = stored_cell(&mut ctx, CellValue::Null);

        let mut sub = ctx.factory.create_cell_subscriber(child.clone());
        assert_eq!(sub.link_state(&ctx.broker), LinkState::Unlinked);
        sub.follow_cells(&[parent.clone()], &mut ctx).unwrap();

        assert_eq!(ctx.repos.cells.get_one_by_id(child.id).unwrap().value, CellValue::Int(7));
        assert!(ctx.broker.get_subscribers(parent.key()).contains(&child.key()));
        assert_eq!(sub.link_state(&ctx.broker), LinkState::Synced);
        assert_eq!(ctx.queue.len(), 1);
    }

    #[test]
    fn test_mirror_follow_requires_one_parent() {
        let mut ctx = Context::default();
        let a = stored_cell(&mut ctx, CellValue::Int(1));
        let b = stored_cell(&mut ctx, CellValue::Int(2));
        let child = stored_cell(&mut ctx, CellValue::Null);

        let mut sub = ctx.factory.create_cell_subscriber(child);
        let err = sub.follow_cells(&[a, b], &mut ctx).unwrap_err();
        assert!(matches!(err, EngineError::Arity { actual: 2, .. }));
        assert!(err.is_structural());
        assert_eq!(ctx.broker.edge_count(), 0);

        assert!(sub.follow_cells(&[], &mut ctx).is_err());
    }

    #[test]
    fn test_mirror_refollow_replaces_parent() {
        let mut ctx = Context::default();
        let a = stored_cell(&mut ctx, CellValue::Int(1));
        let b = stored_cell(&mut ctx, CellValue::Int(2));
        let child = stored_cell(&mut ctx, CellValue::Null);

        let mut sub = ctx.factory.create_cell_subscriber(child.clone());
        sub.follow_cells(&[a.clone()], &mut ctx).unwrap();
        sub.follow_cells(&[b.clone()], &mut ctx).unwrap();

        let publishers = ctx.broker.get_publishers(child.key());
        assert_eq!(publishers.len(), 1);
        assert!(publishers.contains(&b.key()));
        assert_eq!(sub.cell().value, CellValue::Int(2));
    }

    #[test]
    fn test_mirror_unfollow_clears() {
        let mut ctx = Context::default();
        let parent = stored_cell(&mut ctx, CellValue::Int(7));
        let child = stored_cell(&mut ctx, CellValue::Null);

        let mut sub = ctx.factory.create_cell_subscriber(child.clone());
        sub.follow_cells(&[parent.clone()], &mut ctx).unwrap();
        sub.unfollow_cells(&[parent.clone()], &mut ctx).unwrap();

        assert_eq!(ctx.repos.cells.get_one_by_id(child.id).unwrap().value, CellValue::Null);
        assert!(ctx.broker.get_subscribers(parent.key()).is_empty());
        assert_eq!(sub.link_state(&ctx.broker), LinkState::Unlinked);
    }

    #[test]
    fn test_mirror_on_deleted_sets_ref_error() {
        let mut ctx = Context::default();
        let parent = stored_cell(&mut ctx, CellValue::Int(7));
        let child = stored_cell(&mut ctx, CellValue::Null);

        let mut sub = ctx.factory.create_cell_subscriber(child.clone());
        sub.follow_cells(&[parent.clone()], &mut ctx).unwrap();
        ctx.queue.clear();

        let reaction = sub.on_cell_deleted(&parent, &mut ctx).unwrap();
        assert_eq!(reaction, Reaction::Changed);
        assert_eq!(sub.cell().value, CellValue::RefError);
        assert_eq!(sub.link_state(&ctx.broker), LinkState::RefError);

        match ctx.queue.pop_front().unwrap() {
            Event::Updated { old, new, .. } => {
                assert_eq!(old.as_cell().unwrap().value, CellValue::Int(7));
                assert_eq!(new.as_cell().unwrap().value, CellValue::RefError);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // A second deletion notice changes nothing
        assert_eq!(sub.on_cell_deleted(&parent, &mut ctx).unwrap(), Reaction::Unchanged);
    }

    #[test]
    fn test_mirror_skips_unchanged_value() {
        let mut ctx = Context::default();
        let parent = stored_cell(&mut ctx, CellValue::Int(7));
        let child = stored_cell(&mut ctx, CellValue::Int(7));

        let mut sub = ctx.factory.create_cell_subscriber(child);
        let reaction = sub.on_cell_updated(&parent, &parent, &mut ctx).unwrap();
        assert_eq!(reaction, Reaction::Unchanged);
        assert!(ctx.queue.is_empty());
    }

    #[test]
    fn test_formula_sum_follows_many() {
        let mut ctx = Context::default();
        let a = stored_cell(&mut ctx, CellValue::Int(1));
        let b = stored_cell(&mut ctx, CellValue::Int(2));
        let c = stored_cell(&mut ctx, CellValue::float(0.5));
        let total = stored_formula(&mut ctx, FormulaOp::Sum);

        let mut sub = ctx.factory.create_cell_subscriber(total.clone());
        sub.follow_cells(&[a.clone(), b.clone(), c.clone()], &mut ctx).unwrap();

        assert_eq!(sub.cell().value, CellValue::float(3.5));
        assert_eq!(ctx.broker.get_publishers(total.key()).len(), 3);

        sub.unfollow_cells(&[c], &mut ctx).unwrap();
        assert_eq!(sub.cell().value, CellValue::Int(3));
        let updates = ctx.queue.iter().filter(|e| e.kind() == EventKind::CELL_UPDATED).count();
        assert_eq!(updates, 2);

        sub.unfollow_cells(&[a, b], &mut ctx).unwrap();
        assert_eq!(sub.cell().value, CellValue::Null);
        assert_eq!(sub.link_state(&ctx.broker), LinkState::Unlinked);
    }

    #[test]
    fn test_formula_difference_arity() {
        let mut ctx = Context::default();
        let a = stored_cell(&mut ctx, CellValue::Int(10));
        let b = stored_cell(&mut ctx, CellValue::Int(4));
        let c = stored_cell(&mut ctx, CellValue::Int(1));
        let diff = stored_formula(&mut ctx, FormulaOp::Difference);

        let mut sub = ctx.factory.create_cell_subscriber(diff.clone());
        assert!(matches!(
            sub.follow_cells(&[a.clone()], &mut ctx),
            Err(EngineError::Arity { expected: "exactly 2", actual: 1 })
        ));

        sub.follow_cells(&[a.clone(), b.clone()], &mut ctx).unwrap();
        assert_eq!(sub.cell().value, CellValue::Int(6));
        assert!(sub.follow_cells(&[c], &mut ctx).is_err());

        // Operand order is kept: minuend first
        let stored = ctx.repos.cells.get_one_by_id(diff.id).unwrap();
        assert_eq!(stored.formula.unwrap().operands, vec![a.id, b.id]);
    }

    #[test]
    fn test_formula_recompute_after_operand_update() {
        let mut ctx = Context::default();
        let a = stored_cell(&mut ctx, CellValue::Int(10));
        let b = stored_cell(&mut ctx, CellValue::Int(4));
        let diff = stored_formula(&mut ctx, FormulaOp::Difference);

        let mut sub = ctx.factory.create_cell_subscriber(diff);
        sub.follow_cells(&[a.clone(), b.clone()], &mut ctx).unwrap();

        let mut updated = b.clone();
        updated.value = CellValue::Int(10);
        ctx.repos.cells.update_one(updated.clone()).unwrap();

        let reaction = sub.on_cell_updated(&b, &updated, &mut ctx).unwrap();
        assert_eq!(reaction, Reaction::Changed);
        assert_eq!(sub.cell().value, CellValue::Int(0));
    }

    #[test]
    fn test_formula_missing_operand_is_ref_error() {
        let mut ctx = Context::default();
        let a = stored_cell(&mut ctx, CellValue::Int(10));
        let b = stored_cell(&mut ctx, CellValue::Int(4));
        let diff = stored_formula(&mut ctx, FormulaOp::Difference);

        let mut sub = ctx.factory.create_cell_subscriber(diff);
        sub.follow_cells(&[a.clone(), b.clone()], &mut ctx).unwrap();
        ctx.repos.cells.remove_many(&[b.id]).unwrap();

        let CellSubscriber::Multi(multi) = &sub else {
            panic!("expected a formula subscriber");
        };
        assert_eq!(multi.recompute(&ctx).unwrap(), CellValue::RefError);
        assert_eq!(sub.on_cell_deleted(&b, &mut ctx).unwrap(), Reaction::Changed);
    }

    #[test]
    fn test_one_hop_policy_holds_value() {
        let mut settings = checkgrid_config::EngineSettings::default();
        settings.propagation.ref_error = checkgrid_config::RefErrorPolicy::OneHop;
        let mut ctx = Context::in_memory(settings);

        let parent = stored_cell(&mut ctx, CellValue::Int(3));
        let child = stored_cell(&mut ctx, CellValue::Int(3));
        let mut broken = parent.clone();
        broken.value = CellValue::RefError;

        let mut sub = ctx.factory.create_cell_subscriber(child);
        assert_eq!(sub.on_cell_updated(&parent, &broken, &mut ctx).unwrap(), Reaction::Unchanged);
        assert_eq!(sub.cell().value, CellValue::Int(3));

        // A direct deletion still marks the cell
        assert_eq!(sub.on_cell_deleted(&parent, &mut ctx).unwrap(), Reaction::Changed);
    }

    #[test]
    fn test_cross_sheet_link_through_bus() {
        use crate::harness::{ints, EngineHarness};

        let mut h = EngineHarness::new();
        let source = h.sheet("Source", vec![ints(&[1, 2])]);
        let target = h.sheet("Target", vec![ints(&[0])]);
        h.link(target, 0, 0, source, 0, 1);
        assert_eq!(h.value(target, 0, 0), CellValue::Int(2));

        h.clear_events();
        h.set(source, 0, 1, CellValue::Int(20));
        assert_eq!(h.value(target, 0, 0), CellValue::Int(20));
        let key = h.cell(target, 0, 0).key();
        assert_eq!(h.dispatched(key, EventKind::CELL_UPDATED), 1);

        // Unrelated cell: no cascade
        h.clear_events();
        h.set(source, 0, 0, CellValue::Int(9));
        assert_eq!(h.dispatched(key, EventKind::CELL_UPDATED), 0);
    }
}
