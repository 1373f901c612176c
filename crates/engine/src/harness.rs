//! Test harness for engine scenarios with event tracking.
//!
//! `EngineHarness` wraps an [`Engine`] with event recording switched on and
//! adds positional helpers, so tests read in terms of `(row, col)` rather
//! than ids.

use checkgrid_config::EngineSettings;

use crate::bus::RunReport;
use crate::cell::{Cell, CellValue};
use crate::engine::Engine;
use crate::entity_id::{EntityKey, SheetId};
use crate::events::{EventCollector, EventKind};
use crate::sheet::{Axis, SheetKind};

pub struct EngineHarness {
    pub engine: Engine,
}

impl EngineHarness {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let mut engine = Engine::new(settings);
        engine.bus_mut().record_events(true);
        Self { engine }
    }

    /// Regular sheet filled with `rows`.
    pub fn sheet(&mut self, name: &str, rows: Vec<Vec<CellValue>>) -> SheetId {
        let sheet = self
            .engine
            .create_sheet_with(name, SheetKind::Regular, &rows)
            .expect("create sheet");
        self.clear_events();
        sheet.info.id
    }

    /// Empty sheet of `kind` built from `parent`.
    pub fn derive(&mut self, name: &str, kind: SheetKind, parent: SheetId) -> SheetId {
        let info = self.engine.create_sheet(name, kind).expect("create sheet");
        self.engine.follow_sheet(info.id, parent).expect("follow sheet");
        self.clear_events();
        info.id
    }

    pub fn freeze(&mut self, sheet: SheetId, axis: Axis, position: usize) {
        let sindex = self.engine.sindex_at(sheet, axis, position).expect("sindex");
        self.engine.set_freeze(sindex.id, true).expect("freeze");
    }

    pub fn cell(&self, sheet: SheetId, row: usize, col: usize) -> Cell {
        self.engine.cell_at(sheet, row, col).expect("cell")
    }

    pub fn value(&self, sheet: SheetId, row: usize, col: usize) -> CellValue {
        self.cell(sheet, row, col).value
    }

    pub fn set(&mut self, sheet: SheetId, row: usize, col: usize, value: CellValue) -> RunReport {
        let id = self.cell(sheet, row, col).id;
        self.engine.set_cell_value(id, value).expect("set value")
    }

    /// Make `(row, col)` of `sheet` follow `(prow, pcol)` of `parent`.
    pub fn link(&mut self, sheet: SheetId, row: usize, col: usize, parent: SheetId, prow: usize, pcol: usize) {
        let id = self.cell(sheet, row, col).id;
        let parent_id = self.cell(parent, prow, pcol).id;
        self.engine.follow_cells(id, &[parent_id]).expect("follow cell");
    }

    /// Values in row-major order.
    pub fn values(&self, sheet: SheetId) -> Vec<CellValue> {
        self.engine.load_sheet(sheet).expect("load sheet").values()
    }

    pub fn grid(&self, sheet: SheetId) -> Vec<Vec<CellValue>> {
        self.engine.load_sheet(sheet).expect("load sheet").value_grid()
    }

    pub fn positions(&self, sheet: SheetId, axis: Axis) -> Vec<usize> {
        self.engine
            .sindexes(sheet, axis)
            .expect("sindexes")
            .iter()
            .map(|s| s.position)
            .collect()
    }

    pub fn events(&self) -> &EventCollector {
        self.engine.bus().collected().expect("event recording is on")
    }

    /// Dispatched events about one entity, of one kind.
    pub fn dispatched(&self, key: EntityKey, kind: EventKind) -> usize {
        self.events()
            .of_kind(kind)
            .into_iter()
            .filter(|e| e.subject() == key)
            .count()
    }

    pub fn clear_events(&mut self) {
        self.engine.bus_mut().clear_collected();
    }

    /// Panics if the subscription store is inconsistent.
    pub fn assert_consistent(&self) {
        self.engine.context().broker.assert_consistent();
    }
}

impl Default for EngineHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn ints(values: &[i64]) -> Vec<CellValue> {
    values.iter().map(|&v| CellValue::Int(v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_positions() {
        let mut h = EngineHarness::new();
        let sheet = h.sheet("S", vec![ints(&[1, 2]), ints(&[3, 4])]);

        assert_eq!(h.value(sheet, 1, 0), CellValue::Int(3));
        assert_eq!(h.grid(sheet)[0], ints(&[1, 2]));
        assert_eq!(h.positions(sheet, Axis::Col), vec![0, 1]);
        assert!(h.events().is_empty());

        h.set(sheet, 0, 0, CellValue::Int(9));
        let key = h.cell(sheet, 0, 0).key();
        assert_eq!(h.dispatched(key, EventKind::CELL_UPDATED), 1);
    }

    #[test]
    fn test_harness_mirror_chain() {
        let mut h = EngineHarness::new();
        let source = h.sheet("A", vec![ints(&[1, 2])]);
        let copy = h.derive("B", SheetKind::Regular, source);

        h.set(source, 0, 1, CellValue::Int(20));
        assert_eq!(h.values(copy), ints(&[1, 20]));
        h.assert_consistent();
    }
}
