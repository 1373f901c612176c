//! `Engine`: a context plus a wired bus.
//!
//! Every mutation performs its structural or linking step, then drains the
//! bus so the returned state is fully propagated. If the step itself fails
//! nothing is dispatched and the pending queue is dropped.

use checkgrid_config::EngineSettings;

use crate::bus::{EventBus, RunReport};
use crate::cell::{Cell, CellValue};
use crate::context::Context;
use crate::entity_id::{CellId, SheetId, SindexId};
use crate::error::{EngineError, Result};
use crate::sheet::{Axis, Sheet, SheetInfo, SheetKind, Sindex};
use crate::structure;
use crate::subscriber::LinkState;

pub struct Engine {
    ctx: Context,
    bus: EventBus,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_context(Context::in_memory(settings))
    }

    /// Engine over an existing context, with the default handlers.
    pub fn with_context(ctx: Context) -> Self {
        Self {
            ctx,
            bus: EventBus::with_default_handlers(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(EngineSettings::default())
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.ctx.settings
    }

    /// Drain whatever is queued.
    pub fn run(&mut self) -> Result<RunReport> {
        self.bus.run(&mut self.ctx)
    }

    /// Apply `op`, then settle the cascade it queued.
    fn settle<T>(&mut self, op: impl FnOnce(&mut Context) -> Result<T>) -> Result<RunReport> {
        match op(&mut self.ctx) {
            Ok(_) => self.run(),
            Err(err) => {
                self.ctx.queue.clear();
                Err(err)
            }
        }
    }

    // Sheets

    pub fn create_sheet(&mut self, name: &str, kind: SheetKind) -> Result<SheetInfo> {
        structure::create_sheet(&mut self.ctx, name, kind)
    }

    /// Create a sheet filled with `table` (row-major).
    pub fn create_sheet_with(&mut self, name: &str, kind: SheetKind, table: &[Vec<CellValue>]) -> Result<Sheet> {
        let info = self.create_sheet(name, kind)?;
        self.insert_rows(info.id, table, 0)?;
        self.load_sheet(info.id)
    }

    pub fn load_sheet(&self, id: SheetId) -> Result<Sheet> {
        structure::load_sheet(&self.ctx, id)
    }

    pub fn delete_sheet(&mut self, id: SheetId) -> Result<RunReport> {
        self.settle(|ctx| structure::delete_sheet(ctx, id))
    }

    /// Build the empty sheet `target` from `parent`, according to the target's kind.
    pub fn follow_sheet(&mut self, target: SheetId, parent: SheetId) -> Result<RunReport> {
        self.settle(|ctx| {
            let info = ctx.repos.sheets.get_one_by_id(target)?;
            let parent = ctx.repos.sheets.get_one_by_id(parent)?;
            ctx.factory.create_sheet_subscriber(info).follow_sheet(&parent, ctx)
        })
    }

    // Rows and columns

    pub fn insert_rows(&mut self, sheet: SheetId, table: &[Vec<CellValue>], from_pos: usize) -> Result<RunReport> {
        self.settle(|ctx| structure::insert_rows_from_position(ctx, sheet, table, from_pos))
    }

    /// Insert columns; `table[k]` holds the k-th new column top to bottom.
    pub fn insert_cols(&mut self, sheet: SheetId, table: &[Vec<CellValue>], from_pos: usize) -> Result<RunReport> {
        self.settle(|ctx| structure::insert_cols_from_position(ctx, sheet, table, from_pos))
    }

    pub fn append_rows(&mut self, sheet: SheetId, table: &[Vec<CellValue>]) -> Result<RunReport> {
        self.settle(|ctx| structure::append_rows(ctx, sheet, table))
    }

    pub fn delete_sindexes(&mut self, sheet: SheetId, from_pos: usize, count: usize, axis: Axis) -> Result<RunReport> {
        self.settle(|ctx| structure::delete_sindexes_from_position(ctx, sheet, from_pos, count, axis))
    }

    pub fn sindexes(&self, sheet: SheetId, axis: Axis) -> Result<Vec<Sindex>> {
        structure::sindexes_on(&self.ctx, sheet, axis)
    }

    pub fn sindex_at(&self, sheet: SheetId, axis: Axis, position: usize) -> Result<Sindex> {
        let len = self.ctx.repos.sheets.get_one_by_id(sheet)?.len(axis);
        self.sindexes(sheet, axis)?
            .into_iter()
            .nth(position)
            .ok_or(EngineError::PositionOutOfRange { axis, position, len })
    }

    pub fn update_sindex(&mut self, sindex: Sindex) -> Result<RunReport> {
        self.settle(|ctx| structure::update_sindex(ctx, sindex))
    }

    /// Mark a row or column as a header/index line.
    pub fn set_freeze(&mut self, id: SindexId, is_freeze: bool) -> Result<RunReport> {
        let sindex = self.ctx.repos.sindexes.get_one_by_id(id)?;
        self.update_sindex(sindex.frozen(is_freeze))
    }

    pub fn follow_sindexes(&mut self, id: SindexId, parents: &[SindexId]) -> Result<RunReport> {
        self.settle(|ctx| {
            let sindex = ctx.repos.sindexes.get_one_by_id(id)?;
            let parents = load_all(parents, |p| ctx.repos.sindexes.get_one_by_id(p))?;
            ctx.factory.create_sindex_subscriber(sindex).follow_sindexes(&parents, ctx)
        })
    }

    pub fn unfollow_sindexes(&mut self, id: SindexId, parents: &[SindexId]) -> Result<RunReport> {
        self.settle(|ctx| {
            let sindex = ctx.repos.sindexes.get_one_by_id(id)?;
            let parents = load_all(parents, |p| ctx.repos.sindexes.get_one_by_id(p))?;
            ctx.factory.create_sindex_subscriber(sindex).unfollow_sindexes(&parents, ctx)
        })
    }

    // Cells

    pub fn cell(&self, id: CellId) -> Result<Cell> {
        self.ctx.repos.cells.get_one_by_id(id)
    }

    /// The cell at `(row, col)` of a sheet.
    pub fn cell_at(&self, sheet: SheetId, row: usize, col: usize) -> Result<Cell> {
        let sheet = self.load_sheet(sheet)?;
        sheet.cell(row, col).cloned().ok_or_else(|| {
            let (axis, position, len) = if row >= sheet.rows.len() {
                (Axis::Row, row, sheet.rows.len())
            } else {
                (Axis::Col, col, sheet.cols.len())
            };
            EngineError::PositionOutOfRange { axis, position, len }
        })
    }

    pub fn set_cell_value(&mut self, id: CellId, value: impl Into<CellValue>) -> Result<RunReport> {
        let value = value.into();
        self.settle(|ctx| structure::update_cell_value(ctx, id, value))
    }

    pub fn set_cell_background(&mut self, id: CellId, background: Option<String>) -> Result<RunReport> {
        self.settle(|ctx| structure::update_cell_background(ctx, id, background))
    }

    /// Link a cell to its parents and copy or compute its value.
    pub fn follow_cells(&mut self, id: CellId, parents: &[CellId]) -> Result<RunReport> {
        self.settle(|ctx| {
            let cell = ctx.repos.cells.get_one_by_id(id)?;
            let parents = load_all(parents, |p| ctx.repos.cells.get_one_by_id(p))?;
            ctx.factory.create_cell_subscriber(cell).follow_cells(&parents, ctx)
        })
    }

    pub fn unfollow_cells(&mut self, id: CellId, parents: &[CellId]) -> Result<RunReport> {
        self.settle(|ctx| {
            let cell = ctx.repos.cells.get_one_by_id(id)?;
            let parents = load_all(parents, |p| ctx.repos.cells.get_one_by_id(p))?;
            ctx.factory.create_cell_subscriber(cell).unfollow_cells(&parents, ctx)
        })
    }

    pub fn link_state(&self, id: CellId) -> Result<LinkState> {
        let cell = self.cell(id)?;
        Ok(self.ctx.factory.create_cell_subscriber(cell).link_state(&self.ctx.broker))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn load_all<I: Copy, T>(ids: &[I], load: impl Fn(I) -> Result<T>) -> Result<Vec<T>> {
    ids.iter().map(|&id| load(id)).collect()
}
