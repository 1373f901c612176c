//! Sheet subscribers: derive a whole sheet from a parent sheet.
//!
//! Following a sheet is a one-shot structural build. Every derived row,
//! column and cell is linked to its counterpart in the parent, so later
//! changes reach it through the ordinary cell and sindex subscribers.

use checkgrid_config::CheckerSettings;

use crate::cell::{Cell, CellValue, FormulaOp};
use crate::context::Context;
use crate::entity_id::EntityKey;
use crate::error::{EngineError, Result};
use crate::sheet::{Sheet, SheetInfo, Sindex};
use crate::structure;
use crate::subscriber::Reaction;

/// Everything a follow builds before the first write.
#[derive(Default)]
struct Derivation {
    rows: Vec<Sindex>,
    cols: Vec<Sindex>,
    cells: Vec<Cell>,
    /// `(publishers, subscriber)`
    edges: Vec<(Vec<EntityKey>, EntityKey)>,
}

impl Derivation {
    fn link(&mut self, publishers: &[EntityKey], subscriber: EntityKey) {
        self.edges.push((publishers.to_vec(), subscriber));
    }

    /// Copy a parent sindex onto the target sheet at `position`.
    fn derive_sindex(&mut self, target: &SheetInfo, parent: &Sindex, position: usize) -> Sindex {
        let sindex = Sindex::new(target.id, parent.axis, position, parent.size)
            .frozen(parent.is_freeze)
            .readonly(parent.is_readonly);
        self.link(&[parent.key()], sindex.key());
        sindex
    }

    fn mirror_cols(&mut self, target: &SheetInfo, parent: &Sheet) {
        for col in &parent.cols {
            let derived = self.derive_sindex(target, col, col.position);
            self.cols.push(derived);
        }
    }
}

/// Check the target is empty, link the two sheets and load the parent.
fn prepare(info: &SheetInfo, parent: &SheetInfo, ctx: &mut Context) -> Result<(SheetInfo, Sheet)> {
    let target = ctx.repos.sheets.get_one_by_id(info.id)?;
    if !target.is_empty() {
        return Err(EngineError::TargetNotEmpty {
            sheet: target.id.into(),
            rows: target.rows(),
            cols: target.cols(),
        });
    }
    let source = structure::load_sheet(ctx, parent.id)?;
    ctx.broker.subscribe(&[parent.key()], target.key())?;
    Ok((target, source))
}

/// Write a derivation and announce the new sheet size.
fn commit(target: SheetInfo, derivation: Derivation, ctx: &mut Context) -> Result<SheetInfo> {
    let Derivation { rows, cols, cells, edges } = derivation;
    let mut info = target.clone();
    info.size = (rows.len(), cols.len());

    ctx.repos.sindexes.add_many(rows.into_iter().chain(cols).collect())?;
    ctx.repos.cells.add_many(cells)?;
    for (publishers, subscriber) in &edges {
        ctx.broker.subscribe(publishers, *subscriber)?;
    }
    ctx.repos.sheets.update_one(info.clone())?;
    ctx.queue.updated(target, info.clone());

    log::debug!("{} derived {}x{} with {} links", info.id, info.rows(), info.cols(), edges.len());
    Ok(info)
}

/// Plain 1:1 copy of the parent structure.
#[derive(Debug, Clone)]
pub struct MirrorSheetSubscriber {
    info: SheetInfo,
}

impl MirrorSheetSubscriber {
    pub fn new(info: SheetInfo) -> Self {
        Self { info }
    }

    pub fn follow_sheet(&mut self, parent: &SheetInfo, ctx: &mut Context) -> Result<()> {
        let (target, source) = prepare(&self.info, parent, ctx)?;

        let mut derivation = Derivation::default();
        for row in &source.rows {
            let derived = derivation.derive_sindex(&target, row, row.position);
            derivation.rows.push(derived);
        }
        derivation.mirror_cols(&target, &source);

        let (rows, cols) = (derivation.rows.clone(), derivation.cols.clone());
        for (i, row) in rows.iter().enumerate() {
            for (j, col) in cols.iter().enumerate() {
                let Some(publisher) = source.cell(i, j) else {
                    continue;
                };
                let cell = Cell::new(target.id, row.id, col.id, publisher.value.clone())
                    .with_background(publisher.background.clone());
                derivation.link(&[publisher.key()], cell.key());
                derivation.cells.push(cell);
            }
        }

        self.info = commit(target, derivation, ctx)?;
        Ok(())
    }
}

/// Input/checker row pairs that reconcile against the parent.
///
/// Frozen rows are copied once. Every other parent row becomes an editable
/// input row followed by a read-only checker row whose cells compute
/// `input - parent`. Frozen columns are mirrored in input rows and blank in
/// checker rows.
///
/// A parent with `f` frozen rows and `n` others yields `f + 2n` rows.
#[derive(Debug, Clone)]
pub struct CheckerSheetSubscriber {
    info: SheetInfo,
    checker: CheckerSettings,
}

impl CheckerSheetSubscriber {
    pub fn new(info: SheetInfo, checker: CheckerSettings) -> Self {
        Self { info, checker }
    }

    pub fn follow_sheet(&mut self, parent: &SheetInfo, ctx: &mut Context) -> Result<()> {
        let (target, source) = prepare(&self.info, parent, ctx)?;

        let mut derivation = Derivation::default();
        derivation.mirror_cols(&target, &source);
        let cols = derivation.cols.clone();

        for (i, parent_row) in source.rows.iter().enumerate() {
            let input_row = derivation.derive_sindex(&target, parent_row, derivation.rows.len());
            derivation.rows.push(input_row.clone());

            let mut inputs = Vec::with_capacity(cols.len());
            for (j, col) in cols.iter().enumerate() {
                let publisher = parent_cell(&source, i, j)?;
                let cell = if parent_row.is_freeze || col.is_freeze {
                    let cell = Cell::new(target.id, input_row.id, col.id, publisher.value.clone())
                        .with_background(publisher.background.clone());
                    derivation.link(&[publisher.key()], cell.key());
                    cell
                } else {
                    let value = CellValue::Int(self.checker.input_default);
                    Cell::new(target.id, input_row.id, col.id, value)
                };
                inputs.push(cell);
            }
            derivation.cells.extend(inputs.iter().cloned());

            if !parent_row.is_freeze {
                let checker_row = derivation
                    .derive_sindex(&target, parent_row, derivation.rows.len())
                    .frozen(false)
                    .readonly(true);
                derivation.rows.push(checker_row.clone());

                for (j, col) in cols.iter().enumerate() {
                    let cell = if col.is_freeze {
                        let blank = CellValue::text(self.checker.blank_value.clone());
                        Cell::new(target.id, checker_row.id, col.id, blank)
                    } else {
                        let publisher = parent_cell(&source, i, j)?;
                        let input = &inputs[j];
                        let mut cell = Cell::new(target.id, checker_row.id, col.id, CellValue::Null)
                            .with_formula(FormulaOp::Difference)
                            .with_background(self.checker.background.clone());
                        cell.value = FormulaOp::Difference
                            .apply(&[input.value.clone(), publisher.value.clone()]);
                        if let Some(formula) = cell.formula.as_mut() {
                            formula.operands = vec![input.id, publisher.id];
                        }
                        derivation.link(&[input.key(), publisher.key()], cell.key());
                        cell
                    };
                    derivation.cells.push(cell);
                }
            }
        }

        self.info = commit(target, derivation, ctx)?;
        Ok(())
    }
}

fn parent_cell(source: &Sheet, row: usize, col: usize) -> Result<&Cell> {
    source.cell(row, col).ok_or_else(|| {
        EngineError::Invariant(format!("{} has no cell at ({row}, {col})", source.info.id))
    })
}

/// Sheet behavior chosen by the factory from [`crate::sheet::SheetKind`].
#[derive(Debug, Clone)]
pub enum SheetSubscriber {
    Mirror(MirrorSheetSubscriber),
    Checker(CheckerSheetSubscriber),
}

impl SheetSubscriber {
    pub fn info(&self) -> &SheetInfo {
        match self {
            SheetSubscriber::Mirror(s) => &s.info,
            SheetSubscriber::Checker(s) => &s.info,
        }
    }

    pub fn into_info(self) -> SheetInfo {
        match self {
            SheetSubscriber::Mirror(s) => s.info,
            SheetSubscriber::Checker(s) => s.info,
        }
    }

    /// Build this (empty) sheet from `parent`.
    ///
    /// Fails with `TargetNotEmpty` if the sheet already has rows or columns.
    pub fn follow_sheet(&mut self, parent: &SheetInfo, ctx: &mut Context) -> Result<()> {
        match self {
            SheetSubscriber::Mirror(s) => s.follow_sheet(parent, ctx),
            SheetSubscriber::Checker(s) => s.follow_sheet(parent, ctx),
        }
    }

    pub fn unfollow_sheet(&mut self, _parent: &SheetInfo, _ctx: &mut Context) -> Result<()> {
        Err(EngineError::Unsupported("unfollow_sheet"))
    }

    pub fn on_rows_appended(&mut self, _rows: &[Sindex], _ctx: &mut Context) -> Result<Reaction> {
        Err(EngineError::Unsupported("on_rows_appended"))
    }

    /// Size changes reach derived sheets through their rows and columns.
    pub fn on_sheet_updated(&mut self, _old: &SheetInfo, _actual: &SheetInfo, _ctx: &mut Context) -> Result<Reaction> {
        Ok(Reaction::Unchanged)
    }

    pub fn on_sheet_deleted(&mut self, _parent: &SheetInfo, _ctx: &mut Context) -> Result<Reaction> {
        Err(EngineError::Unsupported("on_sheet_deleted"))
    }
}
