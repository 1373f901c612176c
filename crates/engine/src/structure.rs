//! Structural sheet operations: create, insert, delete and reindex rows and
//! columns while keeping positions contiguous.
//!
//! Every operation validates its input before the first write and reports
//! what it changed through the context's event queue:
//!
//! 1. `Deleted` for removed cells, then for removed sindexes
//! 2. `Updated` for sindexes whose position moved
//! 3. `Updated` for the sheet whose size changed
//!
//! Nothing here drains the queue; callers run the bus afterwards.

use crate::cell::{Cell, CellValue};
use crate::context::Context;
use crate::entity_id::{CellId, SheetId, SindexId};
use crate::error::{EngineError, Result};
use crate::repository::{Filter, OrderBy};
use crate::sheet::{Axis, Sheet, SheetInfo, SheetKind, Sindex};

/// Create an empty sheet.
pub fn create_sheet(ctx: &mut Context, name: &str, kind: SheetKind) -> Result<SheetInfo> {
    let info = SheetInfo::new(name, kind);
    ctx.repos.sheets.add_many(vec![info.clone()])?;
    log::debug!("created {} '{}' ({:?})", info.id, info.name, kind);
    Ok(info)
}

/// Load a sheet with its sindexes and cells, validated.
pub fn load_sheet(ctx: &Context, id: SheetId) -> Result<Sheet> {
    let info = ctx.repos.sheets.get_one_by_id(id)?;
    let rows = sindexes_on(ctx, id, Axis::Row)?;
    let cols = sindexes_on(ctx, id, Axis::Col)?;
    let cells = ctx
        .repos
        .cells
        .get_many(&Filter::new().eq("sheet_id", id), None, None)?;
    Sheet::assemble(info, rows, cols, cells)
}

/// Sindexes of one axis, ordered by position.
pub fn sindexes_on(ctx: &Context, sheet: SheetId, axis: Axis) -> Result<Vec<Sindex>> {
    let filter = Filter::new().eq("sheet_id", sheet).eq("axis", axis);
    ctx.repos
        .sindexes
        .get_many(&filter, Some(&OrderBy::asc("position")), None)
}

fn default_size(ctx: &Context, axis: Axis) -> u32 {
    match axis {
        Axis::Row => ctx.settings.structure.default_row_size,
        Axis::Col => ctx.settings.structure.default_col_size,
    }
}

/// Insert `table` as new rows starting at `from_pos`.
///
/// Existing rows at or after `from_pos` move down by `table.len()`. Rows
/// shorter than the column count are padded with nulls; longer rows are
/// rejected. A sheet without columns gets them from the first row's width.
pub fn insert_rows_from_position(
    ctx: &mut Context,
    sheet: SheetId,
    table: &[Vec<CellValue>],
    from_pos: usize,
) -> Result<Vec<Sindex>> {
    insert_lines(ctx, sheet, Axis::Row, table, from_pos)
}

/// Insert `table` as new columns starting at `from_pos`.
///
/// The table is column-major: `table[k]` holds the values of the k-th new
/// column, top to bottom.
pub fn insert_cols_from_position(
    ctx: &mut Context,
    sheet: SheetId,
    table: &[Vec<CellValue>],
    from_pos: usize,
) -> Result<Vec<Sindex>> {
    insert_lines(ctx, sheet, Axis::Col, table, from_pos)
}

/// Insert rows after the last one.
///
/// Like the other inserts, fails with `Unsupported` on a sheet that other
/// sheets follow.
pub fn append_rows(ctx: &mut Context, sheet: SheetId, table: &[Vec<CellValue>]) -> Result<Vec<Sindex>> {
    let rows = ctx.repos.sheets.get_one_by_id(sheet)?.rows();
    insert_lines(ctx, sheet, Axis::Row, table, rows)
}

fn insert_lines(
    ctx: &mut Context,
    sheet: SheetId,
    axis: Axis,
    table: &[Vec<CellValue>],
    from_pos: usize,
) -> Result<Vec<Sindex>> {
    let old_info = ctx.repos.sheets.get_one_by_id(sheet)?;
    let len = old_info.len(axis);
    if from_pos > len {
        return Err(EngineError::PositionOutOfRange { axis, position: from_pos, len });
    }
    // Followers only learn about deletions and value changes
    if has_live_followers(ctx, &old_info) {
        return Err(EngineError::Unsupported("inserting into a sheet that other sheets follow"));
    }
    if table.is_empty() {
        return Ok(Vec::new());
    }

    let cross = axis.other();
    let existing_cross = sindexes_on(ctx, sheet, cross)?;
    let width = if existing_cross.is_empty() {
        table[0].len()
    } else {
        existing_cross.len()
    };
    if let Some((line, values)) = table.iter().enumerate().find(|(_, v)| v.len() > width) {
        return Err(EngineError::RaggedTable { row: line, width: values.len(), cols: width });
    }

    let mut info = old_info.clone();
    let count = table.len();

    // Shift everything at or after the insertion point
    let shifted = ctx.repos.sindexes.get_many(
        &Filter::new()
            .eq("sheet_id", sheet)
            .eq("axis", axis)
            .gte("position", from_pos),
        Some(&OrderBy::asc("position")),
        None,
    )?;
    let mut moved = Vec::with_capacity(shifted.len());
    for sindex in &shifted {
        let mut updated = sindex.clone();
        updated.position += count;
        moved.push(updated);
    }
    ctx.repos.sindexes.update_many(moved.clone())?;

    // A sheet without cross sindexes gets them now; existing lines are filled with nulls
    let cross_sindexes = if existing_cross.is_empty() && width > 0 {
        let cross_size = default_size(ctx, cross);
        let created: Vec<Sindex> =
            (0..width).map(|p| Sindex::new(sheet, cross, p, cross_size)).collect();
        let lines = sindexes_on(ctx, sheet, axis)?;
        let mut padding = Vec::with_capacity(lines.len() * width);
        for line in &lines {
            for other in &created {
                padding.push(place(sheet, axis, line.id, other.id, CellValue::Null));
            }
        }
        ctx.repos.sindexes.add_many(created.clone())?;
        ctx.repos.cells.add_many(padding)?;
        info.set_len(cross, width);
        created
    } else {
        existing_cross
    };

    let size = default_size(ctx, axis);
    let mut inserted = Vec::with_capacity(count);
    let mut cells = Vec::with_capacity(count * width);
    for (k, values) in table.iter().enumerate() {
        let line = Sindex::new(sheet, axis, from_pos + k, size);
        for (j, other) in cross_sindexes.iter().enumerate() {
            let value = values.get(j).cloned().unwrap_or_default();
            cells.push(place(sheet, axis, line.id, other.id, value));
        }
        inserted.push(line);
    }
    ctx.repos.sindexes.add_many(inserted.clone())?;
    ctx.repos.cells.add_many(cells)?;

    for (old, new) in shifted.into_iter().zip(moved) {
        ctx.queue.updated(old, new);
    }
    info.set_len(axis, len + count);
    ctx.repos.sheets.update_one(info.clone())?;
    ctx.queue.updated(old_info, info);

    log::debug!("inserted {count} {axis}(s) at {from_pos} into {sheet}");
    Ok(inserted)
}

/// Build a cell for a line on `axis` crossing `other`.
fn place(sheet: SheetId, axis: Axis, line: SindexId, other: SindexId, value: CellValue) -> Cell {
    match axis {
        Axis::Row => Cell::new(sheet, line, other, value),
        Axis::Col => Cell::new(sheet, other, line, value),
    }
}

/// Delete `count` sindexes on `axis` starting at `from_pos`, with their cells,
/// then reindex the rest.
pub fn delete_sindexes_from_position(
    ctx: &mut Context,
    sheet: SheetId,
    from_pos: usize,
    count: usize,
    axis: Axis,
) -> Result<()> {
    let old_info = ctx.repos.sheets.get_one_by_id(sheet)?;
    let len = old_info.len(axis);
    let end = match from_pos.checked_add(count) {
        Some(end) if end <= len => end,
        end => {
            let position = end.unwrap_or(usize::MAX);
            return Err(EngineError::PositionOutOfRange { axis, position, len });
        }
    };
    if count == 0 {
        return Ok(());
    }

    let targets = ctx.repos.sindexes.get_many(
        &Filter::new()
            .eq("sheet_id", sheet)
            .eq("axis", axis)
            .gte("position", from_pos)
            .lt("position", end),
        Some(&OrderBy::asc("position")),
        None,
    )?;
    if targets.len() != count {
        return Err(EngineError::Invariant(format!(
            "{sheet} has {} {axis}(s) in {}..{}, expected {count}",
            targets.len(),
            from_pos,
            end
        )));
    }

    let target_ids: Vec<SindexId> = targets.iter().map(|s| s.id).collect();
    let field = match axis {
        Axis::Row => "row_id",
        Axis::Col => "col_id",
    };
    let cells = ctx.repos.cells.get_many(
        &Filter::new().eq("sheet_id", sheet).is_in(field, target_ids.clone()),
        None,
        None,
    )?;
    let cell_ids: Vec<CellId> = cells.iter().map(|c| c.id).collect();

    ctx.repos.cells.remove_many(&cell_ids)?;
    ctx.repos.sindexes.remove_many(&target_ids)?;
    for cell in cells {
        ctx.queue.deleted(cell);
    }
    for sindex in targets {
        ctx.queue.deleted(sindex);
    }

    reindex(ctx, sheet, axis)?;

    let mut info = old_info.clone();
    info.set_len(axis, len - count);
    ctx.repos.sheets.update_one(info.clone())?;
    ctx.queue.updated(old_info, info);

    log::debug!("deleted {count} {axis}(s) at {from_pos} from {sheet}");
    Ok(())
}

/// Renumber the sindexes of `axis` to `0..N` in their current order.
///
/// Single pass; only sindexes whose position differs are written. Returns
/// the number of sindexes moved.
pub fn reindex(ctx: &mut Context, sheet: SheetId, axis: Axis) -> Result<usize> {
    let mut changed = Vec::new();
    for (expected, sindex) in sindexes_on(ctx, sheet, axis)?.into_iter().enumerate() {
        if sindex.position != expected {
            let mut updated = sindex.clone();
            updated.position = expected;
            changed.push((sindex, updated));
        }
    }

    let moved = changed.len();
    ctx.repos
        .sindexes
        .update_many(changed.iter().map(|(_, new)| new.clone()).collect())?;
    for (old, new) in changed {
        ctx.queue.updated(old, new);
    }
    if moved > 0 {
        log::trace!("reindexed {moved} {axis}(s) of {sheet}");
    }
    Ok(moved)
}

/// Set a cell's value. Returns the stored cell.
pub fn update_cell_value(ctx: &mut Context, id: CellId, value: CellValue) -> Result<Cell> {
    let old = ctx.repos.cells.get_one_by_id(id)?;
    if old.value == value {
        return Ok(old);
    }
    let mut cell = old.clone();
    cell.value = value;
    ctx.repos.cells.update_one(cell.clone())?;
    ctx.queue.updated(old, cell.clone());
    Ok(cell)
}

pub fn update_cell_background(ctx: &mut Context, id: CellId, background: Option<String>) -> Result<Cell> {
    let old = ctx.repos.cells.get_one_by_id(id)?;
    if old.background == background {
        return Ok(old);
    }
    let mut cell = old.clone();
    cell.background = background;
    ctx.repos.cells.update_one(cell.clone())?;
    ctx.queue.updated(old, cell.clone());
    Ok(cell)
}

/// Replace a sindex's presentation fields (size, read-only, freeze).
///
/// Position, axis and owning sheet change only through structural operations.
pub fn update_sindex(ctx: &mut Context, sindex: Sindex) -> Result<()> {
    let old = ctx.repos.sindexes.get_one_by_id(sindex.id)?;
    if old.position != sindex.position || old.axis != sindex.axis || old.sheet_id != sindex.sheet_id {
        return Err(EngineError::Invariant(format!(
            "{} can only move through insert or delete",
            sindex.id
        )));
    }
    if old == sindex {
        return Ok(());
    }
    ctx.repos.sindexes.update_one(sindex.clone())?;
    ctx.queue.updated(old, sindex);
    Ok(())
}

/// Whether any sheet derived from `info` still exists.
fn has_live_followers(ctx: &Context, info: &SheetInfo) -> bool {
    ctx.broker
        .get_subscribers(info.key())
        .into_iter()
        .any(|key| ctx.repos.contains(key))
}

/// Delete a sheet with everything it owns.
///
/// A sheet that other sheets follow cannot be deleted.
pub fn delete_sheet(ctx: &mut Context, id: SheetId) -> Result<()> {
    let info = ctx.repos.sheets.get_one_by_id(id)?;
    if has_live_followers(ctx, &info) {
        return Err(EngineError::Unsupported("deleting a sheet that other sheets follow"));
    }

    let by_sheet = Filter::new().eq("sheet_id", id);
    let cells = ctx.repos.cells.get_many(&by_sheet, None, None)?;
    let sindexes = ctx
        .repos
        .sindexes
        .get_many(&by_sheet, Some(&OrderBy::by(&["axis", "position"], true)), None)?;

    let cell_ids: Vec<CellId> = cells.iter().map(|c| c.id).collect();
    let sindex_ids: Vec<SindexId> = sindexes.iter().map(|s| s.id).collect();
    ctx.repos.cells.remove_many(&cell_ids)?;
    ctx.repos.sindexes.remove_many(&sindex_ids)?;
    ctx.repos.sheets.remove_many(&[id])?;

    for cell in cells {
        ctx.queue.deleted(cell);
    }
    for sindex in sindexes {
        ctx.queue.deleted(sindex);
    }
    ctx.queue.deleted(info);

    log::debug!("deleted {id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventKind};

    fn ints(values: &[i64]) -> Vec<CellValue> {
        values.iter().map(|&v| CellValue::Int(v)).collect()
    }

    fn int_table(rows: &[&[i64]]) -> Vec<Vec<CellValue>> {
        rows.iter()
            .map(|r| r.iter().map(|&v| CellValue::Int(v)).collect())
            .collect()
    }

    fn sheet_with(ctx: &mut Context, rows: &[&[i64]]) -> SheetId {
        let info = create_sheet(ctx, "S", SheetKind::Regular).unwrap();
        insert_rows_from_position(ctx, info.id, &int_table(rows), 0).unwrap();
        ctx.queue.clear();
        info.id
    }

    fn positions(ctx: &Context, sheet: SheetId, axis: Axis) -> Vec<usize> {
        sindexes_on(ctx, sheet, axis).unwrap().iter().map(|s| s.position).collect()
    }

    #[test]
    fn test_insert_into_empty_creates_columns() {
        let mut ctx = Context::default();
        let sheet = sheet_with(&mut ctx, &[&[1, 2, 3], &[4, 5, 6]]);

        let loaded = load_sheet(&ctx, sheet).unwrap();
        assert_eq!(loaded.info.size, (2, 3));
        assert_eq!(loaded.cell(1, 2).unwrap().value, CellValue::Int(6));
        assert_eq!(positions(&ctx, sheet, Axis::Col), vec![0, 1, 2]);
    }

    #[test]
    fn test_insert_at_position_shifts() {
        let mut ctx = Context::default();
        let sheet = sheet_with(&mut ctx, &[&[0], &[1], &[2]]);
        let original = sindexes_on(&ctx, sheet, Axis::Row).unwrap();

        let inserted =
            insert_rows_from_position(&mut ctx, sheet, &int_table(&[&[10], &[11]]), 1).unwrap();

        assert_eq!(inserted.iter().map(|s| s.position).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(ctx.repos.sindexes.get_one_by_id(original[1].id).unwrap().position, 3);
        assert_eq!(ctx.repos.sindexes.get_one_by_id(original[0].id).unwrap().position, 0);
        assert_eq!(positions(&ctx, sheet, Axis::Row), vec![0, 1, 2, 3, 4]);

        let grid = load_sheet(&ctx, sheet).unwrap().value_grid();
        let column: Vec<CellValue> = grid.into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(column, ints(&[0, 10, 11, 1, 2]));

        // Two shifted sindexes, then the sheet
        let kinds: Vec<EventKind> = ctx.queue.iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::SINDEX_UPDATED, EventKind::SINDEX_UPDATED, EventKind::SHEET_UPDATED]
        );
    }

    #[test]
    fn test_ragged_rows() {
        let mut ctx = Context::default();
        let sheet = sheet_with(&mut ctx, &[&[1, 2, 3]]);

        // Short rows are padded
        insert_rows_from_position(&mut ctx, sheet, &int_table(&[&[7]]), 1).unwrap();
        let loaded = load_sheet(&ctx, sheet).unwrap();
        assert_eq!(loaded.cell(1, 0).unwrap().value, CellValue::Int(7));
        assert!(loaded.cell(1, 2).unwrap().value.is_null());

        // Long rows are rejected before anything is written
        let err = insert_rows_from_position(&mut ctx, sheet, &int_table(&[&[1, 2, 3, 4]]), 0)
            .unwrap_err();
        assert!(matches!(err, EngineError::RaggedTable { row: 0, width: 4, cols: 3 }));
        assert_eq!(load_sheet(&ctx, sheet).unwrap().info.size, (2, 3));
    }

    #[test]
    fn test_insert_out_of_range() {
        let mut ctx = Context::default();
        let sheet = sheet_with(&mut ctx, &[&[1]]);
        let err = insert_rows_from_position(&mut ctx, sheet, &int_table(&[&[1]]), 5).unwrap_err();
        assert!(matches!(err, EngineError::PositionOutOfRange { axis: Axis::Row, position: 5, len: 1 }));
    }

    #[test]
    fn test_insert_cols() {
        let mut ctx = Context::default();
        let sheet = sheet_with(&mut ctx, &[&[1, 2], &[3, 4]]);

        insert_cols_from_position(&mut ctx, sheet, &int_table(&[&[9, 9]]), 1).unwrap();
        let grid = load_sheet(&ctx, sheet).unwrap().value_grid();
        assert_eq!(grid[0], ints(&[1, 9, 2]));
        assert_eq!(grid[1], ints(&[3, 9, 4]));
    }

    #[test]
    fn test_append_rows() {
        let mut ctx = Context::default();
        let sheet = sheet_with(&mut ctx, &[&[1, 2]]);
        let appended = append_rows(&mut ctx, sheet, &int_table(&[&[3, 4]])).unwrap();
        assert_eq!(appended[0].position, 1);
        assert_eq!(load_sheet(&ctx, sheet).unwrap().values(), ints(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_delete_and_reindex() {
        let mut ctx = Context::default();
        let sheet = sheet_with(&mut ctx, &[&[0, 0], &[1, 1], &[2, 2], &[3, 3]]);

        delete_sindexes_from_position(&mut ctx, sheet, 1, 2, Axis::Row).unwrap();

        let loaded = load_sheet(&ctx, sheet).unwrap();
        assert_eq!(loaded.info.size, (2, 2));
        assert_eq!(positions(&ctx, sheet, Axis::Row), vec![0, 1]);
        assert_eq!(loaded.cell(1, 0).unwrap().value, CellValue::Int(3));

        // 4 cells, 2 rows, 1 moved row, the sheet
        let kinds: Vec<EventKind> = ctx.queue.iter().map(Event::kind).collect();
        assert_eq!(kinds.iter().filter(|k| **k == EventKind::CELL_DELETED).count(), 4);
        assert_eq!(kinds.iter().filter(|k| **k == EventKind::SINDEX_DELETED).count(), 2);
        assert_eq!(kinds.iter().filter(|k| **k == EventKind::SINDEX_UPDATED).count(), 1);
        assert_eq!(kinds.last(), Some(&EventKind::SHEET_UPDATED));
        assert_eq!(kinds[0], EventKind::CELL_DELETED);
    }

    #[test]
    fn test_delete_out_of_range() {
        let mut ctx = Context::default();
        let sheet = sheet_with(&mut ctx, &[&[0], &[1]]);
        assert!(delete_sindexes_from_position(&mut ctx, sheet, 1, 2, Axis::Row).is_err());
        assert_eq!(positions(&ctx, sheet, Axis::Row), vec![0, 1]);
        assert!(ctx.queue.is_empty());
    }

    #[test]
    fn test_delete_range_end_overflow() {
        let mut ctx = Context::default();
        let sheet = sheet_with(&mut ctx, &[&[0], &[1]]);

        let err = delete_sindexes_from_position(&mut ctx, sheet, 1, usize::MAX, Axis::Row).unwrap_err();
        assert!(matches!(
            err,
            EngineError::PositionOutOfRange { axis: Axis::Row, position: usize::MAX, len: 2 }
        ));
        let err = delete_sindexes_from_position(&mut ctx, sheet, usize::MAX, 1, Axis::Col).unwrap_err();
        assert!(matches!(err, EngineError::PositionOutOfRange { axis: Axis::Col, .. }));
        assert_eq!(positions(&ctx, sheet, Axis::Row), vec![0, 1]);
        assert!(ctx.queue.is_empty());
    }

    #[test]
    fn test_reindex_writes_only_mismatches() {
        let mut ctx = Context::default();
        let sheet = sheet_with(&mut ctx, &[&[0], &[1], &[2]]);
        let rows = sindexes_on(&ctx, sheet, Axis::Row).unwrap();
        ctx.repos.sindexes.remove_many(&[rows[0].id]).unwrap();

        assert_eq!(reindex(&mut ctx, sheet, Axis::Row).unwrap(), 2);
        assert_eq!(reindex(&mut ctx, sheet, Axis::Row).unwrap(), 0);
        assert_eq!(positions(&ctx, sheet, Axis::Row), vec![0, 1]);
    }

    #[test]
    fn test_update_sindex_rejects_move() {
        let mut ctx = Context::default();
        let sheet = sheet_with(&mut ctx, &[&[0], &[1]]);
        let mut row = sindexes_on(&ctx, sheet, Axis::Row).unwrap().remove(0);

        row.is_freeze = true;
        update_sindex(&mut ctx, row.clone()).unwrap();
        assert!(ctx.repos.sindexes.get_one_by_id(row.id).unwrap().is_freeze);
        assert_eq!(ctx.queue.len(), 1);

        row.position = 1;
        assert!(update_sindex(&mut ctx, row).is_err());
    }

    #[test]
    fn test_update_cell_value_skips_same_value() {
        let mut ctx = Context::default();
        let sheet = sheet_with(&mut ctx, &[&[5]]);
        let cell = load_sheet(&ctx, sheet).unwrap().cells.remove(0);

        update_cell_value(&mut ctx, cell.id, CellValue::Int(5)).unwrap();
        assert!(ctx.queue.is_empty());
        let updated = update_cell_value(&mut ctx, cell.id, CellValue::Int(6)).unwrap();
        assert_eq!(updated.value, CellValue::Int(6));
        assert_eq!(ctx.queue.len(), 1);

        update_cell_background(&mut ctx, cell.id, Some("#ffeeee".into())).unwrap();
        assert_eq!(
            ctx.repos.cells.get_one_by_id(cell.id).unwrap().background.as_deref(),
            Some("#ffeeee")
        );
    }

    #[test]
    fn test_delete_sheet() {
        let mut ctx = Context::default();
        let sheet = sheet_with(&mut ctx, &[&[1, 2]]);

        delete_sheet(&mut ctx, sheet).unwrap();
        assert!(!ctx.repos.sheets.contains(sheet));
        assert!(sindexes_on(&ctx, sheet, Axis::Col).unwrap().is_empty());

        let kinds: Vec<EventKind> = ctx.queue.iter().map(Event::kind).collect();
        assert_eq!(kinds.len(), 2 + 3 + 1);
        assert_eq!(kinds.last(), Some(&EventKind::SHEET_DELETED));
    }
}
