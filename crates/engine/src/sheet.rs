use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CellValue};
use crate::entity_id::{EntityKey, SheetId, SindexId};
use crate::error::{EngineError, Result};

/// Which axis a sindex lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Row,
    Col,
}

impl Axis {
    pub fn tag(&self) -> &'static str {
        match self {
            Axis::Row => "row",
            Axis::Col => "col",
        }
    }

    pub fn other(&self) -> Axis {
        match self {
            Axis::Row => Axis::Col,
            Axis::Col => Axis::Row,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A row or column index record.
///
/// Holds only the owning sheet's id, never the sheet itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sindex {
    pub id: SindexId,
    pub sheet_id: SheetId,
    pub axis: Axis,
    /// 0-based, dense and unique within (sheet, axis)
    pub position: usize,
    /// Display extent in pixels
    pub size: u32,
    pub is_readonly: bool,
    /// Header/index rows and columns copied verbatim by derived sheets
    pub is_freeze: bool,
}

impl Sindex {
    pub fn new(sheet_id: SheetId, axis: Axis, position: usize, size: u32) -> Self {
        Self {
            id: SindexId::new(),
            sheet_id,
            axis,
            position,
            size,
            is_readonly: false,
            is_freeze: false,
        }
    }

    pub fn frozen(mut self, is_freeze: bool) -> Self {
        self.is_freeze = is_freeze;
        self
    }

    pub fn readonly(mut self, is_readonly: bool) -> Self {
        self.is_readonly = is_readonly;
        self
    }

    pub fn key(&self) -> EntityKey {
        self.id.into()
    }
}

/// How a sheet reacts when it follows another sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetKind {
    /// Plain 1:1 mirror of the parent structure
    #[default]
    Regular,
    /// Input/checker row pairs reconciling against the parent
    Checker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub id: SheetId,
    pub name: String,
    pub kind: SheetKind,
    /// `(rows, cols)`
    pub size: (usize, usize),
}

impl SheetInfo {
    pub fn new(name: impl Into<String>, kind: SheetKind) -> Self {
        Self {
            id: SheetId::new(),
            name: name.into(),
            kind,
            size: (0, 0),
        }
    }

    pub fn rows(&self) -> usize {
        self.size.0
    }

    pub fn cols(&self) -> usize {
        self.size.1
    }

    pub fn len(&self, axis: Axis) -> usize {
        match axis {
            Axis::Row => self.size.0,
            Axis::Col => self.size.1,
        }
    }

    pub fn set_len(&mut self, axis: Axis, len: usize) {
        match axis {
            Axis::Row => self.size.0 = len,
            Axis::Col => self.size.1 = len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size == (0, 0)
    }

    pub fn key(&self) -> EntityKey {
        self.id.into()
    }
}

/// A sheet with everything it owns, cells in row-major order.
///
/// # Invariants
///
/// 1. `rows.len() == info.rows()` and `cols.len() == info.cols()`
/// 2. Positions on each axis are exactly `0..N`
/// 3. `cells.len() == rows * cols`
/// 4. `cells[i * cols + j]` sits on `rows[i]` and `cols[j]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub info: SheetInfo,
    pub rows: Vec<Sindex>,
    pub cols: Vec<Sindex>,
    pub cells: Vec<Cell>,
}

impl Sheet {
    /// Arrange loose records into a validated aggregate.
    ///
    /// Sindexes are sorted by position; cells are placed by their row/col ids.
    pub fn assemble(
        info: SheetInfo,
        mut rows: Vec<Sindex>,
        mut cols: Vec<Sindex>,
        cells: Vec<Cell>,
    ) -> Result<Self> {
        rows.sort_by_key(|s| s.position);
        cols.sort_by_key(|s| s.position);

        let row_slot: FxHashMap<SindexId, usize> =
            rows.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
        let col_slot: FxHashMap<SindexId, usize> =
            cols.iter().enumerate().map(|(j, s)| (s.id, j)).collect();

        let width = cols.len();
        let mut grid: Vec<Option<Cell>> = vec![None; rows.len() * width];
        for cell in cells {
            let (Some(&i), Some(&j)) = (row_slot.get(&cell.row_id), col_slot.get(&cell.col_id))
            else {
                return Err(EngineError::Invariant(format!(
                    "{} references a row or column outside {}",
                    cell.id, info.id
                )));
            };
            let slot = &mut grid[i * width + j];
            if slot.is_some() {
                return Err(EngineError::Invariant(format!(
                    "duplicate cell at ({i}, {j}) in {}",
                    info.id
                )));
            }
            *slot = Some(cell);
        }

        let cells = grid
            .into_iter()
            .enumerate()
            .map(|(n, cell)| {
                cell.ok_or_else(|| {
                    EngineError::Invariant(format!(
                        "missing cell at ({}, {}) in {}",
                        n / width.max(1),
                        n % width.max(1),
                        info.id
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let sheet = Self { info, rows, cols, cells };
        sheet.validate()?;
        Ok(sheet)
    }

    /// Check every aggregate invariant.
    pub fn validate(&self) -> Result<()> {
        let (n_rows, n_cols) = self.info.size;
        if self.rows.len() != n_rows || self.cols.len() != n_cols {
            return Err(EngineError::Invariant(format!(
                "{} declares {}x{} but holds {} rows and {} cols",
                self.info.id,
                n_rows,
                n_cols,
                self.rows.len(),
                self.cols.len()
            )));
        }
        for (axis, indexes) in [(Axis::Row, &self.rows), (Axis::Col, &self.cols)] {
            for (expected, sindex) in indexes.iter().enumerate() {
                if sindex.position != expected || sindex.axis != axis {
                    return Err(EngineError::Invariant(format!(
                        "{} {} at slot {} has position {}",
                        axis, sindex.id, expected, sindex.position
                    )));
                }
            }
        }
        if self.cells.len() != n_rows * n_cols {
            return Err(EngineError::Invariant(format!(
                "{} holds {} cells, expected {}",
                self.info.id,
                self.cells.len(),
                n_rows * n_cols
            )));
        }
        for (i, row) in self.rows.iter().enumerate() {
            for (j, col) in self.cols.iter().enumerate() {
                let cell = &self.cells[i * n_cols + j];
                if cell.row_id != row.id || cell.col_id != col.id {
                    return Err(EngineError::Invariant(format!(
                        "{} is not at ({i}, {j})",
                        cell.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        if row >= self.rows.len() || col >= self.cols.len() {
            return None;
        }
        self.cells.get(row * self.cols.len() + col)
    }

    pub fn sindexes(&self, axis: Axis) -> &[Sindex] {
        match axis {
            Axis::Row => &self.rows,
            Axis::Col => &self.cols,
        }
    }

    /// Cell values in row-major order.
    pub fn values(&self) -> Vec<CellValue> {
        self.cells.iter().map(|c| c.value.clone()).collect()
    }

    /// Cell values as a table of rows.
    pub fn value_grid(&self) -> Vec<Vec<CellValue>> {
        let width = self.cols.len();
        if width == 0 {
            return vec![Vec::new(); self.rows.len()];
        }
        self.cells
            .chunks(width)
            .map(|row| row.iter().map(|c| c.value.clone()).collect())
            .collect()
    }
}
