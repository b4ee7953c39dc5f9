use std::collections::{BTreeMap, HashMap};

use crate::cell::Cell;
use crate::error::StoreError;
use crate::format::{CellFormat, StyleId, StyleTable};
use crate::range::{CellCoord, CellRange};
use crate::runs::{validate_runs, FormatRun};
use crate::workbook::SheetId;

/// A single sheet with sparse, row-major cell storage and its formatting layers
#[derive(Debug, Clone)]
pub struct Sheet {
    id: SheetId,
    /// Sheet name (displayed in tab)
    pub name: String,
    /// Only non-empty cells are stored; rows and columns iterate in ascending order
    cells: BTreeMap<u32, BTreeMap<u32, Cell>>,
    default_style_id: StyleId,
    row_styles: HashMap<u32, StyleId>,
    col_styles: HashMap<u32, StyleId>,
    /// Per-column range-run layer
    format_runs: HashMap<u32, Vec<FormatRun>>,
}

impl Sheet {
    /// Maximum number of rows (Excel compatibility)
    pub const MAX_ROWS: u32 = 1_048_576;
    /// Maximum number of columns (Column XFD)
    pub const MAX_COLS: u32 = 16_384;

    pub fn new(id: SheetId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            cells: BTreeMap::new(),
            default_style_id: 0,
            row_styles: HashMap::new(),
            col_styles: HashMap::new(),
            format_runs: HashMap::new(),
        }
    }

    pub fn id(&self) -> SheetId {
        self.id
    }

    pub fn get_cell(&self, coord: CellCoord) -> Option<&Cell> {
        self.cells.get(&coord.row)?.get(&coord.col)
    }

    /// Store a cell, dropping it when it is empty
    pub fn set_cell(&mut self, coord: CellCoord, cell: Cell) {
        if cell.is_empty() {
            self.remove_cell(coord);
        } else {
            self.cells.entry(coord.row).or_default().insert(coord.col, cell);
        }
    }

    /// Mutate a cell in place, creating it if needed and cleaning it up if it ends up empty
    pub fn update_cell(&mut self, coord: CellCoord, f: impl FnOnce(&mut Cell)) {
        let row = self.cells.entry(coord.row).or_default();
        let cell = row.entry(coord.col).or_default();
        f(cell);
        if cell.is_empty() {
            self.remove_cell(coord);
        }
    }

    pub fn remove_cell(&mut self, coord: CellCoord) {
        if let Some(row) = self.cells.get_mut(&coord.row) {
            row.remove(&coord.col);
            if row.is_empty() {
                self.cells.remove(&coord.row);
            }
        }
    }

    /// Number of stored cells (content or style)
    pub fn cell_count(&self) -> usize {
        self.cells.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells with a value or a formula, row-major
    pub fn non_empty_cells(&self) -> impl Iterator<Item = (CellCoord, &Cell)> + '_ {
        self.cells.iter().flat_map(|(&row, cols)| {
            cols.iter()
                .filter(|(_, cell)| has_content(cell))
                .map(move |(&col, cell)| (CellCoord::new(row, col), cell))
        })
    }

    /// Last row holding a value or a formula
    pub fn last_used_row(&self) -> Option<u32> {
        self.cells
            .iter()
            .rev()
            .find(|(_, cols)| cols.values().any(has_content))
            .map(|(&row, _)| row)
    }

    /// Bounding box of the cells holding a value or a formula
    pub fn used_range(&self) -> Option<CellRange> {
        let mut coords = self.non_empty_cells().map(|(coord, _)| coord);
        let first = coords.next()?;
        let (mut min_col, mut max_col, mut max_row) = (first.col, first.col, first.row);
        for coord in coords {
            min_col = min_col.min(coord.col);
            max_col = max_col.max(coord.col);
            max_row = max_row.max(coord.row);
        }
        Some(CellRange::new(
            CellCoord::new(first.row, min_col),
            CellCoord::new(max_row, max_col),
        ))
    }

    pub fn default_style_id(&self) -> StyleId {
        self.default_style_id
    }

    pub fn set_default_style_id(&mut self, style_id: StyleId) {
        self.default_style_id = style_id;
    }

    pub fn row_style_id(&self, row: u32) -> StyleId {
        self.row_styles.get(&row).copied().unwrap_or(0)
    }

    pub fn set_row_style_id(&mut self, row: u32, style_id: StyleId) {
        if style_id == 0 {
            self.row_styles.remove(&row);
        } else {
            self.row_styles.insert(row, style_id);
        }
    }

    pub fn col_style_id(&self, col: u32) -> StyleId {
        self.col_styles.get(&col).copied().unwrap_or(0)
    }

    pub fn set_col_style_id(&mut self, col: u32, style_id: StyleId) {
        if style_id == 0 {
            self.col_styles.remove(&col);
        } else {
            self.col_styles.insert(col, style_id);
        }
    }

    pub fn format_runs(&self, col: u32) -> Option<&[FormatRun]> {
        self.format_runs
            .get(&col)
            .map(Vec::as_slice)
            .filter(|runs| !runs.is_empty())
    }

    /// Replace a column's runs after checking they are sorted and disjoint
    pub fn set_format_runs(&mut self, col: u32, runs: Vec<FormatRun>) -> Result<(), StoreError> {
        validate_runs(&runs).map_err(|reason| StoreError::InvalidFormatRuns { col, reason })?;
        if runs.is_empty() {
            self.format_runs.remove(&col);
        } else {
            self.format_runs.insert(col, runs);
        }
        Ok(())
    }

    /// Overlay `patch` on every row of `range`, the way large range formatting is stored:
    /// the range-run layer of each column is split at the range edges and re-interned, and
    /// explicit cell styles inside the range get the same patch so it stays visible.
    pub fn apply_range_patch(&mut self, range: CellRange, patch: &CellFormat, styles: &mut StyleTable) {
        let start = range.start.row;
        let end = range.end.row.saturating_add(1);
        let mut patched: HashMap<StyleId, StyleId> = HashMap::new();
        let mut patch_id = |id: StyleId, styles: &mut StyleTable| -> StyleId {
            *patched.entry(id).or_insert_with(|| {
                let mut style = styles.get(id).cloned().unwrap_or_default();
                style.apply_patch(patch);
                styles.intern(style)
            })
        };

        for col in range.start.col..=range.end.col {
            let runs = self.format_runs.remove(&col).unwrap_or_default();
            let mut head = Vec::new();
            let mut middle = Vec::new();
            let mut tail = Vec::new();
            let mut cursor = start;

            for run in runs {
                if run.start_row < start {
                    head.push(FormatRun::new(run.start_row, run.end_row_exclusive.min(start), run.style_id));
                }
                let overlap_start = run.start_row.max(start);
                let overlap_end = run.end_row_exclusive.min(end);
                if overlap_start < overlap_end {
                    if cursor < overlap_start {
                        middle.push(FormatRun::new(cursor, overlap_start, patch_id(0, &mut *styles)));
                    }
                    middle.push(FormatRun::new(overlap_start, overlap_end, patch_id(run.style_id, &mut *styles)));
                    cursor = overlap_end;
                }
                if run.end_row_exclusive > end {
                    tail.push(FormatRun::new(run.start_row.max(end), run.end_row_exclusive, run.style_id));
                }
            }
            if cursor < end {
                middle.push(FormatRun::new(cursor, end, patch_id(0, &mut *styles)));
            }

            let merged = coalesce_runs(head.into_iter().chain(middle).chain(tail));
            if !merged.is_empty() {
                self.format_runs.insert(col, merged);
            }
        }

        for (_, cols) in self.cells.range_mut(range.start.row..=range.end.row) {
            for (_, cell) in cols.range_mut(range.start.col..=range.end.col) {
                if cell.style_id != 0 {
                    cell.style_id = patch_id(cell.style_id, &mut *styles);
                }
            }
        }
    }
}

fn has_content(cell: &Cell) -> bool {
    cell.formula.is_some() || !cell.value.is_empty()
}

/// Drop zero-style segments and join touching segments that share a style
fn coalesce_runs(runs: impl Iterator<Item = FormatRun>) -> Vec<FormatRun> {
    let mut out: Vec<FormatRun> = Vec::new();
    for run in runs.filter(|r| r.style_id != 0 && !r.is_empty()) {
        match out.last_mut() {
            Some(last) if last.style_id == run.style_id && last.end_row_exclusive == run.start_row => {
                last.end_row_exclusive = run.end_row_exclusive;
            }
            _ => out.push(run),
        }
    }
    out
}
