use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cell::{Cell, Scalar};
use crate::error::StoreError;
use crate::format::{CellFormat, Style, StyleId, StyleTable};
use crate::range::{CellCoord, CellRange};
use crate::runs::FormatRun;
use crate::sheet::Sheet;
use crate::store::{CellStore, StyleLayers};

/// Stable sheet identifier; survives renames and reordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SheetId(pub u32);

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Default cap on the number of cells a single range-format request may cover
pub const DEFAULT_MAX_FORMAT_CELLS: u64 = 5_000_000;

/// In-memory workbook store: sheets, the interned style table and batch bookkeeping.
///
/// Cloning produces a fully independent store, which is what speculative previews run on.
#[derive(Debug, Clone)]
pub struct Workbook {
    /// Workbook name (usually the file name)
    pub name: String,
    sheets: Vec<Sheet>,
    next_sheet_id: u32,
    styles: StyleTable,
    batch_depth: u32,
    committed_batches: u64,
    max_format_cells: u64,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

impl Workbook {
    /// Create a new workbook with a default sheet
    pub fn new(name: impl Into<String>) -> Self {
        let mut wb = Self::empty(name);
        wb.sheets.push(Sheet::new(SheetId(1), "Sheet1"));
        wb.next_sheet_id = 2;
        wb
    }

    /// Create a workbook with no sheets
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sheets: Vec::new(),
            next_sheet_id: 1,
            styles: StyleTable::new(),
            batch_depth: 0,
            committed_batches: 0,
            max_format_cells: DEFAULT_MAX_FORMAT_CELLS,
        }
    }

    /// Builder pattern: set the range-format capacity guard
    pub fn with_max_format_cells(mut self, max: u64) -> Self {
        self.max_format_cells = max;
        self
    }

    pub fn add_sheet(&mut self, name: impl Into<String>) -> Result<SheetId, StoreError> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(StoreError::InvalidSheetName("Name cannot be empty".to_string()));
        }
        if self.sheet_id(&name).is_some() {
            return Err(StoreError::SheetNameExists(name));
        }

        let id = SheetId(self.next_sheet_id);
        self.next_sheet_id += 1;
        self.sheets.push(Sheet::new(id, name));
        Ok(id)
    }

    pub fn sheet(&self, id: SheetId) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.id() == id)
    }

    pub fn sheet_mut(&mut self, id: SheetId) -> Result<&mut Sheet, StoreError> {
        self.sheets
            .iter_mut()
            .find(|s| s.id() == id)
            .ok_or(StoreError::SheetNotFound(id))
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn styles(&self) -> &StyleTable {
        &self.styles
    }

    pub fn intern_style(&mut self, style: Style) -> StyleId {
        self.styles.intern(style)
    }

    /// Store a cell as-is (import path: cached formula results are kept)
    pub fn put_cell(&mut self, sheet: SheetId, coord: CellCoord, cell: Cell) -> Result<(), StoreError> {
        self.sheet_mut(sheet)?.set_cell(coord, cell);
        Ok(())
    }

    pub fn set_sheet_default_style(&mut self, sheet: SheetId, style: Style) -> Result<StyleId, StoreError> {
        let id = self.styles.intern(style);
        self.sheet_mut(sheet)?.set_default_style_id(id);
        Ok(id)
    }

    pub fn set_row_style(&mut self, sheet: SheetId, row: u32, style: Style) -> Result<StyleId, StoreError> {
        let id = self.styles.intern(style);
        self.sheet_mut(sheet)?.set_row_style_id(row, id);
        Ok(id)
    }

    pub fn set_col_style(&mut self, sheet: SheetId, col: u32, style: Style) -> Result<StyleId, StoreError> {
        let id = self.styles.intern(style);
        self.sheet_mut(sheet)?.set_col_style_id(col, id);
        Ok(id)
    }

    pub fn set_format_runs(&mut self, sheet: SheetId, col: u32, runs: Vec<FormatRun>) -> Result<(), StoreError> {
        self.sheet_mut(sheet)?.set_format_runs(col, runs)
    }

    pub fn is_batch_open(&self) -> bool {
        self.batch_depth > 0
    }

    /// Number of outermost batches committed so far
    pub fn committed_batches(&self) -> u64 {
        self.committed_batches
    }
}

impl StyleLayers for Workbook {
    fn sheet_default_style_id(&self, sheet: SheetId) -> StyleId {
        self.sheet(sheet).map_or(0, Sheet::default_style_id)
    }

    fn row_style_id(&self, sheet: SheetId, row: u32) -> StyleId {
        self.sheet(sheet).map_or(0, |s| s.row_style_id(row))
    }

    fn col_style_id(&self, sheet: SheetId, col: u32) -> StyleId {
        self.sheet(sheet).map_or(0, |s| s.col_style_id(col))
    }
}

impl CellStore for Workbook {
    fn sheet_id(&self, name: &str) -> Option<SheetId> {
        let name = name.trim();
        self.sheets
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .map(Sheet::id)
    }

    fn sheet_name(&self, sheet: SheetId) -> Option<&str> {
        self.sheet(sheet).map(|s| s.name.as_str())
    }

    fn cell(&self, sheet: SheetId, coord: CellCoord) -> Cell {
        self.sheet(sheet)
            .and_then(|s| s.get_cell(coord))
            .cloned()
            .unwrap_or_default()
    }

    fn resolve_style(&self, style_id: StyleId) -> Option<&Style> {
        self.styles.get(style_id)
    }

    fn format_runs_for_column(&self, sheet: SheetId, col: u32) -> Option<&[FormatRun]> {
        self.sheet(sheet)?.format_runs(col)
    }

    fn layers(&self) -> Option<&dyn StyleLayers> {
        Some(self)
    }

    fn non_empty_cells(&self, sheet: SheetId) -> Vec<(CellCoord, Cell)> {
        self.sheet(sheet)
            .map(|s| s.non_empty_cells().map(|(c, cell)| (c, cell.clone())).collect())
            .unwrap_or_default()
    }

    fn last_used_row(&self, sheet: SheetId) -> Option<u32> {
        self.sheet(sheet)?.last_used_row()
    }

    fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    fn commit_batch(&mut self) -> Result<(), StoreError> {
        if self.batch_depth == 0 {
            return Err(StoreError::NoOpenBatch);
        }
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.committed_batches += 1;
        }
        Ok(())
    }

    fn set_cell_value(&mut self, sheet: SheetId, coord: CellCoord, value: Scalar) -> Result<(), StoreError> {
        self.sheet_mut(sheet)?.update_cell(coord, |cell| {
            cell.value = value;
            cell.formula = None;
        });
        Ok(())
    }

    fn set_cell_formula(&mut self, sheet: SheetId, coord: CellCoord, formula: String) -> Result<(), StoreError> {
        self.sheet_mut(sheet)?.update_cell(coord, |cell| {
            cell.value = Scalar::Empty;
            cell.formula = Some(formula);
        });
        Ok(())
    }

    fn set_cell_style(&mut self, sheet: SheetId, coord: CellCoord, style: Style) -> Result<(), StoreError> {
        let id = self.styles.intern(style);
        self.sheet_mut(sheet)?.update_cell(coord, |cell| cell.style_id = id);
        Ok(())
    }

    fn set_range_format(&mut self, sheet: SheetId, range: CellRange, patch: &CellFormat) -> Result<bool, StoreError> {
        if range.cell_count() > self.max_format_cells {
            return Ok(false);
        }
        let Self { sheets, styles, .. } = self;
        let sheet = sheets
            .iter_mut()
            .find(|s| s.id() == sheet)
            .ok_or(StoreError::SheetNotFound(sheet))?;
        sheet.apply_range_patch(range, patch, styles);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workbook_creation() {
        let wb = Workbook::new("Test");
        assert_eq!(wb.name, "Test");
        assert_eq!(wb.sheet_count(), 1);
        assert_eq!(wb.sheet_id("sheet1"), Some(SheetId(1)));
        assert_eq!(wb.sheet_name(SheetId(1)), Some("Sheet1"));
    }

    #[test]
    fn test_add_sheet_rejects_duplicates() {
        let mut wb = Workbook::new("Test");
        let id = wb.add_sheet("Data").unwrap();
        assert_eq!(id, SheetId(2));
        assert_eq!(wb.sheet_names(), vec!["Sheet1", "Data"]);
        assert_eq!(wb.add_sheet("DATA"), Err(StoreError::SheetNameExists("DATA".to_string())));
        assert!(matches!(wb.add_sheet("  "), Err(StoreError::InvalidSheetName(_))));
    }

    #[test]
    fn test_value_and_formula_writes_replace_each_other() {
        let mut wb = Workbook::new("Test");
        let s = SheetId(1);
        let a1 = CellCoord::new(0, 0);
        wb.put_cell(s, a1, Cell::formula("=B1").with_cached_value(7.0)).unwrap();

        wb.set_cell_value(s, a1, Scalar::Number(1.0)).unwrap();
        assert_eq!(wb.cell(s, a1), Cell::value(1.0));

        wb.set_cell_formula(s, a1, "=C1".to_string()).unwrap();
        assert_eq!(wb.cell(s, a1), Cell::formula("=C1"));
    }

    #[test]
    fn test_cell_style_writes_intern() {
        let mut wb = Workbook::new("Test");
        let s = SheetId(1);
        let bold = Style::from(CellFormat::new().with_bold(true));
        wb.set_cell_style(s, CellCoord::new(0, 0), bold.clone()).unwrap();
        wb.set_cell_style(s, CellCoord::new(1, 0), bold).unwrap();
        assert_eq!(wb.styles().len(), 1);

        wb.set_cell_style(s, CellCoord::new(0, 0), Style::default()).unwrap();
        assert_eq!(wb.sheet(s).unwrap().get_cell(CellCoord::new(0, 0)), None);
    }

    #[test]
    fn test_batches_nest() {
        let mut wb = Workbook::new("Test");
        assert_eq!(wb.commit_batch(), Err(StoreError::NoOpenBatch));
        wb.begin_batch();
        wb.begin_batch();
        wb.commit_batch().unwrap();
        assert!(wb.is_batch_open());
        wb.commit_batch().unwrap();
        assert!(!wb.is_batch_open());
        assert_eq!(wb.committed_batches(), 1);
    }

    #[test]
    fn test_range_format_capacity_guard() {
        let mut wb = Workbook::new("Test").with_max_format_cells(10);
        let s = SheetId(1);
        let bold = CellFormat::new().with_bold(true);
        let small = CellRange::from_a1("A1:B5").unwrap();
        let large = CellRange::from_a1("A1:C5").unwrap();
        assert_eq!(wb.set_range_format(s, small, &bold), Ok(true));
        assert_eq!(wb.set_range_format(s, large, &bold), Ok(false));
        assert_eq!(
            wb.set_range_format(SheetId(9), small, &bold),
            Err(StoreError::SheetNotFound(SheetId(9)))
        );
    }

    #[test]
    fn test_clone_is_independent() {
        let mut wb = Workbook::new("Test");
        let s = SheetId(1);
        let snapshot = wb.clone();
        wb.set_cell_value(s, CellCoord::new(0, 0), Scalar::Number(1.0)).unwrap();
        assert!(snapshot.cell(s, CellCoord::new(0, 0)).is_empty());
    }
}
