//! Store seam consumed by the resolution engine.
//!
//! A store owns the authoritative cell contents, the interned style table and the
//! formatting layers. The engine only reads through [`CellStore`] and mutates through its
//! batched entry points; anything cached on top of a store is derived and rebuildable.

use crate::cell::{Cell, Scalar};
use crate::error::StoreError;
use crate::format::{CellFormat, Style, StyleId};
use crate::range::{CellCoord, CellRange};
use crate::runs::FormatRun;
use crate::workbook::SheetId;

/// Sheet, column and row default style ids.
///
/// Stores that cannot provide these return `None` from [`CellStore::layers`], which puts the
/// resolver into single-layer mode (only the per-cell style id counts).
pub trait StyleLayers {
    fn sheet_default_style_id(&self, sheet: SheetId) -> StyleId;

    fn row_style_id(&self, sheet: SheetId, row: u32) -> StyleId;

    fn col_style_id(&self, sheet: SheetId, col: u32) -> StyleId;
}

pub trait CellStore {
    /// Resolve a sheet name (case-insensitive) to its id
    fn sheet_id(&self, name: &str) -> Option<SheetId>;

    fn sheet_name(&self, sheet: SheetId) -> Option<&str>;

    /// The stored cell, or an empty cell when nothing is stored there
    fn cell(&self, sheet: SheetId, coord: CellCoord) -> Cell;

    /// Style table lookup. Id `0` always resolves to `None`.
    fn resolve_style(&self, style_id: StyleId) -> Option<&Style>;

    /// Sorted, non-overlapping runs for a column, if the column has any
    fn format_runs_for_column(&self, sheet: SheetId, col: u32) -> Option<&[FormatRun]>;

    fn layers(&self) -> Option<&dyn StyleLayers> {
        None
    }

    /// Stored cells in row-major order
    fn non_empty_cells(&self, sheet: SheetId) -> Vec<(CellCoord, Cell)>;

    fn last_used_row(&self, sheet: SheetId) -> Option<u32>;

    fn begin_batch(&mut self);

    fn commit_batch(&mut self) -> Result<(), StoreError>;

    /// Replace the cell content with a literal value (clears any formula)
    fn set_cell_value(
        &mut self,
        sheet: SheetId,
        coord: CellCoord,
        value: Scalar,
    ) -> Result<(), StoreError>;

    /// Replace the cell content with a formula (clears any cached value)
    fn set_cell_formula(
        &mut self,
        sheet: SheetId,
        coord: CellCoord,
        formula: String,
    ) -> Result<(), StoreError>;

    /// Replace the explicit per-cell style; the empty style removes it
    fn set_cell_style(
        &mut self,
        sheet: SheetId,
        coord: CellCoord,
        style: Style,
    ) -> Result<(), StoreError>;

    /// Overlay `patch` on a rectangle. `Ok(false)` means the store refused the request.
    fn set_range_format(
        &mut self,
        sheet: SheetId,
        range: CellRange,
        patch: &CellFormat,
    ) -> Result<bool, StoreError>;
}
