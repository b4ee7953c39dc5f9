//! Effective-format resolution.
//!
//! A cell's format is the shallow merge of up to five style layers, lowest precedence first:
//! sheet default, column default, row default, covering range run, explicit cell style.
//! Results are memoized per five-id tuple, so a sheet with a handful of distinct layer
//! combinations costs a handful of merges no matter how many cells are read.

use rustc_hash::FxHashMap;
use sheetlens_core::{
    Cell, CellCoord, CellFormat, CellRange, CellStore, SheetId, StyleId, StyleLayers,
};

use crate::epoch::{Epoch, Stamped};
use crate::run_index::{self, RunIndex};

/// The style id each layer contributes to one cell; `0` means the layer is absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LayerIds {
    pub sheet: StyleId,
    pub col: StyleId,
    pub row: StyleId,
    pub range_run: StyleId,
    pub cell: StyleId,
}

impl LayerIds {
    /// Single-layer tuple for stores without layering support
    pub fn cell_only(cell: StyleId) -> Self {
        LayerIds {
            cell,
            ..LayerIds::default()
        }
    }

    /// Gather the layer ids of one cell straight from the store
    pub fn for_cell<S: CellStore + ?Sized>(store: &S, sheet: SheetId, coord: CellCoord) -> Self {
        let cell = store.cell(sheet, coord).style_id;
        match store.layers() {
            Some(layers) => LayerIds {
                sheet: layers.sheet_default_style_id(sheet),
                col: layers.col_style_id(sheet, coord.col),
                row: layers.row_style_id(sheet, coord.row),
                range_run: store
                    .format_runs_for_column(sheet, coord.col)
                    .and_then(|runs| run_index::locate(runs, coord.row))
                    .map_or(0, |run| run.style_id),
                cell,
            },
            None => LayerIds::cell_only(cell),
        }
    }

    /// Lowest precedence first
    pub fn in_precedence_order(self) -> [StyleId; 5] {
        [self.sheet, self.col, self.row, self.range_run, self.cell]
    }

    /// The same tuple without the explicit cell layer: what the cell would inherit
    pub fn inherited(self) -> Self {
        LayerIds { cell: 0, ..self }
    }

    pub fn is_unstyled(self) -> bool {
        self == LayerIds::default()
    }
}

/// Walks a rectangle row by row, pairing each stored cell with its layer ids.
///
/// Column defaults and run cursors are set up once; rows must be requested in ascending order.
pub struct LayerScan<'s, S: CellStore + ?Sized> {
    store: &'s S,
    sheet: SheetId,
    layers: Option<&'s dyn StyleLayers>,
    sheet_default: StyleId,
    columns: Vec<(u32, StyleId, RunIndex<'s>)>,
}

impl<'s, S: CellStore + ?Sized> LayerScan<'s, S> {
    pub fn new(store: &'s S, sheet: SheetId, range: CellRange) -> Self {
        let layers = store.layers();
        let columns = (range.start.col..=range.end.col)
            .map(|col| {
                let col_default = layers.map_or(0, |l| l.col_style_id(sheet, col));
                let runs = store.format_runs_for_column(sheet, col).unwrap_or(&[]);
                (col, col_default, RunIndex::sequential(runs))
            })
            .collect();
        Self {
            store,
            sheet,
            layers,
            sheet_default: layers.map_or(0, |l| l.sheet_default_style_id(sheet)),
            columns,
        }
    }

    /// Stored cells of `row` across the scanned columns, left to right, with their layer ids
    pub fn row(&mut self, row: u32) -> Vec<(CellCoord, Cell, LayerIds)> {
        let (store, sheet, layers) = (self.store, self.sheet, self.layers);
        let sheet_default = self.sheet_default;
        let row_default = layers.map_or(0, |l| l.row_style_id(sheet, row));
        self.columns
            .iter_mut()
            .map(|(col, col_default, runs)| {
                let coord = CellCoord::new(row, *col);
                let cell = store.cell(sheet, coord);
                let ids = match layers {
                    Some(_) => LayerIds {
                        sheet: sheet_default,
                        col: *col_default,
                        row: row_default,
                        range_run: runs.style_at(row),
                        cell: cell.style_id,
                    },
                    None => LayerIds::cell_only(cell.style_id),
                };
                (coord, cell, ids)
            })
            .collect()
    }
}

/// Memoizing resolver from [`LayerIds`] to the effective [`CellFormat`]
#[derive(Debug, Default)]
pub struct FormatResolver {
    cache: Stamped<FxHashMap<LayerIds, Option<CellFormat>>>,
    merges: u64,
}

impl FormatResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective format for `layers`, or `None` when no layer contributes a property
    pub fn resolve<S: CellStore + ?Sized>(
        &mut self,
        store: &S,
        layers: LayerIds,
        epoch: Epoch,
    ) -> Option<CellFormat> {
        if layers.is_unstyled() {
            return None;
        }

        let cache = self.cache.current_mut(epoch);
        if let Some(hit) = cache.get(&layers) {
            return hit.clone();
        }

        self.merges += 1;
        let mut merged = CellFormat::default();
        for id in layers.in_precedence_order() {
            if let Some(style) = store.resolve_style(id) {
                merged.merge_over(&style.format());
            }
        }
        let resolved = (!merged.is_empty()).then_some(merged);
        cache.insert(layers, resolved.clone());
        resolved
    }

    /// Number of cache misses that required a merge; useful for cache diagnostics
    pub fn merges(&self) -> u64 {
        self.merges
    }
}
