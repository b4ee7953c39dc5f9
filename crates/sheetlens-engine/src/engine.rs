use serde::Serialize;
use sheetlens_core::{CellCoord, CellFormat, CellRange, CellStore, Scalar, SheetId};
use tracing::{debug, warn};

use crate::computed::{ComputedValues, EvalContext};
use crate::config::EngineConfig;
use crate::epoch::Epoch;
use crate::error::{EngineError, Result};
use crate::evaluator::FormulaEvaluator;
use crate::resolver::{FormatResolver, LayerScan};
use crate::writer::{self, CellInput, WriteSummary};

/// What a read reports for one cell
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CellSnapshot {
    pub value: Scalar,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Effective format after layering; `None` when nothing applies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<CellFormat>,
}

/// A stored cell as listed by [`SheetEngine::list_non_empty_cells`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NonEmptyCell {
    pub address: String,
    pub value: Scalar,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

/// Read/write facade over a cell store.
///
/// Owns the derived caches (effective formats and computed values). Both are valid for one
/// epoch; every mutation made through the engine starts a new one.
pub struct SheetEngine<S: CellStore, E: FormulaEvaluator> {
    store: S,
    evaluator: E,
    config: EngineConfig,
    epoch: Epoch,
    formats: FormatResolver,
    computed: ComputedValues,
}

impl<S: CellStore, E: FormulaEvaluator> SheetEngine<S, E> {
    pub fn new(store: S, evaluator: E) -> Self {
        Self::with_config(store, evaluator, EngineConfig::default())
    }

    pub fn with_config(store: S, evaluator: E, config: EngineConfig) -> Self {
        Self {
            store,
            evaluator,
            config,
            epoch: Epoch::default(),
            formats: FormatResolver::new(),
            computed: ComputedValues::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable store access for changes made outside the engine; caches are invalidated
    pub fn store_mut(&mut self) -> &mut S {
        self.invalidate_computed_values();
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn format_resolver(&self) -> &FormatResolver {
        &self.formats
    }

    /// Value, formula and effective format of one cell
    pub fn get_cell(&mut self, sheet: &str, address: &str) -> Result<CellSnapshot> {
        let sheet_id = self.resolve_sheet(sheet)?;
        let coord = CellCoord::from_a1(address)
            .ok_or_else(|| EngineError::InvalidAddress(address.to_string()))?;
        let mut rows = self.snapshot(sheet_id, CellRange::single(coord));
        Ok(rows
            .pop()
            .and_then(|mut row| row.pop())
            .unwrap_or_default())
    }

    /// Row-major snapshots of a rectangle
    pub fn read_range(&mut self, sheet: &str, range: &str) -> Result<Vec<Vec<CellSnapshot>>> {
        let sheet_id = self.resolve_sheet(sheet)?;
        let range = parse_range(range)?;
        Ok(self.snapshot(sheet_id, range))
    }

    /// Write contents and formats to a rectangle in one batch; `inputs` must match its shape
    pub fn write_range(
        &mut self,
        sheet: &str,
        range: &str,
        inputs: &[Vec<CellInput>],
    ) -> Result<WriteSummary> {
        let sheet_id = self.resolve_sheet(sheet)?;
        let range = parse_range(range)?;
        let result = writer::write_range(
            &mut self.store,
            &mut self.formats,
            self.epoch,
            sheet_id,
            range,
            inputs,
        );
        self.invalidate_computed_values();
        result
    }

    /// Overlay `patch` on every cell of a rectangle, including empty ones
    pub fn apply_formatting(&mut self, sheet: &str, range: &str, patch: &CellFormat) -> Result<()> {
        let sheet_id = self.resolve_sheet(sheet)?;
        let range = parse_range(range)?;

        self.store.begin_batch();
        let applied = self.store.set_range_format(sheet_id, range, patch);
        self.store.commit_batch()?;
        let applied = applied?;
        self.invalidate_computed_values();

        if !applied {
            let name = self.store.sheet_name(sheet_id).unwrap_or(sheet);
            let range_name = qualified_range(name, range);
            warn!(
                "store refused to format {} ({} cells)",
                range_name,
                range.cell_count()
            );
            return Err(EngineError::FormatRejected { range: range_name });
        }
        debug!("formatted {} on {}", range, sheet_id);
        Ok(())
    }

    /// Every stored cell of a sheet in row-major order, formula cells with computed values
    pub fn list_non_empty_cells(&mut self, sheet: &str) -> Result<Vec<NonEmptyCell>> {
        let sheet_id = self.resolve_sheet(sheet)?;
        let Self {
            store,
            evaluator,
            config,
            epoch,
            computed,
            ..
        } = self;
        let cells = store.non_empty_cells(sheet_id);
        let mut ctx = EvalContext::new(&*store, &*evaluator, computed, config, *epoch);

        Ok(cells
            .into_iter()
            .filter(|(_, cell)| cell.has_formula() || !cell.value.is_empty())
            .map(|(coord, cell)| NonEmptyCell {
                address: coord.to_a1(),
                value: if cell.has_formula() {
                    ctx.value_at(sheet_id, coord)
                } else {
                    cell.value
                },
                formula: cell.formula,
            })
            .collect())
    }

    pub fn last_used_row(&self, sheet: &str) -> Result<Option<u32>> {
        let sheet_id = self.resolve_sheet(sheet)?;
        Ok(self.store.last_used_row(sheet_id))
    }

    /// Start a new cache epoch. Call after mutating the store behind the engine's back.
    pub fn invalidate_computed_values(&mut self) {
        self.epoch = self.epoch.next();
        self.computed.clear();
        debug!("caches invalidated, epoch {}", self.epoch.get());
    }

    /// Independent copy of the store and engine with empty caches, for speculative edits
    pub fn fork(&self) -> Self
    where
        S: Clone,
        E: Clone,
    {
        Self::with_config(
            self.store.clone(),
            self.evaluator.clone(),
            self.config.clone(),
        )
    }

    fn resolve_sheet(&self, name: &str) -> Result<SheetId> {
        self.store
            .sheet_id(name)
            .ok_or_else(|| EngineError::UnknownSheet(name.to_string()))
    }

    fn snapshot(&mut self, sheet: SheetId, range: CellRange) -> Vec<Vec<CellSnapshot>> {
        let Self {
            store,
            evaluator,
            config,
            epoch,
            formats,
            computed,
        } = self;
        let store = &*store;
        let mut scan = LayerScan::new(store, sheet, range);
        let mut ctx = EvalContext::new(store, &*evaluator, computed, config, *epoch);

        (range.start.row..=range.end.row)
            .map(|row| {
                scan.row(row)
                    .into_iter()
                    .map(|(coord, cell, layers)| CellSnapshot {
                        value: if cell.has_formula() {
                            ctx.value_at(sheet, coord)
                        } else {
                            cell.value
                        },
                        formula: cell.formula,
                        format: formats.resolve(store, layers, *epoch),
                    })
                    .collect()
            })
            .collect()
    }
}

impl<S: CellStore + Clone, E: FormulaEvaluator + Clone> Clone for SheetEngine<S, E> {
    fn clone(&self) -> Self {
        self.fork()
    }
}

fn parse_range(range: &str) -> Result<CellRange> {
    CellRange::from_a1(range).ok_or_else(|| EngineError::InvalidRange(range.to_string()))
}

/// `Sheet1!A1:B2`, quoting the sheet name when it is not a plain identifier
fn qualified_range(sheet: &str, range: CellRange) -> String {
    if sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        format!("{}!{}", sheet, range)
    } else {
        format!("'{}'!{}", sheet.replace('\'', "''"), range)
    }
}
