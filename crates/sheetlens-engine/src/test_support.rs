//! Test doubles shared by the engine's unit tests.

use std::cell::Cell as CallCounter;
use std::rc::Rc;

use sheetlens_core::{
    Cell, CellCoord, CellError, CellFormat, CellRange, CellStore, FormatRun, Scalar, SheetId,
    Style, StoreError, StyleId, Workbook,
};

use crate::error::EvalError;
use crate::evaluator::{CellLookup, EvalOptions, FormulaEvaluator};

/// Tiny formula language: `=term+term+...` where a term is a number, a cell reference
/// (optionally sheet-qualified), `SUM(range)` or `BOOM` (always fails). Any other
/// function call is unsupported.
///
/// Counts calls so tests can assert how often evaluation actually happened. Clones share
/// the counter.
#[derive(Debug, Clone, Default)]
pub struct CountingEvaluator {
    calls: Rc<CallCounter<usize>>,
}

impl CountingEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl FormulaEvaluator for CountingEvaluator {
    fn evaluate(
        &self,
        formula: &str,
        lookup: &mut dyn CellLookup,
        _options: &EvalOptions,
    ) -> Result<Scalar, EvalError> {
        self.calls.set(self.calls.get() + 1);

        let body = formula
            .trim()
            .strip_prefix('=')
            .ok_or_else(|| EvalError::Parse(formula.to_string()))?;

        let mut total = 0.0;
        for term in body.split('+').map(str::trim) {
            if term.eq_ignore_ascii_case("BOOM") {
                return Err(EvalError::Failed("boom".into()));
            }
            let values = if let Ok(n) = term.parse::<f64>() {
                vec![Scalar::Number(n)]
            } else if let Some(inner) = term
                .strip_prefix("SUM(")
                .and_then(|t| t.strip_suffix(')'))
            {
                match lookup.range(inner) {
                    Ok(values) => values,
                    Err(err) => return Ok(Scalar::Error(err)),
                }
            } else if term.contains('(') {
                return Err(EvalError::Unsupported(term.to_string()));
            } else if term.is_empty() {
                return Err(EvalError::Parse(formula.to_string()));
            } else {
                vec![lookup.value(term)]
            };

            for value in values {
                if value.is_error() {
                    return Ok(value);
                }
                match value.as_number() {
                    Some(n) => total += n,
                    None => return Ok(Scalar::Error(CellError::InvalidValue)),
                }
            }
        }
        Ok(Scalar::number(total))
    }
}

/// A workbook that hides its layering, so only per-cell style ids are visible
#[derive(Debug, Clone, Default)]
pub struct FlatStore(pub Workbook);

impl CellStore for FlatStore {
    fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.0.sheet_id(name)
    }

    fn sheet_name(&self, sheet: SheetId) -> Option<&str> {
        self.0.sheet_name(sheet)
    }

    fn cell(&self, sheet: SheetId, coord: CellCoord) -> Cell {
        self.0.cell(sheet, coord)
    }

    fn resolve_style(&self, style_id: StyleId) -> Option<&Style> {
        self.0.resolve_style(style_id)
    }

    fn format_runs_for_column(&self, sheet: SheetId, col: u32) -> Option<&[FormatRun]> {
        self.0.format_runs_for_column(sheet, col)
    }

    fn non_empty_cells(&self, sheet: SheetId) -> Vec<(CellCoord, Cell)> {
        self.0.non_empty_cells(sheet)
    }

    fn last_used_row(&self, sheet: SheetId) -> Option<u32> {
        self.0.last_used_row(sheet)
    }

    fn begin_batch(&mut self) {
        self.0.begin_batch()
    }

    fn commit_batch(&mut self) -> Result<(), StoreError> {
        self.0.commit_batch()
    }

    fn set_cell_value(&mut self, sheet: SheetId, coord: CellCoord, value: Scalar) -> Result<(), StoreError> {
        self.0.set_cell_value(sheet, coord, value)
    }

    fn set_cell_formula(&mut self, sheet: SheetId, coord: CellCoord, formula: String) -> Result<(), StoreError> {
        self.0.set_cell_formula(sheet, coord, formula)
    }

    fn set_cell_style(&mut self, sheet: SheetId, coord: CellCoord, style: Style) -> Result<(), StoreError> {
        self.0.set_cell_style(sheet, coord, style)
    }

    fn set_range_format(&mut self, sheet: SheetId, range: CellRange, patch: &CellFormat) -> Result<bool, StoreError> {
        self.0.set_range_format(sheet, range, patch)
    }
}
