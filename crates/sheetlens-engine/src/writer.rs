//! Selective range writes.
//!
//! A requested format property is only written onto a cell when it would change what the cell
//! displays, or when the cell already pins that property explicitly. Properties the request
//! leaves out are cleared from the cell's explicit style, so the cell falls back to its
//! layers. Style properties the engine does not model are carried over untouched.

use serde::{Deserialize, Serialize};
use sheetlens_core::{
    parse_cell_input, CellContent, CellCoord, CellFormat, CellRange, CellStore, FormatProperty,
    Scalar, SheetId, Style, StoreError,
};
use tracing::debug;

use crate::epoch::Epoch;
use crate::error::{EngineError, Result};
use crate::resolver::{FormatResolver, LayerScan};

/// One cell of a write payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellInput {
    /// Literal value; JSON objects and arrays are stored as their text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Formula text; takes precedence over `value`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Requested format. Absent leaves the cell's style alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<CellFormat>,
}

impl CellInput {
    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        CellInput {
            value: Some(value.into()),
            ..CellInput::default()
        }
    }

    pub fn formula(formula: impl Into<String>) -> Self {
        CellInput {
            formula: Some(formula.into()),
            ..CellInput::default()
        }
    }

    /// Only a format; the cell content is left alone
    pub fn format(format: CellFormat) -> Self {
        CellInput {
            format: Some(format),
            ..CellInput::default()
        }
    }

    /// Empty the cell's content
    pub fn clear() -> Self {
        CellInput::value(serde_json::Value::Null)
    }

    /// Interpret typed text the way a user entry is interpreted (`=` starts a formula)
    pub fn from_text(text: &str) -> Self {
        match parse_cell_input(text) {
            CellContent::Formula(formula) => CellInput::formula(formula),
            CellContent::Value(Scalar::Empty) => CellInput::clear(),
            CellContent::Value(value) => CellInput {
                value: serde_json::to_value(&value).ok(),
                ..CellInput::default()
            },
        }
    }

    /// Builder pattern: attach a requested format
    pub fn with_format(mut self, format: CellFormat) -> Self {
        self.format = Some(format);
        self
    }

    fn content(&self) -> Option<CellContent> {
        if let Some(formula) = self.formula.as_deref().map(str::trim) {
            if !formula.is_empty() {
                let formula = if formula.starts_with('=') {
                    formula.to_string()
                } else {
                    format!("={}", formula)
                };
                return Some(CellContent::Formula(formula));
            }
        }
        self.value
            .as_ref()
            .map(|value| CellContent::Value(Scalar::from_json(value)))
    }
}

/// What a write did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    /// Cells in the target range
    pub cells: usize,
    /// Cells whose content was replaced
    pub contents: usize,
    /// Cells whose explicit style changed
    pub styles: usize,
    /// Requested properties written onto cells
    pub materialized: usize,
    /// Requested properties skipped because the cell already inherits them
    pub inherited: usize,
}

struct PlannedCell {
    coord: CellCoord,
    content: Option<CellContent>,
    style: Option<Style>,
}

/// Write `inputs` (row-major, exactly the shape of `range`) in a single store batch.
///
/// Shape and sheet are checked before the batch opens, so those failures write nothing. A store
/// error while applying the plan still commits the cells written before it, then is returned.
pub(crate) fn write_range<S: CellStore + ?Sized>(
    store: &mut S,
    formats: &mut FormatResolver,
    epoch: Epoch,
    sheet: SheetId,
    range: CellRange,
    inputs: &[Vec<CellInput>],
) -> Result<WriteSummary> {
    check_shape(range, inputs)?;
    store.sheet_name(sheet).ok_or(StoreError::SheetNotFound(sheet))?;

    let mut summary = WriteSummary {
        cells: range.cell_count() as usize,
        ..WriteSummary::default()
    };
    let plan = plan_writes(&*store, formats, epoch, sheet, range, inputs, &mut summary);

    store.begin_batch();
    let applied = apply_plan(store, sheet, plan);
    store.commit_batch()?;
    applied?;

    debug!(
        "wrote {} on {}: {} contents, {} styles, {} properties materialized, {} inherited",
        range, sheet, summary.contents, summary.styles, summary.materialized, summary.inherited
    );
    Ok(summary)
}

fn check_shape(range: CellRange, inputs: &[Vec<CellInput>]) -> Result<()> {
    let (rows, cols) = (range.row_count(), range.col_count());
    if inputs.len() != rows as usize {
        return Err(EngineError::ShapeMismatch {
            range: range.to_a1(),
            expected_rows: rows,
            expected_cols: cols,
            actual_rows: inputs.len(),
            actual_cols: inputs.first().map_or(0, Vec::len),
        });
    }
    match inputs.iter().position(|row| row.len() != cols as usize) {
        Some(row) => Err(EngineError::RaggedRow {
            row,
            expected: cols,
            actual: inputs[row].len(),
        }),
        None => Ok(()),
    }
}

fn plan_writes<S: CellStore + ?Sized>(
    store: &S,
    formats: &mut FormatResolver,
    epoch: Epoch,
    sheet: SheetId,
    range: CellRange,
    inputs: &[Vec<CellInput>],
    summary: &mut WriteSummary,
) -> Vec<PlannedCell> {
    let mut scan = LayerScan::new(store, sheet, range);
    let mut plan = Vec::with_capacity(summary.cells);

    for (row, row_inputs) in (range.start.row..=range.end.row).zip(inputs) {
        for ((coord, cell, layers), input) in scan.row(row).into_iter().zip(row_inputs) {
            let content = input.content();
            let style = input.format.as_ref().and_then(|requested| {
                let current = store.resolve_style(cell.style_id).cloned().unwrap_or_default();
                let inherited = formats
                    .resolve(store, layers.inherited(), epoch)
                    .unwrap_or_default();
                let next = select_properties(&current, &inherited, requested, summary);
                (next != current).then_some(next)
            });

            summary.contents += usize::from(content.is_some());
            summary.styles += usize::from(style.is_some());
            if content.is_some() || style.is_some() {
                plan.push(PlannedCell {
                    coord,
                    content,
                    style,
                });
            }
        }
    }
    plan
}

/// The cell's next explicit style: requested properties it does not already inherit, the
/// engine-unknown properties of `current`, nothing else
fn select_properties(
    current: &Style,
    inherited: &CellFormat,
    requested: &CellFormat,
    summary: &mut WriteSummary,
) -> Style {
    let explicit = current.format();
    let mut next = CellFormat::default();
    for prop in FormatProperty::ALL {
        if !requested.is_set(prop) {
            continue;
        }
        if requested.property_eq(inherited, prop) && !explicit.is_set(prop) {
            summary.inherited += 1;
            continue;
        }
        next.copy_property(requested, prop);
        summary.materialized += 1;
    }

    let mut style = current.clone();
    style.set_format(next);
    style
}

fn apply_plan<S: CellStore + ?Sized>(
    store: &mut S,
    sheet: SheetId,
    plan: Vec<PlannedCell>,
) -> std::result::Result<(), StoreError> {
    for cell in plan {
        match cell.content {
            Some(CellContent::Formula(formula)) => store.set_cell_formula(sheet, cell.coord, formula)?,
            Some(CellContent::Value(value)) => store.set_cell_value(sheet, cell.coord, value)?,
            None => {}
        }
        if let Some(style) = cell.style {
            store.set_cell_style(sheet, cell.coord, style)?;
        }
    }
    Ok(())
}
