//! Computed-value cache.
//!
//! Formula cells are evaluated lazily, on first read, and memoized per sheet. Each memo entry
//! is a small state machine: absent (not started), `InProgress` while the cell's formula is
//! being evaluated, `Resolved` once a value is known. Reaching an `InProgress` entry again
//! means the evaluation chain looped back to itself, which is reported in-band as `#REF!`.
//!
//! Nested lookups recurse on the native stack; each level makes sure enough stack is left and
//! switches to a fresh heap-allocated segment when it is not, so chain length is bounded only
//! by `max_eval_depth`. A chain longer than that is indistinguishable from a cycle and is
//! reported as `#REF!` too, without memoizing anything that depended on the cut-off.

use rustc_hash::FxHashMap;
use sheetlens_core::{
    split_sheet_prefix, CellCoord, CellError, CellRange, CellStore, Scalar, SheetId,
};
use tracing::{debug, trace, warn};

use crate::config::{CachedFormulaPolicy, EngineConfig};
use crate::epoch::{Epoch, Stamped};
use crate::evaluator::{CellLookup, EvalOptions, FormulaEvaluator};

/// Stack that must remain before descending one more evaluation level
const STACK_RED_ZONE: usize = 256 * 1024;
/// Size of each stack segment allocated once the red zone is reached
const STACK_SEGMENT: usize = 4 * 1024 * 1024;

/// Pack a coordinate into one memo key: row in the high 32 bits, column in the low 32.
/// Collision-free over the whole `u32 x u32` grid.
pub fn pack_key(coord: CellCoord) -> u64 {
    ((coord.row as u64) << 32) | coord.col as u64
}

pub fn unpack_key(key: u64) -> CellCoord {
    CellCoord::new((key >> 32) as u32, key as u32)
}

#[derive(Debug, Clone, PartialEq)]
enum EvalState {
    InProgress,
    Resolved(Scalar),
}

#[derive(Debug, Default)]
struct SheetMemo {
    states: FxHashMap<u64, EvalState>,
}

/// Per-sheet memo of computed values, invalidated wholesale by an epoch change
#[derive(Debug, Default)]
pub struct ComputedValues {
    sheets: FxHashMap<SheetId, Stamped<SheetMemo>>,
}

impl ComputedValues {
    pub fn new() -> Self {
        Self::default()
    }

    fn memo(&mut self, sheet: SheetId, epoch: Epoch) -> &mut SheetMemo {
        self.sheets
            .entry(sheet)
            .or_insert_with(|| Stamped::new(epoch))
            .current_mut(epoch)
    }

    /// Memoized value for a cell, if it has been resolved under `epoch`
    pub fn cached(&self, sheet: SheetId, coord: CellCoord, epoch: Epoch) -> Option<&Scalar> {
        match self.sheets.get(&sheet)?.current(epoch)?.states.get(&pack_key(coord))? {
            EvalState::Resolved(value) => Some(value),
            EvalState::InProgress => None,
        }
    }

    /// Number of resolved entries for a sheet under `epoch`
    pub fn resolved_count(&self, sheet: SheetId, epoch: Epoch) -> usize {
        self.sheets
            .get(&sheet)
            .and_then(|memo| memo.current(epoch))
            .map_or(0, |memo| {
                memo.states
                    .values()
                    .filter(|s| matches!(s, EvalState::Resolved(_)))
                    .count()
            })
    }

    /// Drop every memo immediately (epoch bumps make this lazy; this frees the memory now)
    pub fn clear(&mut self) {
        self.sheets.clear();
    }
}

/// Everything one read needs to evaluate formula cells: store, evaluator, memo, limits.
///
/// Built per engine call and threaded explicitly through nested lookups.
pub struct EvalContext<'a, S: CellStore + ?Sized, E: FormulaEvaluator + ?Sized> {
    store: &'a S,
    evaluator: &'a E,
    memo: &'a mut ComputedValues,
    policy: CachedFormulaPolicy,
    max_depth: usize,
    options: EvalOptions,
    epoch: Epoch,
    depth: usize,
    /// Set when the depth limit cut the current chain; every value computed while unwinding
    /// from it depends on the cut-off and stays out of the memo.
    depth_limited: bool,
}

impl<'a, S: CellStore + ?Sized, E: FormulaEvaluator + ?Sized> EvalContext<'a, S, E> {
    pub fn new(
        store: &'a S,
        evaluator: &'a E,
        memo: &'a mut ComputedValues,
        config: &EngineConfig,
        epoch: Epoch,
    ) -> Self {
        Self {
            store,
            evaluator,
            memo,
            policy: config.cached_formula_policy,
            max_depth: config.max_eval_depth,
            options: EvalOptions {
                max_range_cells: config.max_range_cells,
                locale_id: config.locale_id.clone(),
            },
            epoch,
            depth: 0,
            depth_limited: false,
        }
    }

    /// Computed value of a cell: memo hit, literal, trusted cached result or a fresh evaluation
    pub fn value_at(&mut self, sheet: SheetId, coord: CellCoord) -> Scalar {
        let key = pack_key(coord);
        match self.memo.memo(sheet, self.epoch).states.get(&key) {
            Some(EvalState::Resolved(value)) => {
                trace!("memo hit {}!{}", sheet, coord);
                return value.clone();
            }
            Some(EvalState::InProgress) => {
                trace!("circular reference through {}!{}", sheet, coord);
                return Scalar::Error(CellError::InvalidReference);
            }
            None => {}
        }

        if self.depth >= self.max_depth {
            warn!(
                "evaluation depth limit {} reached at {}!{}",
                self.max_depth, sheet, coord
            );
            self.depth_limited = true;
            return Scalar::Error(CellError::InvalidReference);
        }

        let outermost = self.depth == 0;
        self.memo
            .memo(sheet, self.epoch)
            .states
            .insert(key, EvalState::InProgress);
        let value = stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || {
            self.compute(sheet, coord)
        });

        // Every path out of compute replaces the InProgress marker.
        let states = &mut self.memo.memo(sheet, self.epoch).states;
        if self.depth_limited {
            states.remove(&key);
        } else {
            states.insert(key, EvalState::Resolved(value.clone()));
        }
        if outermost {
            self.depth_limited = false;
        }
        value
    }

    fn compute(&mut self, sheet: SheetId, coord: CellCoord) -> Scalar {
        let cell = self.store.cell(sheet, coord);
        let Some(formula) = cell.formula else {
            return cell.value;
        };
        if self.policy == CachedFormulaPolicy::TrustCached && !cell.value.is_empty() {
            return cell.value;
        }

        let evaluator = self.evaluator;
        let options = self.options.clone();
        self.depth += 1;
        let result = evaluator.evaluate(
            &formula,
            &mut SheetLookup {
                ctx: &mut *self,
                sheet,
            },
            &options,
        );
        self.depth -= 1;

        match result {
            Ok(Scalar::Number(n)) => Scalar::number(n),
            Ok(value) => value,
            Err(err) => {
                debug!("evaluating {}!{} `{}` failed: {}", sheet, coord, formula, err);
                Scalar::Error(CellError::InvalidValue)
            }
        }
    }

    /// Sheet named in a reference, falling back to the sheet being evaluated
    fn target_sheet(&self, name: Option<&str>, current: SheetId) -> SheetId {
        name.and_then(|n| self.store.sheet_id(n)).unwrap_or(current)
    }
}

/// [`CellLookup`] handed to the evaluator for one formula cell
struct SheetLookup<'c, 'a, S: CellStore + ?Sized, E: FormulaEvaluator + ?Sized> {
    ctx: &'c mut EvalContext<'a, S, E>,
    sheet: SheetId,
}

impl<S: CellStore + ?Sized, E: FormulaEvaluator + ?Sized> CellLookup for SheetLookup<'_, '_, S, E> {
    fn value(&mut self, address: &str) -> Scalar {
        let (sheet_name, local) = split_sheet_prefix(address);
        let sheet = self.ctx.target_sheet(sheet_name.as_deref(), self.sheet);
        match CellCoord::from_a1(local) {
            Some(coord) => self.ctx.value_at(sheet, coord),
            None => Scalar::Error(CellError::InvalidReference),
        }
    }

    fn range(&mut self, address: &str) -> Result<Vec<Scalar>, CellError> {
        let (sheet_name, local) = split_sheet_prefix(address);
        let sheet = self.ctx.target_sheet(sheet_name.as_deref(), self.sheet);
        let range = CellRange::from_a1(local).ok_or(CellError::InvalidReference)?;
        if range.cell_count() > self.ctx.options.max_range_cells as u64 {
            warn!(
                "range {} has {} cells, above the {} cell limit",
                address,
                range.cell_count(),
                self.ctx.options.max_range_cells
            );
            return Err(CellError::InvalidValue);
        }
        Ok(range
            .iter()
            .map(|coord| self.ctx.value_at(sheet, coord))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CountingEvaluator;
    use sheetlens_core::{Cell, Workbook};

    fn a1(s: &str) -> CellCoord {
        CellCoord::from_a1(s).unwrap()
    }

    fn workbook(cells: &[(&str, Cell)]) -> (Workbook, SheetId) {
        let mut wb = Workbook::default();
        let sheet = wb.sheet_id("Sheet1").unwrap();
        for (addr, cell) in cells {
            wb.put_cell(sheet, a1(addr), cell.clone()).unwrap();
        }
        (wb, sheet)
    }

    #[test]
    fn test_pack_key_is_collision_free_at_extremes() {
        let coords = [
            CellCoord::new(0, 0),
            CellCoord::new(0, u32::MAX),
            CellCoord::new(1, 0),
            CellCoord::new(u32::MAX, u32::MAX),
        ];
        let keys: Vec<u64> = coords.iter().map(|c| pack_key(*c)).collect();
        for (i, a) in keys.iter().enumerate() {
            assert_eq!(unpack_key(*a), coords[i]);
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_literal_values_pass_through() {
        let (wb, sheet) = workbook(&[("A1", Cell::value(7.0)), ("B1", Cell::value("hi"))]);
        let evaluator = CountingEvaluator::new();
        let mut memo = ComputedValues::new();
        let config = EngineConfig::default();
        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, Epoch::default());

        assert_eq!(ctx.value_at(sheet, a1("A1")), Scalar::Number(7.0));
        assert_eq!(ctx.value_at(sheet, a1("B1")), Scalar::Text("hi".into()));
        assert_eq!(ctx.value_at(sheet, a1("Z9")), Scalar::Empty);
        assert_eq!(evaluator.calls(), 0);
    }

    #[test]
    fn test_two_cell_cycle_is_ref_error() {
        let (wb, sheet) = workbook(&[("A1", Cell::formula("=B1")), ("B1", Cell::formula("=A1"))]);
        let evaluator = CountingEvaluator::new();
        let mut memo = ComputedValues::new();
        let config = EngineConfig::default();
        let epoch = Epoch::default();
        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, epoch);

        assert_eq!(ctx.value_at(sheet, a1("A1")), Scalar::Error(CellError::InvalidReference));
        assert_eq!(ctx.value_at(sheet, a1("B1")), Scalar::Error(CellError::InvalidReference));
        // Both markers were cleared and replaced by resolved values.
        assert_eq!(memo.resolved_count(sheet, epoch), 2);
    }

    #[test]
    fn test_self_reference_is_ref_error() {
        let (wb, sheet) = workbook(&[("A1", Cell::formula("=A1+1"))]);
        let evaluator = CountingEvaluator::new();
        let mut memo = ComputedValues::new();
        let config = EngineConfig::default();
        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, Epoch::default());

        assert_eq!(ctx.value_at(sheet, a1("A1")), Scalar::Error(CellError::InvalidReference));
    }

    #[test]
    fn test_each_formula_evaluates_once_per_epoch() {
        let (wb, sheet) = workbook(&[
            ("A1", Cell::value(1.0)),
            ("B1", Cell::formula("=A1+1")),
            ("C1", Cell::formula("=B1+B1")),
        ]);
        let evaluator = CountingEvaluator::new();
        let mut memo = ComputedValues::new();
        let config = EngineConfig::default();
        let epoch = Epoch::default();

        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, epoch);
        assert_eq!(ctx.value_at(sheet, a1("C1")), Scalar::Number(4.0));
        assert_eq!(ctx.value_at(sheet, a1("C1")), Scalar::Number(4.0));
        assert_eq!(evaluator.calls(), 2);

        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, epoch.next());
        assert_eq!(ctx.value_at(sheet, a1("C1")), Scalar::Number(4.0));
        assert_eq!(evaluator.calls(), 4);
    }

    #[test]
    fn test_evaluator_failure_becomes_value_error() {
        let (wb, sheet) = workbook(&[("A1", Cell::formula("=BOOM")), ("A2", Cell::formula("=A1+1"))]);
        let evaluator = CountingEvaluator::new();
        let mut memo = ComputedValues::new();
        let config = EngineConfig::default();
        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, Epoch::default());

        assert_eq!(ctx.value_at(sheet, a1("A1")), Scalar::Error(CellError::InvalidValue));
        assert_eq!(ctx.value_at(sheet, a1("A2")), Scalar::Error(CellError::InvalidValue));
    }

    #[test]
    fn test_cross_sheet_reference_and_fallback() {
        let mut wb = Workbook::default();
        let main = wb.sheet_id("Sheet1").unwrap();
        let data = wb.add_sheet("Data").unwrap();
        wb.put_cell(data, a1("A1"), Cell::value(10.0)).unwrap();
        wb.put_cell(main, a1("A1"), Cell::value(1.0)).unwrap();
        wb.put_cell(main, a1("B1"), Cell::formula("=Data!A1+1")).unwrap();
        wb.put_cell(main, a1("C1"), Cell::formula("=Missing!A1+1")).unwrap();

        let evaluator = CountingEvaluator::new();
        let mut memo = ComputedValues::new();
        let config = EngineConfig::default();
        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, Epoch::default());

        assert_eq!(ctx.value_at(main, a1("B1")), Scalar::Number(11.0));
        // Unknown sheet names resolve against the evaluating sheet.
        assert_eq!(ctx.value_at(main, a1("C1")), Scalar::Number(2.0));
    }

    #[test]
    fn test_range_above_cap_is_value_error() {
        let (wb, sheet) = workbook(&[
            ("A1", Cell::value(1.0)),
            ("A2", Cell::value(2.0)),
            ("B1", Cell::formula("=SUM(A1:A2)")),
            ("B2", Cell::formula("=SUM(A1:A20)")),
        ]);
        let evaluator = CountingEvaluator::new();
        let mut memo = ComputedValues::new();
        let config = EngineConfig {
            max_range_cells: 10,
            ..EngineConfig::default()
        };
        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, Epoch::default());

        assert_eq!(ctx.value_at(sheet, a1("B1")), Scalar::Number(3.0));
        assert_eq!(ctx.value_at(sheet, a1("B2")), Scalar::Error(CellError::InvalidValue));
    }

    #[test]
    fn test_cached_formula_policy() {
        let (wb, sheet) = workbook(&[("A1", Cell::formula("=1+1").with_cached_value(99.0))]);
        let evaluator = CountingEvaluator::new();
        let epoch = Epoch::default();

        let trust = EngineConfig::default();
        let mut memo = ComputedValues::new();
        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &trust, epoch);
        assert_eq!(ctx.value_at(sheet, a1("A1")), Scalar::Number(99.0));
        assert_eq!(evaluator.calls(), 0);

        let always = EngineConfig {
            cached_formula_policy: CachedFormulaPolicy::AlwaysEvaluate,
            ..EngineConfig::default()
        };
        let mut memo = ComputedValues::new();
        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &always, epoch);
        assert_eq!(ctx.value_at(sheet, a1("A1")), Scalar::Number(2.0));
        assert_eq!(evaluator.calls(), 1);
    }

    #[test]
    fn test_depth_limit_stops_long_chains() {
        let mut cells = vec![("A1".to_string(), Cell::value(1.0))];
        for row in 2..=20 {
            cells.push((format!("A{}", row), Cell::formula(format!("=A{}+1", row - 1))));
        }
        let mut wb = Workbook::default();
        let sheet = wb.sheet_id("Sheet1").unwrap();
        for (addr, cell) in cells {
            wb.put_cell(sheet, a1(&addr), cell).unwrap();
        }

        let evaluator = CountingEvaluator::new();
        let config = EngineConfig {
            max_eval_depth: 8,
            ..EngineConfig::default()
        };

        let mut memo = ComputedValues::new();
        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, Epoch::default());
        assert_eq!(ctx.value_at(sheet, a1("A20")), Scalar::Error(CellError::InvalidReference));

        // Shallow chains still resolve.
        let mut memo = ComputedValues::new();
        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, Epoch::default());
        assert_eq!(ctx.value_at(sheet, a1("A5")), Scalar::Number(5.0));
    }

    fn chain_workbook(len: u32) -> (Workbook, SheetId) {
        let mut wb = Workbook::default();
        let sheet = wb.sheet_id("Sheet1").unwrap();
        wb.put_cell(sheet, a1("A1"), Cell::value(1.0)).unwrap();
        for row in 2..=len {
            let formula = format!("=A{}+1", row - 1);
            wb.put_cell(sheet, a1(&format!("A{}", row)), Cell::formula(formula)).unwrap();
        }
        (wb, sheet)
    }

    #[test]
    fn test_depth_limited_result_is_not_cached_for_dependents() {
        let (wb, sheet) = chain_workbook(20);
        let evaluator = CountingEvaluator::new();
        let config = EngineConfig {
            max_eval_depth: 12,
            ..EngineConfig::default()
        };
        let epoch = Epoch::default();
        let mut memo = ComputedValues::new();

        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, epoch);
        assert_eq!(ctx.value_at(sheet, a1("A20")), Scalar::Error(CellError::InvalidReference));
        // A12 now sits within reach of A1 and evaluates on its own.
        assert_eq!(ctx.value_at(sheet, a1("A12")), Scalar::Number(12.0));
        assert_eq!(ctx.value_at(sheet, a1("A8")), Scalar::Number(8.0));

        assert_eq!(memo.cached(sheet, a1("A12"), epoch), Some(&Scalar::Number(12.0)));
        assert_eq!(memo.cached(sheet, a1("A20"), epoch), None);
    }

    #[test]
    fn test_long_chain_resolves_with_default_config() {
        let (wb, sheet) = chain_workbook(1000);
        let evaluator = CountingEvaluator::new();
        let mut memo = ComputedValues::new();
        let config = EngineConfig::default();
        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, Epoch::default());

        assert_eq!(ctx.value_at(sheet, a1("A1000")), Scalar::Number(1000.0));
        assert_eq!(evaluator.calls(), 999);
    }

    #[test]
    fn test_long_cycle_is_ref_error_with_default_config() {
        let mut wb = Workbook::default();
        let sheet = wb.sheet_id("Sheet1").unwrap();
        for row in 1..1000 {
            let formula = format!("=A{}", row + 1);
            wb.put_cell(sheet, a1(&format!("A{}", row)), Cell::formula(formula)).unwrap();
        }
        wb.put_cell(sheet, a1("A1000"), Cell::formula("=A1")).unwrap();

        let evaluator = CountingEvaluator::new();
        let mut memo = ComputedValues::new();
        let config = EngineConfig::default();
        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, Epoch::default());

        assert_eq!(ctx.value_at(sheet, a1("A1")), Scalar::Error(CellError::InvalidReference));
        assert_eq!(ctx.value_at(sheet, a1("A500")), Scalar::Error(CellError::InvalidReference));
    }

    #[test]
    fn test_cycle_past_depth_limit_is_ref_error() {
        let mut wb = Workbook::default();
        let sheet = wb.sheet_id("Sheet1").unwrap();
        for row in 1..30 {
            let formula = format!("=A{}", row + 1);
            wb.put_cell(sheet, a1(&format!("A{}", row)), Cell::formula(formula)).unwrap();
        }
        wb.put_cell(sheet, a1("A30"), Cell::formula("=A1")).unwrap();

        let evaluator = CountingEvaluator::new();
        let mut memo = ComputedValues::new();
        let config = EngineConfig {
            max_eval_depth: 8,
            ..EngineConfig::default()
        };
        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, Epoch::default());

        assert_eq!(ctx.value_at(sheet, a1("A1")), Scalar::Error(CellError::InvalidReference));
    }

    #[test]
    fn test_cross_sheet_cycle_is_ref_error() {
        let mut wb = Workbook::default();
        let main = wb.sheet_id("Sheet1").unwrap();
        let data = wb.add_sheet("Data").unwrap();
        wb.put_cell(main, a1("A1"), Cell::formula("=Data!A1")).unwrap();
        wb.put_cell(data, a1("A1"), Cell::formula("=Sheet1!A1")).unwrap();

        let evaluator = CountingEvaluator::new();
        let mut memo = ComputedValues::new();
        let config = EngineConfig::default();
        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, Epoch::default());

        assert_eq!(ctx.value_at(main, a1("A1")), Scalar::Error(CellError::InvalidReference));
        assert_eq!(ctx.value_at(data, a1("A1")), Scalar::Error(CellError::InvalidReference));
    }

    #[test]
    fn test_unsupported_function_is_value_error() {
        let (wb, sheet) = workbook(&[("A1", Cell::formula("=NOW()"))]);
        let evaluator = CountingEvaluator::new();
        let mut memo = ComputedValues::new();
        let config = EngineConfig::default();
        let mut ctx = EvalContext::new(&wb, &evaluator, &mut memo, &config, Epoch::default());

        assert_eq!(ctx.value_at(sheet, a1("A1")), Scalar::Error(CellError::InvalidValue));
        assert_eq!(evaluator.calls(), 1);
    }
}
