use std::rc::Rc;
use std::sync::Arc;

use sheetlens_core::{CellError, Scalar};

use crate::error::EvalError;

/// Options handed to the formula evaluator with every call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalOptions {
    /// Largest rectangle [`CellLookup::range`] will expand
    pub max_range_cells: usize,
    pub locale_id: String,
}

/// Cell access given to a formula evaluator.
///
/// Addresses are A1 strings with an optional sheet qualifier (`B2`, `Data!B2`,
/// `'My Sheet'!B2`). Unknown sheets resolve to the sheet the formula lives on.
pub trait CellLookup {
    fn value(&mut self, address: &str) -> Scalar;

    /// Row-major values of a rectangle. Ranges above the configured cell cap are refused
    /// with `#VALUE!`; malformed addresses give `#REF!`.
    fn range(&mut self, address: &str) -> Result<Vec<Scalar>, CellError>;
}

/// Turns formula text into a value, pulling referenced cells through a [`CellLookup`]
pub trait FormulaEvaluator {
    fn evaluate(
        &self,
        formula: &str,
        lookup: &mut dyn CellLookup,
        options: &EvalOptions,
    ) -> Result<Scalar, EvalError>;
}

impl<T: FormulaEvaluator + ?Sized> FormulaEvaluator for &T {
    fn evaluate(
        &self,
        formula: &str,
        lookup: &mut dyn CellLookup,
        options: &EvalOptions,
    ) -> Result<Scalar, EvalError> {
        (**self).evaluate(formula, lookup, options)
    }
}

impl<T: FormulaEvaluator + ?Sized> FormulaEvaluator for Rc<T> {
    fn evaluate(
        &self,
        formula: &str,
        lookup: &mut dyn CellLookup,
        options: &EvalOptions,
    ) -> Result<Scalar, EvalError> {
        (**self).evaluate(formula, lookup, options)
    }
}

impl<T: FormulaEvaluator + ?Sized> FormulaEvaluator for Arc<T> {
    fn evaluate(
        &self,
        formula: &str,
        lookup: &mut dyn CellLookup,
        options: &EvalOptions,
    ) -> Result<Scalar, EvalError> {
        (**self).evaluate(formula, lookup, options)
    }
}
