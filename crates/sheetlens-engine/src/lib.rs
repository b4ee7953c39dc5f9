//! Read/write engine over a SheetLens cell store.
//!
//! Resolves each cell's effective format from layered styles (sheet, column, row, range run,
//! cell), computes formula values lazily with memoization and cycle detection, and writes
//! ranges without materializing formatting a cell already inherits.

pub mod computed;
pub mod config;
pub mod engine;
pub mod epoch;
pub mod error;
pub mod evaluator;
pub mod resolver;
pub mod run_index;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use computed::{pack_key, unpack_key, ComputedValues, EvalContext};
pub use config::{CachedFormulaPolicy, EngineConfig};
pub use engine::{CellSnapshot, NonEmptyCell, SheetEngine};
pub use epoch::{Epoch, Stamped};
pub use error::{EngineError, EvalError, Result};
pub use evaluator::{CellLookup, EvalOptions, FormulaEvaluator};
pub use resolver::{FormatResolver, LayerIds, LayerScan};
pub use run_index::{locate, RunIndex};
pub use writer::{CellInput, WriteSummary};
