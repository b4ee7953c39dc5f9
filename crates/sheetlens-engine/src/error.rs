use sheetlens_core::StoreError;
use thiserror::Error;

/// Errors surfaced to engine callers.
///
/// Formula problems never show up here; they become in-band `#REF!`/`#VALUE!` values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("write payload is {actual_rows}x{actual_cols} but range {range} is {expected_rows}x{expected_cols}")]
    ShapeMismatch {
        range: String,
        expected_rows: u32,
        expected_cols: u32,
        actual_rows: usize,
        actual_cols: usize,
    },

    #[error("row {row} of the write payload has {actual} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: u32,
        actual: usize,
    },

    #[error("formatting {range} was refused by the store (selection too large or blocked)")]
    FormatRejected { range: String },

    #[error("unknown sheet `{0}`")]
    UnknownSheet(String),

    #[error("invalid range `{0}`")]
    InvalidRange(String),

    #[error("invalid cell address `{0}`")]
    InvalidAddress(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failure reported by a formula evaluator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("formula could not be parsed: {0}")]
    Parse(String),

    #[error("unsupported formula: {0}")]
    Unsupported(String),

    #[error("evaluation failed: {0}")]
    Failed(String),
}
