use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::workbook::SheetId;

/// In-band cell error sentinels (Excel-compatible)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellError {
    /// #DIV/0! - Division by zero
    DivisionByZero,
    /// #VALUE! - Invalid value type, or a failed evaluation
    InvalidValue,
    /// #REF! - Invalid cell reference, also used for circular references
    InvalidReference,
    /// #NAME? - Unrecognized function or name
    InvalidName,
    /// #NULL! - Null intersection
    NullError,
    /// #NUM! - Invalid numeric value
    NumError,
    /// #N/A - Value not available
    NotAvailable,
}

impl CellError {
    /// Excel literal for this error
    pub const fn literal(self) -> &'static str {
        match self {
            CellError::DivisionByZero => "#DIV/0!",
            CellError::InvalidValue => "#VALUE!",
            CellError::InvalidReference => "#REF!",
            CellError::InvalidName => "#NAME?",
            CellError::NullError => "#NULL!",
            CellError::NumError => "#NUM!",
            CellError::NotAvailable => "#N/A",
        }
    }

    /// Parse an Excel error literal (case-insensitive)
    pub fn from_literal(text: &str) -> Option<Self> {
        const ALL: [CellError; 7] = [
            CellError::DivisionByZero,
            CellError::InvalidValue,
            CellError::InvalidReference,
            CellError::InvalidName,
            CellError::NullError,
            CellError::NumError,
            CellError::NotAvailable,
        ];
        let text = text.trim();
        ALL.into_iter()
            .find(|e| e.literal().eq_ignore_ascii_case(text))
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.literal())
    }
}

/// Failures reported by a cell store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("sheet {0} does not exist")]
    SheetNotFound(SheetId),

    #[error("sheet name `{0}` is already in use")]
    SheetNameExists(String),

    #[error("invalid sheet name: {0}")]
    InvalidSheetName(String),

    #[error("invalid format runs for column {col}: {reason}")]
    InvalidFormatRuns { col: u32, reason: String },

    #[error("no batch is open")]
    NoOpenBatch,
}
