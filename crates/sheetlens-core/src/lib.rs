//! Data model and in-memory store for SheetLens: cells and scalars, interned styles,
//! per-column format runs, per-sheet layer defaults, and the [`CellStore`] seam the
//! resolution engine reads through.

pub mod cell;
pub mod error;
pub mod format;
pub mod range;
pub mod runs;
pub mod sheet;
pub mod store;
pub mod workbook;

pub use cell::{parse_cell_input, Cell, CellContent, Scalar};
pub use error::{CellError, StoreError};
pub use format::{
    CellFormat, Color, FormatProperty, HorizontalAlign, Style, StyleId, StyleTable, VerticalAlign,
};
pub use range::{col_from_label, col_to_label, split_sheet_prefix, CellCoord, CellRange};
pub use runs::{validate_runs, FormatRun};
pub use sheet::Sheet;
pub use store::{CellStore, StyleLayers};
pub use workbook::{SheetId, Workbook, DEFAULT_MAX_FORMAT_CELLS};
