use serde::{Deserialize, Serialize};
use std::fmt;

/// Cell coordinate (0-indexed internally)
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellCoord {
    pub row: u32,
    pub col: u32,
}

impl CellCoord {
    pub const fn new(row: u32, col: u32) -> Self {
        CellCoord { row, col }
    }

    /// Create from A1 notation (e.g., "A1" -> (0, 0), "$B$2" -> (1, 1))
    pub fn from_a1(notation: &str) -> Option<Self> {
        let notation = notation.trim();
        let mut col_str = String::new();
        let mut row_str = String::new();

        for c in notation.chars() {
            match c {
                '$' if row_str.is_empty() => {}
                c if c.is_ascii_alphabetic() => {
                    if !row_str.is_empty() {
                        return None; // Letters after numbers
                    }
                    col_str.push(c);
                }
                c if c.is_ascii_digit() => row_str.push(c),
                _ => return None,
            }
        }

        if col_str.is_empty() || row_str.is_empty() {
            return None;
        }

        let col = col_from_label(&col_str)?;
        let row: u32 = row_str.parse().ok()?;

        if row == 0 {
            return None; // Rows are 1-indexed in A1 notation
        }

        Some(CellCoord { row: row - 1, col })
    }

    /// Convert to A1 notation (e.g., (0, 0) -> "A1")
    pub fn to_a1(&self) -> String {
        format!("{}{}", col_to_label(self.col), self.row + 1)
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1())
    }
}

/// Convert column index (0-indexed) to label (A, B, ..., Z, AA, AB, ...)
pub fn col_to_label(col: u32) -> String {
    let mut label = String::new();
    let mut n = col as u64 + 1;

    while n > 0 {
        n -= 1;
        label.insert(0, char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }

    label
}

/// Convert column label (A, B, ..., Z, AA, AB, ...) to index (0-indexed)
pub fn col_from_label(label: &str) -> Option<u32> {
    let mut col: u32 = 0;

    for c in label.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = c.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        col = col.checked_mul(26)?.checked_add(digit)?;
    }

    col.checked_sub(1)
}

/// Split an optional sheet qualifier off an address.
///
/// `Sheet2!A1` -> `(Some("Sheet2"), "A1")`, `'My Sheet'!B2` -> `(Some("My Sheet"), "B2")`,
/// doubled quotes inside a quoted name are unescaped.
pub fn split_sheet_prefix(address: &str) -> (Option<String>, &str) {
    let address = address.trim();
    let Some(bang) = address.rfind('!') else {
        return (None, address);
    };
    let (sheet, rest) = (&address[..bang], &address[bang + 1..]);
    let name = match sheet.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(quoted) => quoted.replace("''", "'"),
        None => sheet.to_string(),
    };
    if name.is_empty() {
        (None, rest)
    } else {
        (Some(name), rest)
    }
}

/// A rectangular range of cells (e.g., A1:B10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRange {
    pub start: CellCoord,
    pub end: CellCoord,
}

impl CellRange {
    pub fn new(start: CellCoord, end: CellCoord) -> Self {
        // Normalize so start is top-left and end is bottom-right
        CellRange {
            start: CellCoord::new(start.row.min(end.row), start.col.min(end.col)),
            end: CellCoord::new(start.row.max(end.row), start.col.max(end.col)),
        }
    }

    pub fn single(coord: CellCoord) -> Self {
        CellRange::new(coord, coord)
    }

    /// Create from A1:B1 notation
    pub fn from_a1(notation: &str) -> Option<Self> {
        let mut parts = notation.split(':');
        let start = CellCoord::from_a1(parts.next()?)?;
        let end = match parts.next() {
            Some(part) => CellCoord::from_a1(part)?,
            None => start,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(CellRange::new(start, end))
    }

    /// Convert to A1:B1 notation
    pub fn to_a1(&self) -> String {
        if self.start == self.end {
            self.start.to_a1()
        } else {
            format!("{}:{}", self.start.to_a1(), self.end.to_a1())
        }
    }

    pub fn contains(&self, coord: CellCoord) -> bool {
        coord.row >= self.start.row
            && coord.row <= self.end.row
            && coord.col >= self.start.col
            && coord.col <= self.end.col
    }

    pub fn row_count(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn col_count(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    /// Total number of cells, computed without overflow
    pub fn cell_count(&self) -> u64 {
        self.row_count() as u64 * self.col_count() as u64
    }

    /// Iterate over all coordinates in the range (row by row)
    pub fn iter(&self) -> CellRangeIter {
        CellRangeIter {
            range: *self,
            current_row: self.start.row as u64,
            current_col: self.start.col,
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1())
    }
}

impl IntoIterator for CellRange {
    type Item = CellCoord;
    type IntoIter = CellRangeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Row-major iterator over coordinates in a range
pub struct CellRangeIter {
    range: CellRange,
    current_row: u64,
    current_col: u32,
}

impl Iterator for CellRangeIter {
    type Item = CellCoord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row > self.range.end.row as u64 {
            return None;
        }

        let coord = CellCoord::new(self.current_row as u32, self.current_col);

        if self.current_col >= self.range.end.col {
            self.current_col = self.range.start.col;
            self.current_row += 1;
        } else {
            self.current_col += 1;
        }

        Some(coord)
    }
}
