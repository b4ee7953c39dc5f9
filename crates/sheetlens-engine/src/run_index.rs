//! Lookup of the format run covering a row.
//!
//! A column's runs are sorted and disjoint, so a single row is found by binary search. Bulk
//! reads visit rows in ascending order, so they use a cursor that only moves forward and keeps
//! a full-column scan at `O(rows + runs)`.

use sheetlens_core::{FormatRun, StyleId};

/// The run covering `row`: the first run ending after `row`, if it also starts at or before it
pub fn locate(runs: &[FormatRun], row: u32) -> Option<&FormatRun> {
    let idx = runs.partition_point(|run| run.end_row_exclusive <= row);
    runs.get(idx).filter(|run| run.start_row <= row)
}

/// Access to one column's runs, in either access mode
#[derive(Debug, Clone)]
pub enum RunIndex<'a> {
    /// Arbitrary rows, binary search per lookup
    RandomAccess(&'a [FormatRun]),
    /// Ascending rows, forward-only cursor
    SequentialCursor {
        runs: &'a [FormatRun],
        pos: usize,
        last_row: Option<u32>,
    },
}

impl<'a> RunIndex<'a> {
    pub fn random_access(runs: &'a [FormatRun]) -> Self {
        RunIndex::RandomAccess(runs)
    }

    pub fn sequential(runs: &'a [FormatRun]) -> Self {
        RunIndex::SequentialCursor {
            runs,
            pos: 0,
            last_row: None,
        }
    }

    /// The run covering `row`, if any
    pub fn run_at(&mut self, row: u32) -> Option<&'a FormatRun> {
        match self {
            RunIndex::RandomAccess(runs) => locate(*runs, row),
            RunIndex::SequentialCursor {
                runs,
                pos,
                last_row,
            } => {
                let runs: &'a [FormatRun] = *runs;
                if last_row.is_some_and(|last| row < last) {
                    // Rows must ascend; stepping back re-seeks instead of answering wrong.
                    *pos = runs.partition_point(|run| run.end_row_exclusive <= row);
                }
                *last_row = Some(row);
                while runs.get(*pos).is_some_and(|run| run.end_row_exclusive <= row) {
                    *pos += 1;
                }
                runs.get(*pos).filter(|run| run.start_row <= row)
            }
        }
    }

    /// Style id contributed by the range-run layer at `row` (`0` when no run covers it)
    pub fn style_at(&mut self, row: u32) -> StyleId {
        self.run_at(row).map_or(0, |run| run.style_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs() -> Vec<FormatRun> {
        vec![
            FormatRun::new(5, 10, 1),
            FormatRun::new(10, 12, 2),
            FormatRun::new(20, 25, 3),
        ]
    }

    #[test]
    fn test_locate_boundaries() {
        let runs = runs();
        assert_eq!(locate(&runs, 4), None);
        assert_eq!(locate(&runs, 5).map(|r| r.style_id), Some(1));
        assert_eq!(locate(&runs, 9).map(|r| r.style_id), Some(1));
        // end_row_exclusive belongs to the next run
        assert_eq!(locate(&runs, 10).map(|r| r.style_id), Some(2));
        assert_eq!(locate(&runs, 12), None);
        assert_eq!(locate(&runs, 24).map(|r| r.style_id), Some(3));
        assert_eq!(locate(&runs, 25), None);
        assert_eq!(locate(&[], 0), None);
    }

    #[test]
    fn test_sequential_cursor_matches_binary_search() {
        let runs = runs();
        let mut cursor = RunIndex::sequential(&runs);
        let mut random = RunIndex::random_access(&runs);
        for row in 0..30 {
            assert_eq!(cursor.style_at(row), random.style_at(row), "row {}", row);
        }
    }

    #[test]
    fn test_sequential_cursor_skips_rows() {
        let runs = runs();
        let mut cursor = RunIndex::sequential(&runs);
        assert_eq!(cursor.style_at(6), 1);
        assert_eq!(cursor.style_at(22), 3);
        assert_eq!(cursor.style_at(40), 0);
    }

    #[test]
    fn test_sequential_cursor_reseeks_on_backward_step() {
        let runs = runs();
        let mut cursor = RunIndex::sequential(&runs);
        assert_eq!(cursor.style_at(21), 3);
        assert_eq!(cursor.style_at(7), 1);
        assert_eq!(cursor.style_at(11), 2);
    }
}
