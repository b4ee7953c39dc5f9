use serde::{Deserialize, Serialize};

use crate::format::StyleId;

/// A run-length encoded formatting band: rows `[start_row, end_row_exclusive)` of one column
/// carry `style_id` unless a cell overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatRun {
    pub start_row: u32,
    pub end_row_exclusive: u32,
    pub style_id: StyleId,
}

impl FormatRun {
    pub const fn new(start_row: u32, end_row_exclusive: u32, style_id: StyleId) -> Self {
        FormatRun {
            start_row,
            end_row_exclusive,
            style_id,
        }
    }

    /// Half-open containment: `end_row_exclusive` belongs to the next run
    pub fn contains(&self, row: u32) -> bool {
        row >= self.start_row && row < self.end_row_exclusive
    }

    pub fn len(&self) -> u32 {
        self.end_row_exclusive.saturating_sub(self.start_row)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Check the per-column run invariants: non-empty, non-zero style, sorted and disjoint.
pub fn validate_runs(runs: &[FormatRun]) -> Result<(), String> {
    let mut prev_end: Option<u32> = None;
    for (i, run) in runs.iter().enumerate() {
        if run.end_row_exclusive <= run.start_row {
            return Err(format!(
                "run {} is empty ({}..{})",
                i, run.start_row, run.end_row_exclusive
            ));
        }
        if run.style_id == 0 {
            return Err(format!("run {} has style id 0", i));
        }
        if let Some(end) = prev_end {
            if run.start_row < end {
                return Err(format!(
                    "run {} starts at row {} before the previous run ends at {}",
                    i, run.start_row, end
                ));
            }
        }
        prev_end = Some(run.end_row_exclusive);
    }
    Ok(())
}
