//! Per-item change tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How an item of a state table relates to the previous run.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum DiffState {
    /// New this run, with no counterpart in the previous table.
    Added,
    /// Present in the previous table and gone now.
    Removed,
    /// Replaces a previous item and compares unequal to it.
    Modified,
    /// Equal to the previous item, which is reused as is.
    Cached,
}

impl DiffState {
    /// Returns the single-letter tag used in packed state strings (`A`, `R`,
    /// `M`, `C`).
    pub fn as_char(self) -> char {
        match self {
            DiffState::Added => 'A',
            DiffState::Removed => 'R',
            DiffState::Modified => 'M',
            DiffState::Cached => 'C',
        }
    }
}

impl fmt::Display for DiffState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiffState::Added => "added",
            DiffState::Removed => "removed",
            DiffState::Modified => "modified",
            DiffState::Cached => "cached",
        };
        f.write_str(name)
    }
}

/// Why a step produced an output, as reported in run history.
///
/// Unlike [`DiffState`], this separates outputs reused without running the
/// step (`Cached`) from outputs that were recomputed and turned out equal to
/// the previous ones (`Unchanged`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum RunReason {
    /// The output did not exist in the previous run.
    New,
    /// The output was recomputed and differs from the previous run.
    Modified,
    /// The output was recomputed and equals the previous run's.
    Unchanged,
    /// The output was reused without recomputation.
    Cached,
    /// The output existed in the previous run and is gone.
    Removed,
}

impl RunReason {
    /// Derives the reason for an output tagged `output` whose inputs were
    /// tagged `input`.
    pub fn for_output(output: DiffState, input: DiffState) -> Self {
        match output {
            DiffState::Added => RunReason::New,
            DiffState::Removed => RunReason::Removed,
            DiffState::Modified => RunReason::Modified,
            DiffState::Cached if input == DiffState::Cached => RunReason::Cached,
            DiffState::Cached => RunReason::Unchanged,
        }
    }
}
