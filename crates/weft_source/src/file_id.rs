//! Stable identifier for files in a [`SourceDb`](crate::SourceDb).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a source file in the [`SourceDb`](crate::SourceDb).
///
/// A file keeps its `FileId` across edits, so pipelines can line up the old
/// and new versions of the same file. Ids of removed files are never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct FileId(u32);

impl FileId {
    /// A placeholder id for spans that do not point into any file.
    pub const DUMMY: FileId = FileId(u32::MAX);

    /// Creates a `FileId` from a raw `u32` value.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw `u32` value of this `FileId`.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_roundtrip() {
        assert_eq!(FileId::from_raw(42).as_raw(), 42);
    }

    #[test]
    fn dummy_is_distinct() {
        assert_ne!(FileId::DUMMY, FileId::from_raw(0));
        assert_eq!(FileId::DUMMY.as_raw(), u32::MAX);
    }

    #[test]
    fn display() {
        assert_eq!(FileId::from_raw(3).to_string(), "file#3");
    }
}
