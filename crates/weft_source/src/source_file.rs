//! An immutable snapshot of one source file.

use crate::file_id::FileId;
use crate::span::Span;
use std::path::PathBuf;
use weft_common::ContentHash;

/// One version of a source file.
///
/// Snapshots are immutable. Editing a file in the [`SourceDb`](crate::SourceDb)
/// produces a new `SourceFile` with the same [`FileId`] and a new
/// [`content_hash`](Self::content_hash), so `(id, content_hash)` identifies a
/// version.
#[derive(Debug)]
pub struct SourceFile {
    /// The file's identifier, stable across edits.
    pub id: FileId,
    /// The file's path, or a synthetic name for in-memory sources.
    pub path: PathBuf,
    /// The full text content of this version.
    pub content: String,
    /// Hash of [`content`](Self::content).
    pub content_hash: ContentHash,
    /// Byte offsets of each line start (the first entry is always 0).
    line_starts: Vec<u32>,
}

impl SourceFile {
    /// Creates a snapshot, indexing line starts and hashing the content.
    pub fn new(id: FileId, path: PathBuf, content: String) -> Self {
        let line_starts = compute_line_starts(&content);
        let content_hash = ContentHash::from_text(&content);
        Self {
            id,
            path,
            content,
            content_hash,
            line_starts,
        }
    }

    /// Returns the number of lines, counting a trailing partial line.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Returns the span of line `index` (0-indexed) without its line break.
    pub fn line_span(&self, index: usize) -> Option<Span> {
        let start = *self.line_starts.get(index)?;
        let mut end = self
            .line_starts
            .get(index + 1)
            .map_or(self.content.len() as u32, |next| next - 1);
        if end > start && self.content.as_bytes()[end as usize - 1] == b'\r' {
            end -= 1;
        }
        Some(Span::new(self.id, start, end))
    }

    /// Returns a substring of the file content between byte offsets.
    pub fn snippet(&self, start: u32, end: u32) -> &str {
        &self.content[start as usize..end as usize]
    }
}

fn compute_line_starts(content: &str) -> Vec<u32> {
    let mut starts = vec![0u32];
    for (i, byte) in content.bytes().enumerate() {
        if byte == b'\n' {
            starts.push((i + 1) as u32);
        }
    }
    starts
}
