//! The host's current set of source files.

use crate::file_id::FileId;
use crate::source_file::SourceFile;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The source database: the current version of every live file.
///
/// Files are stored as shared [`SourceFile`] snapshots. Edits replace a
/// file's snapshot, removals leave a hole so ids stay stable, and
/// [`snapshot`](Self::snapshot) hands the live set to a pipeline run without
/// copying any text.
#[derive(Debug, Default, Clone)]
pub struct SourceDb {
    files: Vec<Option<Arc<SourceFile>>>,
}

impl SourceDb {
    /// Creates an empty source database.
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    /// Loads a source file from the filesystem and returns its [`FileId`].
    pub fn load_file(&mut self, path: &Path) -> Result<FileId, io::Error> {
        let content = std::fs::read_to_string(path)?;
        Ok(self.add_source(path, content))
    }

    /// Adds a file from an in-memory string.
    ///
    /// The `name` is used as the file path in diagnostics.
    pub fn add_source(&mut self, name: impl Into<PathBuf>, content: impl Into<String>) -> FileId {
        let id = FileId::from_raw(self.files.len() as u32);
        let file = SourceFile::new(id, name.into(), content.into());
        self.files.push(Some(Arc::new(file)));
        id
    }

    /// Replaces the content of a live file, keeping its id and path.
    ///
    /// Returns `false` if the file does not exist or was removed.
    pub fn update_source(&mut self, id: FileId, content: impl Into<String>) -> bool {
        match self.files.get_mut(id.as_raw() as usize) {
            Some(Some(slot)) => {
                let file = SourceFile::new(id, slot.path.clone(), content.into());
                *slot = Arc::new(file);
                true
            }
            _ => false,
        }
    }

    /// Removes a file. Its id is never handed out again.
    ///
    /// Returns the removed snapshot, if the file was live.
    pub fn remove_source(&mut self, id: FileId) -> Option<Arc<SourceFile>> {
        self.files.get_mut(id.as_raw() as usize)?.take()
    }

    /// Returns the current snapshot of a file, if it is live.
    pub fn get_file(&self, id: FileId) -> Option<&Arc<SourceFile>> {
        self.files.get(id.as_raw() as usize)?.as_ref()
    }

    /// Returns the live files in id order.
    pub fn snapshot(&self) -> Vec<Arc<SourceFile>> {
        self.files.iter().flatten().cloned().collect()
    }

    /// Returns the number of live files.
    pub fn len(&self) -> usize {
        self.files.iter().flatten().count()
    }

    /// Returns `true` if no file is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_keeps_id_and_changes_hash() {
        let mut db = SourceDb::new();
        let id = db.add_source("a.cs", "class A {}");
        let before = db.get_file(id).unwrap().clone();
        assert!(db.update_source(id, "class A { int x; }"));
        let after = db.get_file(id).unwrap();
        assert_eq!(after.id, id);
        assert_eq!(after.path, PathBuf::from("a.cs"));
        assert_ne!(before.content_hash, after.content_hash);
        assert_eq!(before.content, "class A {}");
    }

    #[test]
    fn removed_ids_are_not_reused() {
        let mut db = SourceDb::new();
        let a = db.add_source("a.cs", "a");
        let b = db.add_source("b.cs", "b");
        assert!(db.remove_source(a).is_some());
        assert!(db.remove_source(a).is_none());
        assert!(!db.update_source(a, "again"));
        let c = db.add_source("c.cs", "c");
        assert_ne!(c, a);
        let ids: Vec<FileId> = db.snapshot().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![b, c]);
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn snapshot_shares_text() {
        let mut db = SourceDb::new();
        let id = db.add_source("a.cs", "shared");
        let snap = db.snapshot();
        assert!(Arc::ptr_eq(&snap[0], db.get_file(id).unwrap()));
    }

    #[test]
    fn load_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.cs");
        std::fs::write(&path, "partial class Model {}").unwrap();

        let mut db = SourceDb::new();
        let id = db.load_file(&path).unwrap();
        assert_eq!(db.get_file(id).unwrap().content, "partial class Model {}");
        assert!(db.load_file(&dir.path().join("missing.cs")).is_err());
    }
}
