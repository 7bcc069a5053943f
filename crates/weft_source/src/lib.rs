//! Source files fed into generator pipelines.
//!
//! The [`SourceDb`] owns the host's current set of files and hands out cheap
//! [`SourceFile`] snapshots to pipeline inputs. [`FileId`] and [`Span`] locate
//! text for diagnostics.

#![warn(missing_docs)]

pub mod file_id;
pub mod source_db;
pub mod source_file;
pub mod span;

pub use file_id::FileId;
pub use source_db::SourceDb;
pub use source_file::SourceFile;
pub use span::Span;
