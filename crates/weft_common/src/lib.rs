//! Shared foundational types for the Weft incremental engine.
//!
//! This crate provides content hashing for change detection and the internal
//! error type used to report engine bugs.

#![warn(missing_docs)]

pub mod hash;
pub mod result;

pub use hash::{fingerprint, ContentHash};
pub use result::{InternalError, WeftResult};
