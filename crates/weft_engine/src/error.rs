//! Error types for driver runs and user callback faults.

use crate::cancel::Cancelled;
use crate::ids::NodeId;
use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use weft_common::InternalError;

/// Error type accepted from fallible user callbacks.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// A user error shared between every table and result that reports it.
pub type SharedError = Arc<dyn Error + Send + Sync + 'static>;

/// Why a [`Driver::run`](crate::Driver::run) did not produce a result.
///
/// User callback failures are not errors of the run: they fault the affected
/// generator and show up on its [`GeneratorRunResult`](crate::GeneratorRunResult).
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The cancellation token fired. Nothing was committed.
    #[error("run was cancelled")]
    Cancelled,

    /// An engine invariant was violated.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl From<Cancelled> for DriverError {
    fn from(_: Cancelled) -> Self {
        DriverError::Cancelled
    }
}

/// A failure raised by a user callback, recorded in a faulted state table.
///
/// Every node downstream of the failing one carries the same
/// `UserFunctionError` without running its own callback.
#[derive(Debug, Clone)]
pub struct UserFunctionError {
    node: NodeId,
    location: String,
    source: SharedError,
}

impl UserFunctionError {
    /// Wraps an error raised by the callback of `node`.
    pub fn new(node: NodeId, name: Option<&str>, source: SharedError) -> Self {
        let location = match name {
            Some(name) => format!("{node} '{name}'"),
            None => node.to_string(),
        };
        Self {
            node,
            location,
            source,
        }
    }

    /// The node whose callback failed.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The original error, as raised by the callback.
    pub fn inner(&self) -> &SharedError {
        &self.source
    }
}

impl fmt::Display for UserFunctionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callback of {} failed: {}", self.location, self.source)
    }
}

// The source is the user's error itself, not the `Arc` around it.
impl Error for UserFunctionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.source)
    }
}

/// A panic caught at a callback boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("callback panicked: {message}")]
pub struct PanicError {
    /// The panic message, when the payload was a string.
    pub message: String,
}

impl PanicError {
    /// Builds a `PanicError` from a payload returned by `catch_unwind`.
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

/// A generator produced an artifact the driver cannot accept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArtifactError {
    /// The hint name is empty, rooted, or contains characters that are not
    /// allowed in a file name.
    #[error("hint name '{hint_name}' is invalid: {reason}")]
    InvalidHintName {
        /// The rejected hint name.
        hint_name: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Two sources of the same generator share a hint name, ignoring ASCII case.
    #[error("hint name '{hint_name}' was already added by this generator")]
    DuplicateHintName {
        /// The repeated hint name.
        hint_name: String,
    },
}
