//! Result and error types for engine-internal failures.

/// The result type for operations that can only fail through an engine bug.
///
/// Faults raised by user callbacks are not reported this way. They are
/// captured as data inside the affected state tables and surface on the run
/// result, while the run itself still returns `Ok`.
pub type WeftResult<T> = Result<T, InternalError>;

/// An internal error indicating a bug in Weft or a misuse of its API that the
/// type system could not rule out, such as handing a driver state to a
/// different pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("internal engine error: {message}")]
pub struct InternalError {
    /// Description of the violated invariant.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("table type mismatch");
        assert_eq!(format!("{err}"), "internal engine error: table type mismatch");
    }

    #[test]
    fn err_path() {
        let r: WeftResult<i32> = Err(InternalError::new("unknown node"));
        assert_eq!(r.unwrap_err().message, "unknown node");
    }

    #[test]
    fn from_string() {
        let err: InternalError = format!("node {} missing", 3).into();
        assert_eq!(err.message, "node 3 missing");
    }
}
