//! The boundary every user and host callback is invoked through.

use crate::cancel::{CancellationToken, Cancelled};
use crate::error::{BoxError, PanicError, SharedError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Runs a user callback, turning its failures into data.
///
/// The outer `Result` is the run's own cancellation: it is `Err` when the
/// token was already cancelled, or when the callback reported [`Cancelled`]
/// while the token is cancelled. Any other error or panic comes back as the
/// inner `Err`, ready to fault the node. A callback reporting `Cancelled` on
/// its own, with the token still live, counts as an ordinary failure.
pub(crate) fn invoke<R>(
    cancel: &CancellationToken,
    f: impl FnOnce() -> Result<R, BoxError>,
) -> Result<Result<R, SharedError>, Cancelled> {
    cancel.check()?;
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(Ok(value)),
        Ok(Err(error)) => {
            if error.is::<Cancelled>() && cancel.is_cancelled() {
                return Err(Cancelled);
            }
            Ok(Err(Arc::from(error)))
        }
        Err(payload) => {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            Ok(Err(Arc::new(PanicError::from_payload(payload))))
        }
    }
}
