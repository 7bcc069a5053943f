//! Output nodes: a generator's output callback run per upstream item.
//!
//! An output node is a transform producing one [`OutputRecord`] per item, so
//! cached items keep their previous record and never re-run output code.

use crate::cancel::CancellationToken;
use crate::error::BoxError;
use crate::nodes::transform::TransformFn;
use crate::output::{HostProductionContext, OutputRecord, SourceProductionContext};
use std::sync::Arc;

pub(crate) type SourceAction<T> = Arc<dyn Fn(&mut SourceProductionContext<'_>, &T) + Send + Sync>;
pub(crate) type HostAction<T> = Arc<dyn Fn(&mut HostProductionContext<'_>, &T) + Send + Sync>;

/// The callback an output node runs.
pub(crate) enum OutputAction<T> {
    Source(SourceAction<T>),
    Host(HostAction<T>),
}

impl<T: 'static> OutputAction<T> {
    /// The transform that runs this action and captures what it produced.
    pub(crate) fn into_transform(self) -> TransformFn<T, OutputRecord> {
        match self {
            OutputAction::Source(action) => {
                Arc::new(move |value: &T, cancel: &CancellationToken| {
                    produce_source(&action, value, cancel)
                })
            }
            OutputAction::Host(action) => {
                Arc::new(move |value: &T, cancel: &CancellationToken| {
                    produce_host(&action, value, cancel)
                })
            }
        }
    }
}

fn produce_source<T>(
    action: &SourceAction<T>,
    value: &T,
    cancel: &CancellationToken,
) -> Result<Vec<OutputRecord>, BoxError> {
    let mut cx = SourceProductionContext::new(cancel);
    action(&mut cx, value);
    Ok(vec![cx.finish()?])
}

fn produce_host<T>(
    action: &HostAction<T>,
    value: &T,
    cancel: &CancellationToken,
) -> Result<Vec<OutputRecord>, BoxError> {
    let mut cx = HostProductionContext::new(cancel);
    action(&mut cx, value);
    Ok(vec![cx.finish()])
}
