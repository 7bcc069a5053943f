//! Step records describing how each table entry was produced.
//!
//! When step tracking is on, every entry a node builds gets an
//! [`IncrementalStep`] naming the upstream steps it consumed and the reason
//! for each output. Steps form a graph through [`StepInput::step`], which run
//! results walk to report the history of named nodes.

use crate::diff::RunReason;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_STEP_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identity of a step record, used to deduplicate run history.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct StepId(u64);

impl StepId {
    fn next() -> Self {
        Self(NEXT_STEP_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// One upstream output consumed by a step.
#[derive(Clone, Debug)]
pub struct StepInput {
    /// The upstream step.
    pub step: Arc<IncrementalStep>,
    /// Which of the upstream step's outputs was consumed.
    pub output_index: usize,
}

/// One output of a step and why it was produced.
#[derive(Clone)]
pub struct StepOutput {
    /// The output value, type-erased.
    pub value: Arc<dyn Any + Send + Sync>,
    /// Why this output has its current value.
    pub reason: RunReason,
}

impl StepOutput {
    /// Returns the output value if it has type `T`.
    pub fn value<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for StepOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepOutput")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

/// The record of one node producing one table entry.
#[derive(Debug)]
pub struct IncrementalStep {
    id: StepId,
    name: Option<Arc<str>>,
    inputs: Vec<StepInput>,
    outputs: Vec<StepOutput>,
    elapsed: Duration,
}

impl IncrementalStep {
    pub(crate) fn new(
        name: Option<Arc<str>>,
        inputs: Vec<StepInput>,
        outputs: Vec<StepOutput>,
        elapsed: Duration,
    ) -> Self {
        Self {
            id: StepId::next(),
            name,
            inputs,
            outputs,
            elapsed,
        }
    }

    /// The step's unique id.
    pub fn id(&self) -> StepId {
        self.id
    }

    /// The tracking name of the node that ran the step, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The upstream outputs this step consumed.
    pub fn inputs(&self) -> &[StepInput] {
        &self.inputs
    }

    /// The outputs this step produced, in entry order.
    pub fn outputs(&self) -> &[StepOutput] {
        &self.outputs
    }

    /// Time spent in the node's callback for this entry. Zero for entries
    /// reused from the previous run.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Convenience: the reasons of all outputs, in order.
    pub fn reasons(&self) -> Vec<RunReason> {
        self.outputs.iter().map(|o| o.reason).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = IncrementalStep::new(None, Vec::new(), Vec::new(), Duration::ZERO);
        let b = IncrementalStep::new(None, Vec::new(), Vec::new(), Duration::ZERO);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn outputs_downcast() {
        let step = IncrementalStep::new(
            Some(Arc::from("Names")),
            Vec::new(),
            vec![StepOutput {
                value: Arc::new("Widget".to_string()),
                reason: RunReason::New,
            }],
            Duration::from_micros(5),
        );
        assert_eq!(step.name(), Some("Names"));
        assert_eq!(
            step.outputs()[0].value::<String>().map(String::as_str),
            Some("Widget")
        );
        assert!(step.outputs()[0].value::<u32>().is_none());
        assert_eq!(step.reasons(), vec![RunReason::New]);
    }
}
