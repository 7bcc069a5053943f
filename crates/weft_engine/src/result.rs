//! What a run reports back to the host.

use crate::error::SharedError;
use crate::ids::GeneratorId;
use crate::output::{GeneratedSource, HostOutput};
use crate::step::IncrementalStep;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use weft_diagnostics::Diagnostic;

/// Tracked steps grouped by name.
pub type StepMap = BTreeMap<String, Vec<Arc<IncrementalStep>>>;

/// The outcome of one generator in one run.
#[derive(Debug, Clone)]
pub struct GeneratorRunResult {
    /// The generator.
    pub id: GeneratorId,
    /// The generator's name.
    pub name: Arc<str>,
    /// Generated sources, post-initialization sources first, then in output
    /// registration order.
    pub sources: Vec<GeneratedSource>,
    /// Diagnostics reported by the generator, or the driver's failure
    /// diagnostic if it faulted.
    pub diagnostics: Vec<Diagnostic>,
    /// Values produced for the host.
    pub host_outputs: Vec<HostOutput>,
    /// The error that faulted the generator, exactly as its callback raised
    /// it. A faulted generator reports no sources or host outputs.
    pub error: Option<SharedError>,
    /// Steps of nodes with a tracking name, by name. Empty unless step
    /// tracking is on.
    pub tracked_steps: StepMap,
    /// Steps of the generator's output nodes, by output kind name such as
    /// `"SourceOutput"`. Empty unless step tracking is on.
    pub tracked_output_steps: StepMap,
    /// Time spent producing this generator's outputs, including the nodes
    /// it was first to pull.
    pub elapsed: Duration,
}

impl GeneratorRunResult {
    /// Returns `true` if the generator faulted or failed to initialize.
    pub fn is_faulted(&self) -> bool {
        self.error.is_some()
    }
}

/// The outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    /// One result per enabled generator, in registration order.
    pub generators: Vec<GeneratorRunResult>,
    /// All generators' diagnostics, in generator order.
    pub diagnostics: Vec<Diagnostic>,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl RunResult {
    /// The result of the generator named `name`.
    pub fn generator(&self, name: &str) -> Option<&GeneratorRunResult> {
        self.generators.iter().find(|result| &*result.name == name)
    }

    /// All generated sources, in generator order.
    pub fn sources(&self) -> impl Iterator<Item = &GeneratedSource> {
        self.generators.iter().flat_map(|result| &result.sources)
    }

    /// All host outputs, in generator order.
    pub fn host_outputs(&self) -> impl Iterator<Item = &HostOutput> {
        self.generators.iter().flat_map(|result| &result.host_outputs)
    }
}

/// Groups every named step reachable from `output_steps` by name, each
/// step once, in creation order.
pub(crate) fn named_steps(output_steps: &StepMap) -> StepMap {
    let mut seen = HashSet::new();
    let mut named = StepMap::new();
    let mut stack: Vec<Arc<IncrementalStep>> = output_steps
        .values()
        .flatten()
        .flat_map(|step| step.inputs())
        .map(|input| Arc::clone(&input.step))
        .collect();
    while let Some(step) = stack.pop() {
        if !seen.insert(step.id()) {
            continue;
        }
        stack.extend(step.inputs().iter().map(|input| Arc::clone(&input.step)));
        if let Some(name) = step.name() {
            named.entry(name.to_string()).or_default().push(step);
        }
    }
    for steps in named.values_mut() {
        steps.sort_by_key(|step| step.id());
    }
    named
}
