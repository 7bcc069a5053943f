//! Running a pipeline against host inputs.
//!
//! A run pulls every enabled generator's output nodes through a fresh
//! [`BuildSession`], materializes each generator's artifacts separately, and
//! commits the compacted tables into a new [`DriverState`]. A generator whose
//! callbacks fail reports a warning and contributes nothing; the others are
//! unaffected.

use crate::cancel::CancellationToken;
use crate::codes;
use crate::error::{DriverError, SharedError};
use crate::events::{EventSink, JsonLinesSink};
use crate::ids::{GeneratorId, NodeId};
use crate::node::{downcast_table, AnyTable, Node, PipelineId};
use crate::output::{GeneratorOutputs, OutputKind};
use crate::pipeline::{GeneratorEntry, Pipeline};
use crate::result::{named_steps, GeneratorRunResult, RunResult, StepMap};
use crate::session::BuildSession;
use crate::state::DriverState;
use crate::table::{Item, StateTable};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use weft_common::InternalError;
use weft_config::{ConfigError, WeftConfig};

/// How a [`Driver`] runs its pipeline.
#[derive(Clone, Default)]
pub struct DriverOptions {
    /// Record an [`IncrementalStep`](crate::IncrementalStep) for every table
    /// entry and report named steps in run results.
    pub track_incremental_steps: bool,
    /// Output kinds whose nodes are not run. Their tables keep their last
    /// state and are recomputed once the kind is enabled again.
    pub disabled_outputs: BTreeSet<OutputKind>,
    /// Generators that are skipped entirely.
    pub disabled_generators: BTreeSet<String>,
    /// Directory generated source paths are placed under.
    pub base_directory: PathBuf,
    /// Receives one event per node update.
    pub event_sink: Option<Arc<dyn EventSink>>,
}

impl DriverOptions {
    /// Options from a loaded `weft.toml`. Opens the event file when events
    /// are enabled.
    pub fn from_config(config: &WeftConfig) -> Result<Self, ConfigError> {
        let event_sink: Option<Arc<dyn EventSink>> = match &config.events.path {
            Some(path) if config.events.enabled => Some(Arc::new(JsonLinesSink::create(path)?)),
            _ => None,
        };
        Ok(Self {
            track_incremental_steps: config.driver.track_incremental_steps,
            disabled_outputs: config
                .driver
                .disabled_outputs
                .iter()
                .map(|kind| OutputKind::from(*kind))
                .collect(),
            disabled_generators: config.disabled_generators().into_iter().collect(),
            base_directory: config.driver.base_directory.clone().unwrap_or_default(),
            event_sink,
        })
    }

    fn output_enabled(&self, kind: OutputKind) -> bool {
        !self.disabled_outputs.contains(&kind)
    }
}

impl fmt::Debug for DriverOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverOptions")
            .field("track_incremental_steps", &self.track_incremental_steps)
            .field("disabled_outputs", &self.disabled_outputs)
            .field("disabled_generators", &self.disabled_generators)
            .field("base_directory", &self.base_directory)
            .field("event_sink", &self.event_sink.is_some())
            .finish()
    }
}

/// The tables and results of a successful run.
pub struct RunOutput {
    /// The state to pass to the next run.
    pub state: DriverState,
    /// What the generators produced.
    pub result: RunResult,
    pipeline: PipelineId,
    tables: HashMap<NodeId, AnyTable>,
}

impl RunOutput {
    /// The table `node` produced in this run, before compaction, or `None`
    /// if the run did not update it.
    pub fn table<T: Item>(&self, node: Node<T>) -> Option<Arc<StateTable<T>>> {
        if node.pipeline() != self.pipeline {
            return None;
        }
        let table = self.tables.get(&node.id())?;
        downcast_table::<T>(Arc::clone(table), node.id()).ok()
    }
}

impl fmt::Debug for RunOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOutput")
            .field("state", &self.state)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

/// Runs a pipeline.
///
/// A driver holds no run state: every run starts from the [`DriverState`] it
/// is given, so one driver can serve concurrent runs.
pub struct Driver<I> {
    pipeline: Arc<Pipeline<I>>,
    options: DriverOptions,
}

impl<I> Clone for Driver<I> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            options: self.options.clone(),
        }
    }
}

impl<I: 'static> Driver<I> {
    /// Creates a driver for `pipeline`.
    pub fn new(pipeline: Pipeline<I>, options: DriverOptions) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            options,
        }
    }

    /// The pipeline this driver runs.
    pub fn pipeline(&self) -> &Pipeline<I> {
        &self.pipeline
    }

    /// The driver's options.
    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// A driver for the same pipeline with different options. States from
    /// either driver can be passed to the other.
    pub fn with_options(&self, options: DriverOptions) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            options,
        }
    }

    /// Runs every enabled generator against `inputs`, starting from
    /// `previous`.
    ///
    /// Fails only when cancelled or on an engine invariant violation; in
    /// both cases nothing is committed and `previous` stays valid. Failures
    /// of user callbacks are reported per generator in the result.
    pub fn run(
        &self,
        previous: &DriverState,
        inputs: &I,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, DriverError> {
        let started = Instant::now();
        if previous
            .pipeline()
            .is_some_and(|pipeline| pipeline != self.pipeline.id())
        {
            return Err(InternalError::new("driver state was produced by another pipeline").into());
        }
        let mut session = BuildSession::new(
            &self.pipeline,
            previous,
            inputs,
            cancel,
            self.options.track_incremental_steps,
            self.options.event_sink.as_deref(),
        );
        let generation = session.generation();
        debug!(
            generation,
            generators = self.pipeline.generator_names().count(),
            "starting run"
        );

        let mut generators = Vec::new();
        for (id, entry) in self.pipeline.generators() {
            if self.options.disabled_generators.contains(&*entry.name) {
                continue;
            }
            match self.run_generator(&mut session, id, entry) {
                Ok(result) => generators.push(result),
                Err(DriverError::Cancelled) => {
                    debug!(generation, "run cancelled");
                    return Err(DriverError::Cancelled);
                }
                Err(err) => return Err(err),
            }
        }
        if cancel.is_cancelled() {
            debug!(generation, "run cancelled");
            return Err(DriverError::Cancelled);
        }

        let (state, tables) = session.commit()?;
        let diagnostics = generators
            .iter()
            .flat_map(|result| result.diagnostics.iter().cloned())
            .collect();
        let elapsed = started.elapsed();
        debug!(
            generation,
            tables = state.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "run completed"
        );
        Ok(RunOutput {
            state,
            result: RunResult {
                generators,
                diagnostics,
                elapsed,
            },
            pipeline: self.pipeline.id(),
            tables,
        })
    }

    fn run_generator(
        &self,
        session: &mut BuildSession<'_, I>,
        id: GeneratorId,
        entry: &GeneratorEntry,
    ) -> Result<GeneratorRunResult, DriverError> {
        let started = Instant::now();
        let mut outputs = GeneratorOutputs::new(self.options.base_directory.join(&*entry.name));
        let mut output_steps = StepMap::new();
        let failure = match &entry.init_error {
            Some(err) => Some((err.clone(), codes::generator_init_failed(&entry.name, err))),
            None => self
                .produce(session, entry, &mut outputs, &mut output_steps)?
                .map(|err| {
                    let diagnostic = codes::generator_failed(&entry.name, &err);
                    (err, diagnostic)
                }),
        };

        let mut result = GeneratorRunResult {
            id,
            name: Arc::clone(&entry.name),
            sources: Vec::new(),
            diagnostics: Vec::new(),
            host_outputs: Vec::new(),
            error: None,
            tracked_steps: StepMap::new(),
            tracked_output_steps: StepMap::new(),
            elapsed: started.elapsed(),
        };
        match failure {
            Some((error, diagnostic)) => {
                warn!(generator = %entry.name, error = %error, "generator faulted");
                result.diagnostics.push(diagnostic);
                result.error = Some(error);
            }
            None => {
                let (sources, diagnostics, host_outputs) = outputs.into_parts();
                result.sources = sources;
                result.diagnostics = diagnostics;
                result.host_outputs = host_outputs;
                result.tracked_steps = named_steps(&output_steps);
                result.tracked_output_steps = output_steps;
            }
        }
        Ok(result)
    }

    /// Pulls the generator's enabled output tables, then materializes them.
    /// Returns the generator's error, if it faulted.
    fn produce(
        &self,
        session: &mut BuildSession<'_, I>,
        entry: &GeneratorEntry,
        outputs: &mut GeneratorOutputs,
        output_steps: &mut StepMap,
    ) -> Result<Option<SharedError>, DriverError> {
        let mut tables = Vec::with_capacity(entry.outputs.len());
        for registration in &entry.outputs {
            if !self.options.output_enabled(registration.kind) {
                continue;
            }
            let table = session.table(registration.node)?;
            if let Some(fault) = table.fault() {
                return Ok(Some(Arc::clone(fault.inner())));
            }
            tables.push((registration.kind, table));
        }

        if self.options.output_enabled(OutputKind::PostInit) {
            for source in &entry.post_init {
                if let Err(err) = outputs.add_source(source) {
                    return Ok(Some(Arc::new(err)));
                }
            }
        }
        for (kind, table) in &tables {
            if let Err(err) = outputs.append(table) {
                return Ok(Some(Arc::new(err)));
            }
            if session.track_steps() {
                output_steps
                    .entry(kind.step_name().to_string())
                    .or_default()
                    .extend(table.entries().iter().filter_map(|e| e.step().cloned()));
            }
        }
        Ok(None)
    }
}

impl<I> fmt::Debug for Driver<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("pipeline", &self.pipeline)
            .field("options", &self.options)
            .finish()
    }
}
