//! Incremental pipeline engine for source generators.
//!
//! A host describes its inputs once, as input nodes on a
//! [`PipelineBuilder`], and registers generators that derive their own nodes
//! from them: transforms, batches, combines, and syntax providers that match
//! nodes in the host's syntax trees. Each generator ends in output nodes that
//! add generated sources, diagnostics, or values for the host.
//!
//! A [`Driver`] runs the frozen [`Pipeline`] repeatedly. Every node keeps a
//! [`StateTable`] of its outputs tagged with how they changed since the
//! previous run ([`DiffState`]), and does work only for inputs that changed.
//! A run starts from the [`DriverState`] the previous run returned, so a
//! rerun over unchanged inputs invokes no user callback at all.
//!
//! User callbacks may fail or panic. The failure is stored in the node's
//! table, skips every node downstream of it, and turns into a warning for
//! the generator it belongs to; other generators are unaffected and the next
//! run recomputes the failed nodes.

#![warn(missing_docs)]

pub mod arena;
pub mod cancel;
pub mod codes;
pub mod comparer;
pub mod diff;
pub mod driver;
pub mod error;
pub mod events;
pub mod ids;
pub mod node;
pub mod output;
pub mod pipeline;
pub mod result;
pub mod state;
pub mod step;
pub mod syntax;
pub mod table;

mod nodes;
mod session;
mod user_fn;

pub use cancel::{CancellationToken, Cancelled};
pub use comparer::Comparer;
pub use diff::{DiffState, RunReason};
pub use driver::{Driver, DriverOptions, RunOutput};
pub use error::{ArtifactError, BoxError, DriverError, PanicError, SharedError, UserFunctionError};
pub use events::{EventSink, JsonLinesSink, MemorySink, NodeEvent};
pub use ids::{GeneratorId, NodeId};
pub use node::{Node, NodeKind};
pub use output::{
    GeneratedSource, HostOutput, HostProductionContext, OutputKind, PostInitContext,
    SourceProductionContext,
};
pub use pipeline::{GeneratorContext, Pipeline, PipelineBuilder};
pub use result::{GeneratorRunResult, RunResult, StepMap};
pub use state::DriverState;
pub use step::{IncrementalStep, StepId, StepInput, StepOutput};
pub use syntax::{SyntaxContext, SyntaxTree};
pub use table::{Item, StateTable, TableEntry, TableItem, Value};
