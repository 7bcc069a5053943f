//! Node handles and the type-erased operation interface the driver calls.
//!
//! Nodes live in their pipeline's arena as [`NodeSlot`]s. Each slot carries a
//! closed [`NodeKind`] tag plus a boxed [`ErasedOp`], which downcasts the
//! previous table to its concrete `StateTable<T>` and forwards to the typed
//! [`NodeOp`] implementation of the node's kind.

use crate::comparer::Comparer;
use crate::error::{DriverError, SharedError, UserFunctionError};
use crate::ids::NodeId;
use crate::session::BuildSession;
use crate::step::StepInput;
use crate::table::{Item, StateTable, TableBuilder, Value};
use serde::{Deserialize, Serialize};
use std::any::{type_name, Any};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use weft_common::{InternalError, WeftResult};

/// A state table with its item type erased.
pub(crate) type AnyTable = Arc<dyn Any + Send + Sync>;

/// The kind of a pipeline node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum NodeKind {
    /// Snapshots host inputs and diffs them against the previous run.
    Input,
    /// Maps, filters, or fans out each upstream item.
    Transform,
    /// Collects all upstream items into one value.
    Batch,
    /// Pairs each left item with the single right value.
    Combine,
    /// Finds and transforms syntax nodes file by file.
    SyntaxInput,
    /// Produces generated sources, diagnostics, or host outputs.
    Output,
}

static NEXT_PIPELINE_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of one pipeline, used to reject handles and states from another.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct PipelineId(u64);

impl PipelineId {
    pub(crate) fn next() -> Self {
        Self(NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A typed handle to a node producing items of type `T`.
///
/// Handles are cheap to copy and only meaningful for the pipeline that
/// created them.
pub struct Node<T> {
    pipeline: PipelineId,
    id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Node<T> {
    pub(crate) fn new(pipeline: PipelineId, id: NodeId) -> Self {
        Self {
            pipeline,
            id,
            _marker: PhantomData,
        }
    }

    /// The node's id within its pipeline.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn pipeline(&self) -> PipelineId {
        self.pipeline
    }
}

impl<T> Clone for Node<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Node<T> {}

impl<T> PartialEq for Node<T> {
    fn eq(&self, other: &Self) -> bool {
        self.pipeline == other.pipeline && self.id == other.id
    }
}

impl<T> Eq for Node<T> {}

impl<T> Hash for Node<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pipeline.hash(state);
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node<{}>({})", type_name::<T>(), self.id)
    }
}

/// One node as stored in the pipeline arena.
pub(crate) struct NodeSlot<I> {
    pub(crate) kind: NodeKind,
    pub(crate) name: Option<Arc<str>>,
    pub(crate) upstream: Vec<NodeId>,
    pub(crate) op: Box<dyn ErasedOp<I>>,
}

/// What the driver logs about a table without knowing its item type.
pub(crate) struct TableSummary {
    pub(crate) fingerprint: u64,
    pub(crate) states: String,
    pub(crate) faulted: bool,
}

/// The driver-facing side of a node operation.
pub(crate) trait ErasedOp<I>: Send + Sync {
    fn update(
        &self,
        session: &mut BuildSession<'_, I>,
        id: NodeId,
        name: Option<&Arc<str>>,
        previous: Option<AnyTable>,
    ) -> Result<AnyTable, DriverError>;

    /// Returns the table to keep for the next run, or `None` for a faulted
    /// table, which is never kept.
    fn compact(&self, id: NodeId, table: &AnyTable) -> WeftResult<Option<AnyTable>>;

    fn summarize(&self, id: NodeId, table: &AnyTable) -> WeftResult<TableSummary>;

    fn as_any(&self) -> &dyn Any;
}

/// The typed behavior of one node kind.
pub(crate) trait NodeOp<I, T>: Send + Sync {
    fn update(
        &self,
        session: &mut BuildSession<'_, I>,
        cx: &NodeContext<'_, T>,
        previous: Option<Arc<StateTable<T>>>,
    ) -> Result<Arc<StateTable<T>>, DriverError>;
}

/// Per-node parameters handed to a [`NodeOp`].
pub(crate) struct NodeContext<'a, T> {
    pub(crate) id: NodeId,
    pub(crate) name: Option<&'a Arc<str>>,
    pub(crate) comparer: &'a Comparer<T>,
}

impl<'a, T: Item> NodeContext<'a, T> {
    pub(crate) fn builder<'p>(
        &self,
        previous: Option<&'p StateTable<T>>,
        track: bool,
    ) -> TableBuilder<'p, T> {
        TableBuilder::new(previous, Some(self.comparer.clone()), self.name.cloned(), track)
    }

    /// A faulted table for an error raised by this node's own callback.
    pub(crate) fn fault(&self, error: SharedError) -> Arc<StateTable<T>> {
        let fault = UserFunctionError::new(self.id, self.name.map(|n| &**n), error);
        Arc::new(StateTable::faulted(Arc::new(fault)))
    }

    /// Reuses a previous table that is fully cached, recording fresh steps
    /// when tracking is on.
    pub(crate) fn reuse(
        &self,
        previous: Arc<StateTable<T>>,
        track: bool,
        inputs: impl FnMut(usize) -> Vec<StepInput>,
    ) -> Arc<StateTable<T>> {
        if track {
            Arc::new(previous.restamp(self.name, inputs))
        } else {
            previous
        }
    }
}

/// A faulted table carrying an upstream node's fault.
pub(crate) fn propagate<T>(fault: &Arc<UserFunctionError>) -> Arc<StateTable<T>> {
    Arc::new(StateTable::faulted(Arc::clone(fault)))
}

pub(crate) fn downcast_table<T: Item>(
    table: AnyTable,
    id: NodeId,
) -> WeftResult<Arc<StateTable<T>>> {
    table.downcast::<StateTable<T>>().map_err(|_| {
        InternalError::new(format!(
            "{id} does not hold a table of {}",
            type_name::<T>()
        ))
    })
}

/// Adapts a typed [`NodeOp`] to the driver's [`ErasedOp`] interface and
/// carries the node's comparer.
pub(crate) struct TypedOp<I, T> {
    pub(crate) op: Arc<dyn NodeOp<I, T>>,
    pub(crate) comparer: Comparer<T>,
}

impl<I, T> Clone for TypedOp<I, T> {
    fn clone(&self) -> Self {
        Self {
            op: Arc::clone(&self.op),
            comparer: self.comparer.clone(),
        }
    }
}

impl<I: 'static, T: Value> ErasedOp<I> for TypedOp<I, T> {
    fn update(
        &self,
        session: &mut BuildSession<'_, I>,
        id: NodeId,
        name: Option<&Arc<str>>,
        previous: Option<AnyTable>,
    ) -> Result<AnyTable, DriverError> {
        let previous = previous
            .map(|table| downcast_table::<T>(table, id))
            .transpose()?;
        let cx = NodeContext {
            id,
            name,
            comparer: &self.comparer,
        };
        let table = self.op.update(session, &cx, previous)?;
        Ok(table)
    }

    fn compact(&self, id: NodeId, table: &AnyTable) -> WeftResult<Option<AnyTable>> {
        let typed = downcast_table::<T>(Arc::clone(table), id)?;
        let stepless = typed.entries().iter().all(|entry| entry.step().is_none());
        if typed.is_faulted() {
            Ok(None)
        } else if typed.is_cached() && stepless {
            Ok(Some(Arc::clone(table)))
        } else {
            Ok(Some(Arc::new(typed.compact())))
        }
    }

    fn summarize(&self, id: NodeId, table: &AnyTable) -> WeftResult<TableSummary> {
        let typed = downcast_table::<T>(Arc::clone(table), id)?;
        Ok(TableSummary {
            fingerprint: typed.fingerprint(),
            states: typed.packed_states(),
            faulted: typed.is_faulted(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
