//! One run's memoized evaluation of the node graph.

use crate::cancel::CancellationToken;
use crate::error::DriverError;
use crate::events::{EventSink, NodeEvent};
use crate::ids::NodeId;
use crate::node::{downcast_table, AnyTable, Node, NodeSlot};
use crate::pipeline::Pipeline;
use crate::state::{CachedTable, DriverState};
use crate::table::{Item, StateTable};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use weft_common::{InternalError, WeftResult};

/// Evaluates nodes on demand during one run.
///
/// Each node is updated at most once per session; later requests return the
/// memoized table. Nodes nobody asks for are not updated and keep their
/// previous tables. A node that starts without a previous table makes every
/// downstream node start without one too, since its items all come back as
/// `Added` and can no longer be matched against older downstream entries.
pub(crate) struct BuildSession<'a, I> {
    pipeline: &'a Pipeline<I>,
    previous: &'a DriverState,
    inputs: &'a I,
    cancel: &'a CancellationToken,
    track_steps: bool,
    events: Option<&'a dyn EventSink>,
    generation: u64,
    tables: HashMap<NodeId, AnyTable>,
    syntax_tables: HashMap<NodeId, Option<AnyTable>>,
    fresh: HashSet<NodeId>,
}

impl<'a, I: 'static> BuildSession<'a, I> {
    pub(crate) fn new(
        pipeline: &'a Pipeline<I>,
        previous: &'a DriverState,
        inputs: &'a I,
        cancel: &'a CancellationToken,
        track_steps: bool,
        events: Option<&'a dyn EventSink>,
    ) -> Self {
        Self {
            pipeline,
            previous,
            inputs,
            cancel,
            track_steps,
            events,
            generation: previous.generation() + 1,
            tables: HashMap::new(),
            syntax_tables: HashMap::new(),
            fresh: HashSet::new(),
        }
    }

    pub(crate) fn inputs(&self) -> &'a I {
        self.inputs
    }

    pub(crate) fn cancel(&self) -> &'a CancellationToken {
        self.cancel
    }

    pub(crate) fn track_steps(&self) -> bool {
        self.track_steps
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns this run's table for `node`, updating it first if needed.
    pub(crate) fn table<T: Item>(&mut self, node: Node<T>) -> Result<Arc<StateTable<T>>, DriverError> {
        if node.pipeline() != self.pipeline.id() {
            return Err(InternalError::new(format!(
                "{} belongs to a different pipeline",
                node.id()
            ))
            .into());
        }
        let table = self.pull(node.id())?;
        Ok(downcast_table::<T>(table, node.id())?)
    }

    fn pull(&mut self, id: NodeId) -> Result<AnyTable, DriverError> {
        if let Some(table) = self.tables.get(&id) {
            return Ok(Arc::clone(table));
        }
        self.cancel.check()?;
        let pipeline = self.pipeline;
        let slot = pipeline.slot(id)?;
        let started = Instant::now();
        for upstream in &slot.upstream {
            self.pull(*upstream)?;
        }
        let previous = if slot.upstream.iter().any(|up| self.fresh.contains(up)) {
            if self.previous.tables().contains_key(&id) {
                debug!(node = %id, "upstream started fresh, discarding previous table");
            }
            None
        } else {
            let previous = self.previous.valid_table(id, &slot.upstream);
            if previous.is_none() && self.previous.tables().contains_key(&id) {
                debug!(node = %id, "discarding stale previous table");
            }
            previous
        };

        let table = slot.op.update(self, id, slot.name.as_ref(), previous.clone())?;
        if previous.is_none() {
            self.fresh.insert(id);
        }
        self.report(id, slot, previous.as_ref(), &table, started.elapsed())?;
        self.tables.insert(id, Arc::clone(&table));
        Ok(table)
    }

    fn report(
        &self,
        id: NodeId,
        slot: &NodeSlot<I>,
        previous: Option<&AnyTable>,
        table: &AnyTable,
        elapsed: Duration,
    ) -> WeftResult<()> {
        let summary = slot.op.summarize(id, table)?;
        let elapsed_us = elapsed.as_micros() as u64;
        trace!(
            generation = self.generation,
            node = %id,
            kind = ?slot.kind,
            name = slot.name.as_deref(),
            states = %summary.states,
            fingerprint = summary.fingerprint,
            faulted = summary.faulted,
            elapsed_us,
            "node updated"
        );
        let Some(events) = self.events else {
            return Ok(());
        };
        let previous_fingerprint = match previous {
            Some(previous) => Some(slot.op.summarize(id, previous)?.fingerprint),
            None => None,
        };
        events.node_updated(&NodeEvent {
            generation: self.generation,
            node: id,
            kind: slot.kind,
            name: slot.name.as_deref().map(str::to_string),
            previous_fingerprint,
            fingerprint: summary.fingerprint,
            states: summary.states,
            faulted: summary.faulted,
            elapsed_us,
        });
        Ok(())
    }

    /// The previous filter table of a syntax node, if still valid.
    pub(crate) fn previous_syntax_table(&self, id: NodeId) -> WeftResult<Option<AnyTable>> {
        let slot = self.pipeline.slot(id)?;
        Ok(self.previous.valid_syntax_table(id, &slot.upstream))
    }

    /// Records the filter table a syntax node produced; `None` drops it.
    pub(crate) fn set_syntax_table(&mut self, id: NodeId, table: Option<AnyTable>) {
        self.syntax_tables.insert(id, table);
    }

    /// Builds the state for the next run: the previous tables, overwritten by
    /// the compacted tables of every node updated in this session. Faulted
    /// tables are dropped so their nodes start fresh.
    pub(crate) fn commit(self) -> WeftResult<(DriverState, HashMap<NodeId, AnyTable>)> {
        let mut tables = self.previous.tables().clone();
        let mut syntax = self.previous.syntax_tables().clone();
        for (id, table) in &self.tables {
            let slot = self.pipeline.slot(*id)?;
            match slot.op.compact(*id, table)? {
                Some(table) => {
                    tables.insert(
                        *id,
                        CachedTable {
                            table,
                            generation: self.generation,
                        },
                    );
                }
                None => {
                    tables.remove(id);
                    syntax.remove(id);
                }
            }
        }
        for (id, table) in self.syntax_tables {
            match table {
                Some(table) if tables.contains_key(&id) => {
                    syntax.insert(
                        id,
                        CachedTable {
                            table,
                            generation: self.generation,
                        },
                    );
                }
                _ => {
                    syntax.remove(&id);
                }
            }
        }
        let state = DriverState::from_parts(self.pipeline.id(), self.generation, tables, syntax);
        Ok((state, self.tables))
    }
}
