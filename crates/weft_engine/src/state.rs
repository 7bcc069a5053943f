//! The immutable state one run hands to the next.

use crate::ids::NodeId;
use crate::node::{downcast_table, AnyTable, Node, PipelineId};
use crate::table::{Item, StateTable};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A compacted table and the run that produced it.
#[derive(Clone)]
pub(crate) struct CachedTable {
    pub(crate) table: AnyTable,
    pub(crate) generation: u64,
}

/// Compacted node tables from a completed run.
///
/// A `DriverState` is immutable and cheap to clone. Pass the state returned
/// by one run as the `previous` of the next; any number of runs may start
/// from the same state, concurrently. [`DriverState::new`] is the empty state
/// of a first run.
#[derive(Clone, Default)]
pub struct DriverState {
    pipeline: Option<PipelineId>,
    generation: u64,
    tables: Arc<HashMap<NodeId, CachedTable>>,
    syntax: Arc<HashMap<NodeId, CachedTable>>,
}

impl DriverState {
    /// The state before any run.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        pipeline: PipelineId,
        generation: u64,
        tables: HashMap<NodeId, CachedTable>,
        syntax: HashMap<NodeId, CachedTable>,
    ) -> Self {
        Self {
            pipeline: Some(pipeline),
            generation,
            tables: Arc::new(tables),
            syntax: Arc::new(syntax),
        }
    }

    /// Number of completed runs this state descends from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of node tables carried to the next run.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` if no table is carried.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Returns the compacted table of `node`, if it was kept.
    pub fn table<T: Item>(&self, node: Node<T>) -> Option<Arc<StateTable<T>>> {
        if self.pipeline != Some(node.pipeline()) {
            return None;
        }
        let cached = self.tables.get(&node.id())?;
        downcast_table::<T>(Arc::clone(&cached.table), node.id()).ok()
    }

    pub(crate) fn pipeline(&self) -> Option<PipelineId> {
        self.pipeline
    }

    pub(crate) fn tables(&self) -> &HashMap<NodeId, CachedTable> {
        &self.tables
    }

    pub(crate) fn syntax_tables(&self) -> &HashMap<NodeId, CachedTable> {
        &self.syntax
    }

    /// Returns the previous table of `id`, unless an upstream table was
    /// updated by a later run than this one. Such a table was skipped while
    /// its inputs moved on, so diffing against it would be wrong.
    pub(crate) fn valid_table(&self, id: NodeId, upstream: &[NodeId]) -> Option<AnyTable> {
        let cached = self.valid_entry(id, upstream)?;
        Some(Arc::clone(&cached.table))
    }

    /// Returns the previous filter table of a syntax node, if it was written
    /// by the same run as the node's own valid table.
    pub(crate) fn valid_syntax_table(&self, id: NodeId, upstream: &[NodeId]) -> Option<AnyTable> {
        let node = self.valid_entry(id, upstream)?;
        let filter = self.syntax.get(&id)?;
        (filter.generation == node.generation).then(|| Arc::clone(&filter.table))
    }

    fn valid_entry(&self, id: NodeId, upstream: &[NodeId]) -> Option<&CachedTable> {
        let cached = self.tables.get(&id)?;
        let fresh = upstream.iter().all(|up| {
            self.tables
                .get(up)
                .is_some_and(|table| table.generation <= cached.generation)
        });
        fresh.then_some(cached)
    }
}

impl fmt::Debug for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverState")
            .field("generation", &self.generation)
            .field("tables", &self.tables.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparer::Comparer;
    use crate::diff::DiffState;
    use crate::table::TableBuilder;
    use std::time::Duration;

    fn cached(generation: u64) -> CachedTable {
        let mut builder = TableBuilder::new(None, Some(Comparer::<u32>::default()), None, false);
        builder.add(vec![1], DiffState::Added, Vec::new(), Duration::ZERO);
        CachedTable {
            table: Arc::new(builder.finish().compact()),
            generation,
        }
    }

    fn state(tables: &[(u32, u64)]) -> (PipelineId, DriverState) {
        let pipeline = PipelineId::next();
        let tables = tables
            .iter()
            .map(|(id, generation)| (NodeId::from_raw(*id), cached(*generation)))
            .collect();
        (pipeline, DriverState::from_parts(pipeline, 3, tables, HashMap::new()))
    }

    #[test]
    fn empty_state() {
        let state = DriverState::new();
        assert_eq!(state.generation(), 0);
        assert!(state.is_empty());
        assert!(state.pipeline().is_none());
    }

    #[test]
    fn stale_upstream_invalidates_table() {
        let (_, state) = state(&[(0, 3), (1, 2), (2, 3)]);
        let up = [NodeId::from_raw(0)];
        assert!(state.valid_table(NodeId::from_raw(1), &up).is_none());
        assert!(state.valid_table(NodeId::from_raw(2), &up).is_some());
    }

    #[test]
    fn missing_upstream_invalidates_table() {
        let (_, state) = state(&[(1, 3)]);
        assert!(state
            .valid_table(NodeId::from_raw(1), &[NodeId::from_raw(0)])
            .is_none());
    }

    #[test]
    fn typed_lookup_checks_pipeline() {
        let (pipeline, state) = state(&[(0, 3)]);
        let node: Node<u32> = Node::new(pipeline, NodeId::from_raw(0));
        assert_eq!(state.table(node).unwrap().len(), 1);
        let foreign: Node<u32> = Node::new(PipelineId::next(), NodeId::from_raw(0));
        assert!(state.table(foreign).is_none());
        let wrong_type: Node<String> = Node::new(pipeline, NodeId::from_raw(0));
        assert!(state.table(wrong_type).is_none());
    }
}
