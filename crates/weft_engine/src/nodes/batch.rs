//! Batch nodes: all live upstream items as one value.

use crate::diff::DiffState;
use crate::error::DriverError;
use crate::node::{propagate, Node, NodeContext, NodeOp};
use crate::session::BuildSession;
use crate::table::{StateTable, Value};
use std::sync::Arc;
use std::time::Instant;

/// Collects the live items of its upstream, in order, into a single entry.
///
/// The table always holds exactly one item, even when the upstream is empty.
pub(crate) struct BatchOp<T> {
    source: Node<T>,
}

impl<T> BatchOp<T> {
    pub(crate) fn new(source: Node<T>) -> Self {
        Self { source }
    }
}

impl<I: 'static, T: Value> NodeOp<I, Arc<[T]>> for BatchOp<T> {
    fn update(
        &self,
        session: &mut BuildSession<'_, I>,
        cx: &NodeContext<'_, Arc<[T]>>,
        previous: Option<Arc<StateTable<Arc<[T]>>>>,
    ) -> Result<Arc<StateTable<Arc<[T]>>>, DriverError> {
        let upstream = session.table(self.source)?;
        if let Some(fault) = upstream.fault() {
            return Ok(propagate(fault));
        }
        let track = session.track_steps();
        let inputs = || -> Vec<_> {
            upstream
                .items()
                .filter_map(|item| item.step_input())
                .collect()
        };
        if upstream.is_cached() {
            if let Some(previous) = previous {
                return Ok(cx.reuse(previous, track, |_| inputs()));
            }
        }

        let started = Instant::now();
        let values: Arc<[T]> = upstream.live_values().cloned().collect();
        let state = if previous.is_some() {
            DiffState::Modified
        } else {
            DiffState::Added
        };
        let mut builder = cx.builder(previous.as_deref(), track);
        let step_inputs = if track { inputs() } else { Vec::new() };
        builder.modify_or_add(vec![values], state, step_inputs, started.elapsed());
        Ok(Arc::new(builder.finish()))
    }
}
