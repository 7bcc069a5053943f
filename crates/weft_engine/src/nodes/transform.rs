//! Transform nodes: map, filter and fan-out over each upstream item.

use crate::cancel::CancellationToken;
use crate::diff::DiffState;
use crate::error::{BoxError, DriverError};
use crate::node::{propagate, Node, NodeContext, NodeOp};
use crate::session::BuildSession;
use crate::table::{StateTable, Value};
use crate::user_fn;
use std::sync::Arc;
use std::time::Instant;

pub(crate) type TransformFn<A, B> =
    Arc<dyn Fn(&A, &CancellationToken) -> Result<Vec<B>, BoxError> + Send + Sync>;

/// Applies a callback to each upstream item, producing zero or more outputs
/// per item.
///
/// Cached upstream items reuse their previous outputs; removed ones remove
/// them. Only added and modified items run the callback, whose outputs are
/// then reconciled against the previous entry.
pub(crate) struct TransformOp<A, B> {
    source: Node<A>,
    f: TransformFn<A, B>,
}

impl<A, B> TransformOp<A, B> {
    pub(crate) fn new(source: Node<A>, f: TransformFn<A, B>) -> Self {
        Self { source, f }
    }
}

impl<I: 'static, A: Value, B: Value> NodeOp<I, B> for TransformOp<A, B> {
    fn update(
        &self,
        session: &mut BuildSession<'_, I>,
        cx: &NodeContext<'_, B>,
        previous: Option<Arc<StateTable<B>>>,
    ) -> Result<Arc<StateTable<B>>, DriverError> {
        let upstream = session.table(self.source)?;
        if let Some(fault) = upstream.fault() {
            return Ok(propagate(fault));
        }
        let track = session.track_steps();
        if upstream.is_cached() {
            if let Some(previous) = previous {
                let steps: Vec<_> = upstream.items().map(|item| item.step_input()).collect();
                return Ok(cx.reuse(previous, track, |index| {
                    steps.get(index).cloned().flatten().into_iter().collect()
                }));
            }
        }

        let cancel = session.cancel();
        let mut builder = cx.builder(previous.as_deref(), track);
        for item in upstream.items() {
            let inputs: Vec<_> = item.step_input().into_iter().collect();
            match item.state {
                DiffState::Removed => {
                    builder.try_remove(inputs);
                    continue;
                }
                DiffState::Cached if builder.try_use_cached(inputs.clone()) => continue,
                _ => {}
            }
            let started = Instant::now();
            let outputs = match user_fn::invoke(cancel, || (self.f)(item.value, cancel))? {
                Ok(outputs) => outputs,
                Err(err) => return Ok(cx.fault(err)),
            };
            let state = match item.state {
                DiffState::Cached => DiffState::Added,
                state => state,
            };
            builder.modify_or_add(outputs, state, inputs, started.elapsed());
        }
        Ok(Arc::new(builder.finish()))
    }
}
