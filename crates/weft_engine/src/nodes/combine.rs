//! Combine nodes: each left item paired with the single right value.

use crate::diff::DiffState;
use crate::error::DriverError;
use crate::node::{propagate, Node, NodeContext, NodeOp};
use crate::session::BuildSession;
use crate::step::StepInput;
use crate::table::{StateTable, Value};
use std::sync::Arc;
use std::time::Instant;
use weft_common::InternalError;

/// Pairs every left item with the right node's only live item.
///
/// A pair is `Cached` when both halves are, `Modified` when only the right
/// value changed, and otherwise takes the state of its left item.
pub(crate) struct CombineOp<A, B> {
    left: Node<A>,
    right: Node<B>,
}

impl<A, B> CombineOp<A, B> {
    pub(crate) fn new(left: Node<A>, right: Node<B>) -> Self {
        Self { left, right }
    }
}

impl<I: 'static, A: Value, B: Value> NodeOp<I, (A, B)> for CombineOp<A, B> {
    fn update(
        &self,
        session: &mut BuildSession<'_, I>,
        cx: &NodeContext<'_, (A, B)>,
        previous: Option<Arc<StateTable<(A, B)>>>,
    ) -> Result<Arc<StateTable<(A, B)>>, DriverError> {
        let left = session.table(self.left)?;
        let right = session.table(self.right)?;
        if let Some(fault) = left.fault() {
            return Ok(propagate(fault));
        }
        if let Some(fault) = right.fault() {
            return Ok(propagate(fault));
        }

        let mut live_right = right.items().filter(|item| item.state != DiffState::Removed);
        let (Some(right_item), None) = (live_right.next(), live_right.next()) else {
            return Err(InternalError::new(format!(
                "{}: right side of a combine must hold exactly one value",
                cx.id
            ))
            .into());
        };

        let track = session.track_steps();
        let right_input = right_item.step_input();
        let inputs_for = |left_input: Option<StepInput>| -> Vec<StepInput> {
            left_input.into_iter().chain(right_input.clone()).collect()
        };
        if left.is_cached() && right.is_cached() {
            if let Some(previous) = previous {
                let steps: Vec<_> = left.items().map(|item| item.step_input()).collect();
                return Ok(cx.reuse(previous, track, |index| {
                    inputs_for(steps.get(index).cloned().flatten())
                }));
            }
        }

        let right_state = right_item.state;
        let mut builder = cx.builder(previous.as_deref(), track);
        for item in left.items() {
            let inputs = inputs_for(item.step_input());
            let state = match (item.state, right_state) {
                (DiffState::Cached, DiffState::Cached) => DiffState::Cached,
                (DiffState::Cached, _) => DiffState::Modified,
                (state, _) => state,
            };
            match state {
                DiffState::Removed => {
                    builder.try_remove(inputs);
                }
                DiffState::Cached if builder.try_use_cached(inputs.clone()) => {}
                state => {
                    let started = Instant::now();
                    let pair = (item.value.clone(), right_item.value.clone());
                    let state = if state == DiffState::Cached {
                        DiffState::Added
                    } else {
                        state
                    };
                    builder.modify_or_add(vec![pair], state, inputs, started.elapsed());
                }
            }
        }
        Ok(Arc::new(builder.finish()))
    }
}
