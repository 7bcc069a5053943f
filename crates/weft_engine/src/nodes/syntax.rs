//! Syntax provider nodes: per-file pattern matching over syntax trees.
//!
//! Each file is walked with the provider's predicate only when the file
//! changed. The matched nodes are kept in a side table between runs, so a
//! file whose tree is unchanged skips the walk, and skips the transforms too
//! unless the semantic model changed.

use crate::cancel::CancellationToken;
use crate::diff::DiffState;
use crate::error::{BoxError, DriverError, SharedError};
use crate::node::{downcast_table, propagate, AnyTable, Node, NodeContext, NodeOp};
use crate::session::BuildSession;
use crate::step::StepInput;
use crate::syntax::{SyntaxContext, SyntaxTree};
use crate::table::{StateTable, TableBuilder, Value};
use crate::user_fn;
use std::sync::Arc;
use std::time::Instant;
use weft_common::InternalError;

pub(crate) type PredicateFn<S> =
    Arc<dyn Fn(&<S as SyntaxTree>::Node, &CancellationToken) -> bool + Send + Sync>;
pub(crate) type SyntaxTransformFn<S, M, T> =
    Arc<dyn Fn(&SyntaxContext<'_, S, M>, &CancellationToken) -> T + Send + Sync>;

pub(crate) struct SyntaxOp<S: SyntaxTree, M, T> {
    trees: Node<Arc<S>>,
    semantics: Node<M>,
    predicate: PredicateFn<S>,
    transform: SyntaxTransformFn<S, M, T>,
}

impl<S: SyntaxTree, M, T> SyntaxOp<S, M, T> {
    pub(crate) fn new(
        trees: Node<Arc<S>>,
        semantics: Node<M>,
        predicate: PredicateFn<S>,
        transform: SyntaxTransformFn<S, M, T>,
    ) -> Self {
        Self {
            trees,
            semantics,
            predicate,
            transform,
        }
    }

    /// Pre-order walk of `tree`, keeping the nodes the predicate accepts.
    fn find_matches(&self, tree: &S, cancel: &CancellationToken) -> Result<Vec<S::Node>, BoxError> {
        let mut matches = Vec::new();
        let mut stack = vec![tree.root()];
        while let Some(node) = stack.pop() {
            cancel.check()?;
            let children = tree.children(&node);
            if (self.predicate)(&node, cancel) {
                matches.push(node);
            }
            stack.extend(children.into_iter().rev());
        }
        Ok(matches)
    }

    fn transform_all(
        &self,
        matches: &[S::Node],
        tree: &Arc<S>,
        semantics: &M,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, BoxError> {
        matches
            .iter()
            .map(|node| {
                cancel.check()?;
                let cx = SyntaxContext {
                    node,
                    tree,
                    semantics,
                };
                Ok((self.transform)(&cx, cancel))
            })
            .collect()
    }

    fn fail<I: 'static>(
        &self,
        session: &mut BuildSession<'_, I>,
        cx: &NodeContext<'_, T>,
        err: SharedError,
    ) -> Arc<StateTable<T>>
    where
        T: Value,
    {
        session.set_syntax_table(cx.id, None);
        cx.fault(err)
    }
}

impl<I, S, M, T> NodeOp<I, T> for SyntaxOp<S, M, T>
where
    I: 'static,
    S: SyntaxTree,
    M: Value,
    T: Value,
{
    fn update(
        &self,
        session: &mut BuildSession<'_, I>,
        cx: &NodeContext<'_, T>,
        previous: Option<Arc<StateTable<T>>>,
    ) -> Result<Arc<StateTable<T>>, DriverError> {
        let trees = session.table(self.trees)?;
        let semantics = session.table(self.semantics)?;
        if let Some(fault) = trees.fault() {
            session.set_syntax_table(cx.id, None);
            return Ok(propagate(fault));
        }
        if let Some(fault) = semantics.fault() {
            session.set_syntax_table(cx.id, None);
            return Ok(propagate(fault));
        }
        let mut live = semantics.items().filter(|item| item.state != DiffState::Removed);
        let (Some(model), None) = (live.next(), live.next()) else {
            return Err(InternalError::new(format!(
                "{}: semantic input of a syntax provider must hold exactly one value",
                cx.id
            ))
            .into());
        };

        // The filter table and the node's table are only usable together.
        let previous_filter = match &previous {
            Some(_) => session
                .previous_syntax_table(cx.id)?
                .map(|table| downcast_table::<S::Node>(table, cx.id))
                .transpose()?,
            None => None,
        };
        let previous = previous.filter(|_| previous_filter.is_some());
        let track = session.track_steps();

        if trees.is_cached() && semantics.is_cached() {
            if let (Some(previous), Some(filter)) = (previous.clone(), previous_filter.clone()) {
                session.set_syntax_table(cx.id, Some(filter as AnyTable));
                let steps: Vec<_> = trees.items().map(|item| item.step_input()).collect();
                let model_input = model.step_input();
                return Ok(cx.reuse(previous, track, |index| {
                    let file = steps.get(index).cloned().flatten();
                    file.into_iter().chain(model_input.clone()).collect()
                }));
            }
        }

        let cancel = session.cancel();
        let mut filter = TableBuilder::new(previous_filter.as_deref(), None, None, false);
        let mut builder = cx.builder(previous.as_deref(), track);
        for file in trees.items() {
            let inputs: Vec<StepInput> = file
                .step_input()
                .into_iter()
                .chain(model.step_input())
                .collect();
            if file.state == DiffState::Removed {
                filter.try_remove(Vec::new());
                builder.try_remove(inputs);
                continue;
            }

            let unchanged = file.state == DiffState::Cached && filter.try_use_cached(Vec::new());
            if !unchanged {
                let found = user_fn::invoke(cancel, || self.find_matches(file.value, cancel))?;
                let matches = match found {
                    Ok(matches) => matches,
                    Err(err) => return Ok(self.fail(session, cx, err)),
                };
                let state = match file.state {
                    DiffState::Cached => DiffState::Added,
                    state => state,
                };
                filter.replace_or_add(matches, state);
            }

            let state = match (unchanged, model.state) {
                (true, DiffState::Cached) => DiffState::Cached,
                (true, _) => DiffState::Modified,
                (false, _) if file.state == DiffState::Cached => DiffState::Added,
                (false, _) => file.state,
            };
            if state == DiffState::Cached && builder.try_use_cached(inputs.clone()) {
                continue;
            }
            let started = Instant::now();
            let transformed = user_fn::invoke(cancel, || {
                self.transform_all(filter.last_items(), file.value, model.value, cancel)
            })?;
            let outputs = match transformed {
                Ok(outputs) => outputs,
                Err(err) => return Ok(self.fail(session, cx, err)),
            };
            let state = match state {
                DiffState::Cached => DiffState::Added,
                state => state,
            };
            builder.modify_or_add(outputs, state, inputs, started.elapsed());
        }

        let filter = filter.finish().compact();
        session.set_syntax_table(cx.id, Some(Arc::new(filter)));
        Ok(Arc::new(builder.finish()))
    }
}
