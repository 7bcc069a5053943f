//! Input nodes: snapshots of host data diffed against the previous run.

use crate::diff::DiffState;
use crate::error::DriverError;
use crate::node::{NodeContext, NodeOp};
use crate::session::BuildSession;
use crate::table::{StateTable, Value};
use crate::user_fn;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

type SourceFn<I, T> = Arc<dyn Fn(&I) -> Vec<T> + Send + Sync>;
type KeyFn<T, K> = Arc<dyn Fn(&T) -> K + Send + Sync>;

/// A collection input, one entry per item.
///
/// Items are matched to the previous snapshot by key. A previous item whose
/// key is still present is `Cached`. Otherwise, when both snapshots have the
/// same length, the item at the same position takes its place as `Modified`
/// (unless it already matched by key); failing that the previous item is
/// `Removed`. Items left unmatched are `Added` in snapshot order.
///
/// Keys may repeat: items sharing a key are matched to the previous items with
/// that key in order, so an unchanged snapshot is fully `Cached`.
pub(crate) struct InputOp<I, T, K> {
    source: SourceFn<I, T>,
    key: KeyFn<T, K>,
}

impl<I, T, K> InputOp<I, T, K> {
    pub(crate) fn new(source: SourceFn<I, T>, key: KeyFn<T, K>) -> Self {
        Self { source, key }
    }
}

impl<I, T, K> NodeOp<I, T> for InputOp<I, T, K>
where
    I: 'static,
    T: Value,
    K: Hash + Eq + Send + Sync + 'static,
{
    fn update(
        &self,
        session: &mut BuildSession<'_, I>,
        cx: &NodeContext<'_, T>,
        previous: Option<Arc<StateTable<T>>>,
    ) -> Result<Arc<StateTable<T>>, DriverError> {
        let inputs = session.inputs();
        let started = Instant::now();
        let snapshot = user_fn::invoke(session.cancel(), || {
            let items = (self.source)(inputs);
            let keys: Vec<K> = items.iter().map(|item| (self.key)(item)).collect();
            let previous_keys: Vec<K> = previous
                .iter()
                .flat_map(|table| table.live_values())
                .map(|item| (self.key)(item))
                .collect();
            Ok((items, keys, previous_keys))
        })?;
        let (items, keys, previous_keys) = match snapshot {
            Ok(snapshot) => snapshot,
            Err(err) => return Ok(cx.fault(err)),
        };
        let elapsed = started.elapsed();

        let mut builder = cx.builder(previous.as_deref(), session.track_steps());
        let mut unclaimed: HashMap<&K, VecDeque<usize>> = HashMap::with_capacity(keys.len());
        for (index, key) in keys.iter().enumerate() {
            unclaimed.entry(key).or_default().push_back(index);
        }
        let same_len = items.len() == previous_keys.len();
        let mut claimed = vec![false; items.len()];
        for (ordinal, old_key) in previous_keys.iter().enumerate() {
            if let Some(index) = unclaimed.get_mut(old_key).and_then(VecDeque::pop_front) {
                claimed[index] = true;
                builder.try_use_cached(Vec::new());
            } else if same_len && !claimed[ordinal] {
                claimed[ordinal] = true;
                if let Some(queue) = unclaimed.get_mut(&keys[ordinal]) {
                    queue.retain(|&index| index != ordinal);
                }
                builder.modify_or_add(
                    vec![items[ordinal].clone()],
                    DiffState::Modified,
                    Vec::new(),
                    elapsed,
                );
            } else {
                builder.try_remove(Vec::new());
            }
        }
        for (item, claimed) in items.into_iter().zip(claimed) {
            if !claimed {
                builder.add(vec![item], DiffState::Added, Vec::new(), elapsed);
            }
        }
        Ok(Arc::new(builder.finish()))
    }
}

/// A single-value input. Every run after the first reports the value as
/// modified unless it compares equal to the previous one.
pub(crate) struct ValueInputOp<I, T> {
    source: Arc<dyn Fn(&I) -> T + Send + Sync>,
}

impl<I, T> ValueInputOp<I, T> {
    pub(crate) fn new(source: Arc<dyn Fn(&I) -> T + Send + Sync>) -> Self {
        Self { source }
    }
}

impl<I: 'static, T: Value> NodeOp<I, T> for ValueInputOp<I, T> {
    fn update(
        &self,
        session: &mut BuildSession<'_, I>,
        cx: &NodeContext<'_, T>,
        previous: Option<Arc<StateTable<T>>>,
    ) -> Result<Arc<StateTable<T>>, DriverError> {
        let inputs = session.inputs();
        let started = Instant::now();
        let value = match user_fn::invoke(session.cancel(), || Ok((self.source)(inputs)))? {
            Ok(value) => value,
            Err(err) => return Ok(cx.fault(err)),
        };
        let state = if previous.is_some() {
            DiffState::Modified
        } else {
            DiffState::Added
        };
        let mut builder = cx.builder(previous.as_deref(), session.track_steps());
        builder.modify_or_add(vec![value], state, Vec::new(), started.elapsed());
        Ok(Arc::new(builder.finish()))
    }
}
