//! State tables: each node's cache of diff-tagged items.
//!
//! A [`StateTable`] is an ordered list of entries. Each entry is the output a
//! node produced for one upstream item (or one file, or the one batch), and
//! holds zero or more items, each tagged with a [`DiffState`].
//!
//! Tables obey one ordering rule that every node relies on: the items of a
//! table that are not `Added` correspond one-to-one, in order, with the items
//! of the node's previous (compacted) table. A node can therefore walk its
//! upstream items and its own previous entries with a single cursor, which is
//! what [`TableBuilder`] does.

use crate::comparer::Comparer;
use crate::diff::{DiffState, RunReason};
use crate::error::UserFunctionError;
use crate::step::{IncrementalStep, StepInput, StepOutput};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use weft_common::fingerprint;

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(0);

fn next_table_id() -> u64 {
    NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Types that can be stored in a state table.
pub trait Item: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Item for T {}

/// Types that can flow between nodes: storable and comparable.
pub trait Value: Item + PartialEq {}

impl<T: Item + PartialEq> Value for T {}

/// The items one node produced for one upstream item.
#[derive(Clone)]
pub struct TableEntry<T> {
    items: Vec<T>,
    states: Vec<DiffState>,
    removed: bool,
    step: Option<Arc<IncrementalStep>>,
}

impl<T> TableEntry<T> {
    /// The entry's items. Removed items are still present until compaction.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// The per-item diff states, parallel to [`items`](Self::items).
    pub fn states(&self) -> &[DiffState] {
        &self.states
    }

    /// Returns `true` if the whole entry was removed this run.
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// The step that produced this entry, when step tracking is on.
    pub fn step(&self) -> Option<&Arc<IncrementalStep>> {
        self.step.as_ref()
    }
}

/// A borrowed view of one item of a table.
pub struct TableItem<'a, T> {
    /// The item's value.
    pub value: &'a T,
    /// The item's diff state.
    pub state: DiffState,
    /// Position of the item within its entry, i.e. within its step's outputs.
    pub output_index: usize,
    step: Option<&'a Arc<IncrementalStep>>,
}

impl<T> Clone for TableItem<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TableItem<'_, T> {}

impl<'a, T> TableItem<'a, T> {
    /// The step that produced this item, when step tracking is on.
    pub fn step(&self) -> Option<&'a Arc<IncrementalStep>> {
        self.step
    }

    pub(crate) fn step_input(&self) -> Option<StepInput> {
        self.step.map(|step| StepInput {
            step: Arc::clone(step),
            output_index: self.output_index,
        })
    }
}

/// The cached output of one node for one run.
///
/// Tables are immutable once built and shared through `Arc`. A faulted
/// table has no entries and carries the error that stopped the node.
pub struct StateTable<T> {
    id: u64,
    entries: Vec<TableEntry<T>>,
    fault: Option<Arc<UserFunctionError>>,
    cached: bool,
}

impl<T> StateTable<T> {
    pub(crate) fn faulted(fault: Arc<UserFunctionError>) -> Self {
        Self {
            id: next_table_id(),
            entries: Vec::new(),
            fault: Some(fault),
            cached: false,
        }
    }

    /// Returns `true` if every item is `Cached` and nothing was dropped
    /// relative to the previous table.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Returns `true` if a user callback failed for this node or upstream.
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// The error that faulted this table.
    pub fn fault(&self) -> Option<&Arc<UserFunctionError>> {
        self.fault.as_ref()
    }

    /// The table's entries, in order.
    pub fn entries(&self) -> &[TableEntry<T>] {
        &self.entries
    }

    /// Iterates over every item of every entry, in order.
    pub fn items(&self) -> impl Iterator<Item = TableItem<'_, T>> {
        self.entries.iter().flat_map(|entry| {
            let step = entry.step.as_ref();
            entry
                .items
                .iter()
                .zip(&entry.states)
                .enumerate()
                .map(move |(output_index, (value, state))| TableItem {
                    value,
                    state: *state,
                    output_index,
                    step,
                })
        })
    }

    /// Iterates over the values of items that were not removed.
    pub fn live_values(&self) -> impl Iterator<Item = &T> {
        self.items()
            .filter(|item| item.state != DiffState::Removed)
            .map(|item| item.value)
    }

    /// Returns the number of items, removed ones included.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|entry| entry.items.len()).sum()
    }

    /// Returns `true` if the table holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The diff state of every item, in order.
    pub fn states(&self) -> Vec<DiffState> {
        self.items().map(|item| item.state).collect()
    }

    /// The diff states packed as letters, e.g. `"CCMA"`.
    pub fn packed_states(&self) -> String {
        self.items().map(|item| item.state.as_char()).collect()
    }

    /// A short identifier of this table instance and its states.
    ///
    /// Two runs report the same fingerprint for a node exactly when the
    /// second run reused the first run's table object.
    pub fn fingerprint(&self) -> u64 {
        let mut bytes = self.id.to_le_bytes().to_vec();
        bytes.extend(self.packed_states().bytes());
        fingerprint(&bytes)
    }
}

impl<T: Item> StateTable<T> {
    /// Returns the table to store for the next run: removed entries and
    /// items dropped, everything else tagged `Cached`. Step records belong to
    /// the run that made them and are not kept.
    pub(crate) fn compact(&self) -> StateTable<T> {
        let entries = self
            .entries
            .iter()
            .filter(|entry| !entry.removed)
            .map(|entry| {
                let items: Vec<T> = entry
                    .items
                    .iter()
                    .zip(&entry.states)
                    .filter(|(_, state)| **state != DiffState::Removed)
                    .map(|(value, _)| value.clone())
                    .collect();
                TableEntry {
                    states: vec![DiffState::Cached; items.len()],
                    items,
                    removed: false,
                    step: None,
                }
            })
            .collect();
        StateTable {
            id: next_table_id(),
            entries,
            fault: None,
            cached: true,
        }
    }

    /// Re-records a fully cached table's entries as reused by this run, with
    /// `inputs(i)` giving the upstream steps of entry `i`.
    pub(crate) fn restamp(
        &self,
        name: Option<&Arc<str>>,
        mut inputs: impl FnMut(usize) -> Vec<StepInput>,
    ) -> StateTable<T> {
        let entries = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| TableEntry {
                items: entry.items.clone(),
                states: entry.states.clone(),
                removed: entry.removed,
                step: Some(record_step(
                    name,
                    inputs(index),
                    &entry.items,
                    &entry.states,
                    DiffState::Cached,
                    Duration::ZERO,
                )),
            })
            .collect();
        StateTable {
            id: next_table_id(),
            entries,
            fault: None,
            cached: self.cached,
        }
    }
}

impl<T> fmt::Debug for StateTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTable")
            .field("states", &self.packed_states())
            .field("entries", &self.entries.len())
            .field("cached", &self.cached)
            .field("faulted", &self.fault.is_some())
            .finish()
    }
}

fn record_step<T: Item>(
    name: Option<&Arc<str>>,
    inputs: Vec<StepInput>,
    items: &[T],
    states: &[DiffState],
    input_state: DiffState,
    elapsed: Duration,
) -> Arc<IncrementalStep> {
    let outputs = items
        .iter()
        .zip(states)
        .map(|(value, state)| StepOutput {
            value: Arc::new(value.clone()),
            reason: RunReason::for_output(*state, input_state),
        })
        .collect();
    Arc::new(IncrementalStep::new(name.cloned(), inputs, outputs, elapsed))
}

/// Builds a node's new table against its previous one.
///
/// Every method that takes a previous entry advances a cursor over the
/// previous table, so calls must follow the order of the upstream items.
/// `add` never consumes a previous entry.
pub(crate) struct TableBuilder<'p, T> {
    previous: Option<&'p StateTable<T>>,
    cursor: usize,
    entries: Vec<TableEntry<T>>,
    comparer: Option<Comparer<T>>,
    name: Option<Arc<str>>,
    track: bool,
}

impl<'p, T: Item> TableBuilder<'p, T> {
    pub(crate) fn new(
        previous: Option<&'p StateTable<T>>,
        comparer: Option<Comparer<T>>,
        name: Option<Arc<str>>,
        track: bool,
    ) -> Self {
        Self {
            previous,
            cursor: 0,
            entries: Vec::new(),
            comparer,
            name,
            track,
        }
    }

    fn next_previous(&mut self) -> Option<&'p TableEntry<T>> {
        let entry = self.previous?.entries.get(self.cursor)?;
        self.cursor += 1;
        Some(entry)
    }

    fn push(
        &mut self,
        items: Vec<T>,
        states: Vec<DiffState>,
        removed: bool,
        inputs: Vec<StepInput>,
        input_state: DiffState,
        elapsed: Duration,
    ) {
        let step = self.track.then(|| {
            record_step(
                self.name.as_ref(),
                inputs,
                &items,
                &states,
                input_state,
                elapsed,
            )
        });
        self.entries.push(TableEntry {
            items,
            states,
            removed,
            step,
        });
    }

    /// Reuses the next previous entry unchanged.
    pub(crate) fn try_use_cached(&mut self, inputs: Vec<StepInput>) -> bool {
        let Some(previous) = self.next_previous() else {
            return false;
        };
        let states = vec![DiffState::Cached; previous.items.len()];
        self.push(
            previous.items.clone(),
            states,
            false,
            inputs,
            DiffState::Cached,
            Duration::ZERO,
        );
        true
    }

    /// Marks the next previous entry as removed.
    pub(crate) fn try_remove(&mut self, inputs: Vec<StepInput>) -> bool {
        let Some(previous) = self.next_previous() else {
            return false;
        };
        let states = vec![DiffState::Removed; previous.items.len()];
        self.push(
            previous.items.clone(),
            states,
            true,
            inputs,
            DiffState::Removed,
            Duration::ZERO,
        );
        true
    }

    /// Records freshly computed outputs for an upstream item in `input_state`.
    ///
    /// Unless the upstream item is new, the outputs are reconciled
    /// element-wise against the next previous entry: equal items keep the
    /// previous value as `Cached`, unequal ones become `Modified`, surplus
    /// previous items `Removed` and surplus new items `Added`. Without a
    /// previous entry everything is `Added`.
    pub(crate) fn modify_or_add(
        &mut self,
        outputs: Vec<T>,
        input_state: DiffState,
        inputs: Vec<StepInput>,
        elapsed: Duration,
    ) {
        if input_state != DiffState::Added {
            if let Some(previous) = self.next_previous() {
                let (items, states) = self.reconcile(previous, outputs);
                self.push(items, states, false, inputs, input_state, elapsed);
                return;
            }
        }
        self.add(outputs, DiffState::Added, inputs, elapsed);
    }

    /// Replaces the next previous entry with `outputs` as a whole, without
    /// comparing items. Without a previous entry the outputs are `Added`.
    pub(crate) fn replace_or_add(&mut self, outputs: Vec<T>, input_state: DiffState) {
        if input_state != DiffState::Added && self.next_previous().is_some() {
            let states = vec![DiffState::Modified; outputs.len()];
            self.push(outputs, states, false, Vec::new(), input_state, Duration::ZERO);
        } else {
            self.add(outputs, DiffState::Added, Vec::new(), Duration::ZERO);
        }
    }

    /// Appends outputs with the given state without consuming a previous entry.
    pub(crate) fn add(
        &mut self,
        outputs: Vec<T>,
        state: DiffState,
        inputs: Vec<StepInput>,
        elapsed: Duration,
    ) {
        let states = vec![state; outputs.len()];
        self.push(outputs, states, false, inputs, state, elapsed);
    }

    fn reconcile(&self, previous: &TableEntry<T>, outputs: Vec<T>) -> (Vec<T>, Vec<DiffState>) {
        let capacity = previous.items.len().max(outputs.len());
        let mut items = Vec::with_capacity(capacity);
        let mut states = Vec::with_capacity(capacity);
        let mut outputs = outputs.into_iter();
        for old in &previous.items {
            match outputs.next() {
                Some(new) => {
                    let equal = self
                        .comparer
                        .as_ref()
                        .is_some_and(|comparer| comparer.equals(old, &new));
                    if equal {
                        items.push(old.clone());
                        states.push(DiffState::Cached);
                    } else {
                        items.push(new);
                        states.push(DiffState::Modified);
                    }
                }
                None => {
                    items.push(old.clone());
                    states.push(DiffState::Removed);
                }
            }
        }
        for new in outputs {
            items.push(new);
            states.push(DiffState::Added);
        }
        (items, states)
    }

    /// The items of the most recently recorded entry.
    pub(crate) fn last_items(&self) -> &[T] {
        self.entries
            .last()
            .map_or(&[][..], |entry| entry.items.as_slice())
    }

    pub(crate) fn finish(self) -> StateTable<T> {
        let consumed_all = self
            .previous
            .map_or(true, |previous| self.cursor == previous.entries.len());
        let cached = consumed_all
            && self.entries.iter().all(|entry| {
                !entry.removed && entry.states.iter().all(|s| *s == DiffState::Cached)
            });
        StateTable {
            id: next_table_id(),
            entries: self.entries,
            fault: None,
            cached,
        }
    }
}
