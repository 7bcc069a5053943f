//! Building the node graph and registering generators.
//!
//! A host creates the shared inputs on a [`PipelineBuilder`], then registers
//! each generator with [`PipelineBuilder::generator`]. The generator's
//! initialization callback derives its own nodes from those inputs and
//! registers outputs through the [`GeneratorContext`]. [`build`] freezes the
//! graph into a [`Pipeline`] for the [`Driver`](crate::Driver).
//!
//! [`build`]: PipelineBuilder::build

use crate::arena::Arena;
use crate::cancel::CancellationToken;
use crate::comparer::Comparer;
use crate::error::{BoxError, PanicError, SharedError};
use crate::ids::{GeneratorId, NodeId};
use crate::node::{Node, NodeKind, NodeOp, NodeSlot, PipelineId, TypedOp};
use crate::nodes::transform::TransformFn;
use crate::nodes::{BatchOp, CombineOp, InputOp, OutputAction, SyntaxOp, TransformOp, ValueInputOp};
use crate::output::{
    HostProductionContext, OutputKind, OutputRecord, PostInitContext, SourceProductionContext,
    SourceText,
};
use crate::syntax::{SyntaxContext, SyntaxTree};
use crate::table::Value;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;
use weft_common::{InternalError, WeftResult};

/// Combinators whose nodes are shared between identical requests.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum Combinator {
    Collect,
    Combine,
}

/// An output node registered by a generator.
pub(crate) struct OutputRegistration {
    pub(crate) node: Node<OutputRecord>,
    pub(crate) kind: OutputKind,
}

/// A registered generator.
pub(crate) struct GeneratorEntry {
    pub(crate) name: Arc<str>,
    pub(crate) outputs: Vec<OutputRegistration>,
    pub(crate) post_init: Vec<SourceText>,
    pub(crate) init_error: Option<SharedError>,
}

/// Builds a [`Pipeline`] over host inputs of type `I`.
pub struct PipelineBuilder<I> {
    id: PipelineId,
    nodes: Arena<NodeId, NodeSlot<I>>,
    interned: HashMap<(Combinator, Vec<NodeId>), NodeId>,
    unit: Option<Node<()>>,
    generators: Arena<GeneratorId, GeneratorEntry>,
}

impl<I: 'static> Default for PipelineBuilder<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: 'static> PipelineBuilder<I> {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            id: PipelineId::next(),
            nodes: Arena::new(),
            interned: HashMap::new(),
            unit: None,
            generators: Arena::new(),
        }
    }

    fn check<T>(&self, node: Node<T>) {
        assert!(
            node.pipeline() == self.id && self.nodes.get(node.id()).is_some(),
            "{node:?} does not belong to this pipeline"
        );
    }

    fn add_node<T: Value>(
        &mut self,
        kind: NodeKind,
        upstream: Vec<NodeId>,
        name: Option<Arc<str>>,
        op: impl NodeOp<I, T> + 'static,
    ) -> Node<T> {
        let slot = NodeSlot {
            kind,
            name,
            upstream,
            op: Box::new(TypedOp {
                op: Arc::new(op),
                comparer: Comparer::default(),
            }),
        };
        Node::new(self.id, self.nodes.alloc(slot))
    }

    fn typed_op<T: Value>(&self, node: Node<T>) -> (&NodeSlot<I>, TypedOp<I, T>) {
        self.check(node);
        let typed = self.nodes.get(node.id()).and_then(|slot| {
            let op = slot.op.as_any().downcast_ref::<TypedOp<I, T>>()?;
            Some((slot, op.clone()))
        });
        typed.unwrap_or_else(|| panic!("{node:?} does not produce items of the handle's type"))
    }

    fn respecify<T: Value>(
        &mut self,
        node: Node<T>,
        name: Option<Arc<str>>,
        comparer: Option<Comparer<T>>,
    ) -> Node<T> {
        let (slot, mut op) = self.typed_op(node);
        if let Some(comparer) = comparer {
            op.comparer = comparer;
        }
        let slot = NodeSlot {
            kind: slot.kind,
            name: name.or_else(|| slot.name.clone()),
            upstream: slot.upstream.clone(),
            op: Box::new(op),
        };
        Node::new(self.id, self.nodes.alloc(slot))
    }

    /// A collection input whose items are told apart by their own value.
    ///
    /// Equal values may appear more than once; they are matched to the
    /// previous run's equal values in snapshot order.
    pub fn input<T>(&mut self, source: impl Fn(&I) -> Vec<T> + Send + Sync + 'static) -> Node<T>
    where
        T: Value + Hash + Eq,
    {
        self.input_keyed(source, T::clone)
    }

    /// A collection input whose items are told apart by `key`.
    ///
    /// Between runs, an item whose key was present before is `Cached`. Items
    /// sharing a key are matched to the previous items with that key in
    /// snapshot order. Items with no matching key take the place of a
    /// previous item at the same position as `Modified` when both snapshots
    /// have the same length, and are `Added` otherwise.
    pub fn input_keyed<T, K>(
        &mut self,
        source: impl Fn(&I) -> Vec<T> + Send + Sync + 'static,
        key: impl Fn(&T) -> K + Send + Sync + 'static,
    ) -> Node<T>
    where
        T: Value,
        K: Hash + Eq + Send + Sync + 'static,
    {
        let op = InputOp::new(Arc::new(source), Arc::new(key));
        self.add_node(NodeKind::Input, Vec::new(), None, op)
    }

    /// A single-value input, such as options or a semantic model.
    pub fn input_value<T: Value>(&mut self, source: impl Fn(&I) -> T + Send + Sync + 'static) -> Node<T> {
        let op = ValueInputOp::new(Arc::new(source));
        self.add_node(NodeKind::Input, Vec::new(), None, op)
    }

    /// A collection input of syntax trees, keyed by file and version.
    pub fn syntax_trees<S: SyntaxTree>(
        &mut self,
        source: impl Fn(&I) -> Vec<Arc<S>> + Send + Sync + 'static,
    ) -> Node<Arc<S>> {
        self.input_keyed(source, |tree: &Arc<S>| (tree.file(), tree.version()))
    }

    fn unit_input(&mut self) -> Node<()> {
        match self.unit {
            Some(unit) => unit,
            None => {
                let unit = self.input_value(|_: &I| ());
                self.unit = Some(unit);
                unit
            }
        }
    }

    fn transform<A: Value, B: Value>(&mut self, source: Node<A>, f: TransformFn<A, B>) -> Node<B> {
        self.check(source);
        self.add_node(
            NodeKind::Transform,
            vec![source.id()],
            None,
            TransformOp::new(source, f),
        )
    }

    /// Maps each item to one output.
    pub fn map<A: Value, B: Value>(
        &mut self,
        source: Node<A>,
        f: impl Fn(&A, &CancellationToken) -> B + Send + Sync + 'static,
    ) -> Node<B> {
        self.transform(
            source,
            Arc::new(
                move |value: &A, cancel: &CancellationToken| -> Result<Vec<B>, BoxError> {
                    Ok(vec![f(value, cancel)])
                },
            ),
        )
    }

    /// Maps each item with a fallible callback. An error faults the node.
    pub fn try_map<A, B, E>(
        &mut self,
        source: Node<A>,
        f: impl Fn(&A, &CancellationToken) -> Result<B, E> + Send + Sync + 'static,
    ) -> Node<B>
    where
        A: Value,
        B: Value,
        E: Into<BoxError>,
    {
        self.transform(
            source,
            Arc::new(
                move |value: &A, cancel: &CancellationToken| -> Result<Vec<B>, BoxError> {
                    f(value, cancel).map(|output| vec![output]).map_err(Into::into)
                },
            ),
        )
    }

    /// Maps each item to any number of outputs.
    pub fn map_many<A: Value, B: Value>(
        &mut self,
        source: Node<A>,
        f: impl Fn(&A, &CancellationToken) -> Vec<B> + Send + Sync + 'static,
    ) -> Node<B> {
        self.transform(
            source,
            Arc::new(
                move |value: &A, cancel: &CancellationToken| -> Result<Vec<B>, BoxError> {
                    Ok(f(value, cancel))
                },
            ),
        )
    }

    /// Keeps the items `predicate` accepts.
    pub fn filter<A: Value>(
        &mut self,
        source: Node<A>,
        predicate: impl Fn(&A, &CancellationToken) -> bool + Send + Sync + 'static,
    ) -> Node<A> {
        self.transform(
            source,
            Arc::new(move |value: &A, cancel: &CancellationToken| -> Result<Vec<A>, BoxError> {
                Ok(if predicate(value, cancel) {
                    vec![value.clone()]
                } else {
                    Vec::new()
                })
            }),
        )
    }

    /// All live items of `source`, in order, as one value.
    ///
    /// Collecting the same node twice returns the same node.
    pub fn collect<T: Value>(&mut self, source: Node<T>) -> Node<Arc<[T]>> {
        self.check(source);
        let key = (Combinator::Collect, vec![source.id()]);
        if let Some(id) = self.interned.get(&key) {
            return Node::new(self.id, *id);
        }
        let node = self.add_node(NodeKind::Batch, key.1.clone(), None, BatchOp::new(source));
        self.interned.insert(key, node.id());
        node
    }

    /// Pairs each item of `left` with the single value of `right`.
    ///
    /// `right` must hold exactly one live item when the node runs, as a
    /// [`collect`](Self::collect) or [`input_value`](Self::input_value) node
    /// does. Combining the same pair twice returns the same node.
    pub fn combine<A: Value, B: Value>(&mut self, left: Node<A>, right: Node<B>) -> Node<(A, B)> {
        self.check(left);
        self.check(right);
        let key = (Combinator::Combine, vec![left.id(), right.id()]);
        if let Some(id) = self.interned.get(&key) {
            return Node::new(self.id, *id);
        }
        let node = self.add_node(
            NodeKind::Combine,
            key.1.clone(),
            None,
            CombineOp::new(left, right),
        );
        self.interned.insert(key, node.id());
        node
    }

    /// Pairs each item of `left` with all live items of `right`.
    pub fn combine_all<A: Value, B: Value>(
        &mut self,
        left: Node<A>,
        right: Node<B>,
    ) -> Node<(A, Arc<[B]>)> {
        let batch = self.collect(right);
        self.combine(left, batch)
    }

    /// A copy of `node` that compares its recomputed items with `eq`
    /// instead of `PartialEq`.
    pub fn with_comparer<T: Value>(
        &mut self,
        node: Node<T>,
        eq: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
    ) -> Node<T> {
        self.respecify(node, None, Some(Comparer::new(eq)))
    }

    /// A copy of `node` whose steps are reported under `name`.
    pub fn with_tracking_name<T: Value>(&mut self, node: Node<T>, name: impl Into<Arc<str>>) -> Node<T> {
        self.respecify(node, Some(name.into()), None)
    }

    /// Runs `transform` on every node of every tree that `predicate`
    /// accepts.
    pub fn syntax_provider<S, T>(
        &mut self,
        trees: Node<Arc<S>>,
        predicate: impl Fn(&S::Node, &CancellationToken) -> bool + Send + Sync + 'static,
        transform: impl Fn(&SyntaxContext<'_, S, ()>, &CancellationToken) -> T + Send + Sync + 'static,
    ) -> Node<T>
    where
        S: SyntaxTree,
        T: Value,
    {
        let unit = self.unit_input();
        self.syntax_provider_with(trees, unit, predicate, transform)
    }

    /// Like [`syntax_provider`](Self::syntax_provider), handing the single
    /// value of `semantics` to every transform. When only the semantic value
    /// changes, unchanged files rerun their transforms without walking their
    /// trees again.
    pub fn syntax_provider_with<S, M, T>(
        &mut self,
        trees: Node<Arc<S>>,
        semantics: Node<M>,
        predicate: impl Fn(&S::Node, &CancellationToken) -> bool + Send + Sync + 'static,
        transform: impl Fn(&SyntaxContext<'_, S, M>, &CancellationToken) -> T + Send + Sync + 'static,
    ) -> Node<T>
    where
        S: SyntaxTree,
        M: Value,
        T: Value,
    {
        self.check(trees);
        self.check(semantics);
        let op = SyntaxOp::new(trees, semantics, Arc::new(predicate), Arc::new(transform));
        self.add_node(
            NodeKind::SyntaxInput,
            vec![trees.id(), semantics.id()],
            None,
            op,
        )
    }

    /// Registers a generator.
    ///
    /// `init` runs immediately. If it panics, or a post-initialization
    /// callback fails, the generator is kept but reports the failure on
    /// every run instead of producing output.
    ///
    /// # Panics
    ///
    /// Panics if a generator named `name` is already registered.
    pub fn generator(
        &mut self,
        name: impl Into<Arc<str>>,
        init: impl FnOnce(&mut GeneratorContext<'_, I>),
    ) -> GeneratorId {
        let name: Arc<str> = name.into();
        assert!(
            !self.generators.iter().any(|(_, entry)| entry.name == name),
            "generator '{name}' is already registered"
        );
        let mut cx = GeneratorContext {
            builder: self,
            outputs: Vec::new(),
            post_init: Vec::new(),
            error: None,
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| init(&mut cx)));
        let GeneratorContext {
            outputs,
            post_init,
            error,
            ..
        } = cx;
        let init_error = match outcome {
            Ok(()) => error,
            Err(payload) => Some(Arc::new(PanicError::from_payload(payload)) as SharedError),
        };
        if let Some(err) = &init_error {
            warn!(generator = %name, error = %err, "generator failed to initialize");
        }
        self.generators.alloc(GeneratorEntry {
            name,
            outputs,
            post_init,
            init_error,
        })
    }

    /// Freezes the graph.
    pub fn build(self) -> Pipeline<I> {
        Pipeline {
            id: self.id,
            nodes: self.nodes,
            generators: self.generators,
        }
    }
}

/// The builder as seen by a generator's initialization callback.
///
/// Dereferences to the [`PipelineBuilder`], so a generator derives nodes
/// with the same methods the host uses, then registers outputs here.
pub struct GeneratorContext<'b, I> {
    builder: &'b mut PipelineBuilder<I>,
    outputs: Vec<OutputRegistration>,
    post_init: Vec<SourceText>,
    error: Option<SharedError>,
}

impl<I> Deref for GeneratorContext<'_, I> {
    type Target = PipelineBuilder<I>;

    fn deref(&self) -> &PipelineBuilder<I> {
        &*self.builder
    }
}

impl<I> DerefMut for GeneratorContext<'_, I> {
    fn deref_mut(&mut self) -> &mut PipelineBuilder<I> {
        &mut *self.builder
    }
}

impl<I: 'static> GeneratorContext<'_, I> {
    fn register<T: Value>(&mut self, node: Node<T>, kind: OutputKind, action: OutputAction<T>) {
        self.builder.check(node);
        let op = TransformOp::new(node, action.into_transform());
        let output = self.builder.add_node(
            NodeKind::Output,
            vec![node.id()],
            Some(Arc::from(kind.step_name())),
            op,
        );
        self.outputs.push(OutputRegistration { node: output, kind });
    }

    /// Runs `action` for each item of `node` to add sources and diagnostics.
    pub fn register_source_output<T: Value>(
        &mut self,
        node: Node<T>,
        action: impl Fn(&mut SourceProductionContext<'_>, &T) + Send + Sync + 'static,
    ) {
        self.register(node, OutputKind::Source, OutputAction::Source(Arc::new(action)));
    }

    /// Like [`register_source_output`](Self::register_source_output), for
    /// sources that only matter to a full build. Hosts may disable these.
    pub fn register_implementation_source_output<T: Value>(
        &mut self,
        node: Node<T>,
        action: impl Fn(&mut SourceProductionContext<'_>, &T) + Send + Sync + 'static,
    ) {
        self.register(
            node,
            OutputKind::Implementation,
            OutputAction::Source(Arc::new(action)),
        );
    }

    /// Runs `action` for each item of `node` to add values for the host.
    pub fn register_host_output<T: Value>(
        &mut self,
        node: Node<T>,
        action: impl Fn(&mut HostProductionContext<'_>, &T) + Send + Sync + 'static,
    ) {
        self.register(node, OutputKind::Host, OutputAction::Host(Arc::new(action)));
    }

    /// Runs `action` once, now, to add sources that do not depend on any
    /// input. They are reported on every run.
    pub fn register_post_initialization_output(&mut self, action: impl FnOnce(&mut PostInitContext)) {
        if self.error.is_some() {
            return;
        }
        let mut cx = PostInitContext::new();
        match panic::catch_unwind(AssertUnwindSafe(|| action(&mut cx))) {
            Ok(()) => match cx.finish() {
                Ok(sources) => self.post_init.extend(sources),
                Err(err) => self.error = Some(Arc::new(err)),
            },
            Err(payload) => self.error = Some(Arc::new(PanicError::from_payload(payload))),
        }
    }
}

/// A frozen node graph with its generators.
///
/// Pipelines are shared by reference between runs, including concurrent
/// ones; nodes hold no per-run state.
pub struct Pipeline<I> {
    id: PipelineId,
    nodes: Arena<NodeId, NodeSlot<I>>,
    generators: Arena<GeneratorId, GeneratorEntry>,
}

impl<I> Pipeline<I> {
    pub(crate) fn id(&self) -> PipelineId {
        self.id
    }

    pub(crate) fn slot(&self, id: NodeId) -> WeftResult<&NodeSlot<I>> {
        self.nodes
            .get(id)
            .ok_or_else(|| InternalError::new(format!("{id} is not a node of this pipeline")))
    }

    pub(crate) fn generators(&self) -> impl Iterator<Item = (GeneratorId, &GeneratorEntry)> {
        self.generators.iter()
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The kind of node `id`.
    pub fn node_kind(&self, id: NodeId) -> Option<NodeKind> {
        self.nodes.get(id).map(|slot| slot.kind)
    }

    /// The names of the registered generators, in registration order.
    pub fn generator_names(&self) -> impl Iterator<Item = &str> {
        self.generators.iter().map(|(_, entry)| &*entry.name)
    }
}

impl<I> fmt::Debug for Pipeline<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("nodes", &self.nodes.len())
            .field("generators", &self.generators.len())
            .finish()
    }
}
