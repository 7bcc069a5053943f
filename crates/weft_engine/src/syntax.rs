//! The host's syntax trees as seen by syntax provider nodes.

use std::sync::Arc;
use weft_common::ContentHash;
use weft_source::FileId;

/// A parsed file the host hands to pipelines.
///
/// Equality should be cheap. Comparing [`file`](Self::file) and
/// [`version`](Self::version) is enough, since a tree is immutable once
/// built. [`root`](Self::root) and [`children`](Self::children) are only
/// called for files that changed, so a host may parse lazily.
pub trait SyntaxTree: PartialEq + Send + Sync + 'static {
    /// A node of the tree, typically a cheap handle into it.
    type Node: Clone + Send + Sync + 'static;

    /// The file this tree was parsed from.
    fn file(&self) -> FileId;

    /// Identifies this version of the file's text.
    fn version(&self) -> ContentHash;

    /// The root node.
    fn root(&self) -> Self::Node;

    /// The children of `node`, in document order.
    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;
}

/// What a syntax provider's transform sees for one matched node.
pub struct SyntaxContext<'a, S: SyntaxTree, M> {
    /// The matched node.
    pub node: &'a S::Node,
    /// The tree containing it.
    pub tree: &'a Arc<S>,
    /// The semantic model the provider was combined with, or `()`.
    pub semantics: &'a M,
}
