//! Update logic of each node kind.

pub(crate) mod batch;
pub(crate) mod combine;
pub(crate) mod input;
pub(crate) mod output;
pub(crate) mod syntax;
pub(crate) mod transform;

pub(crate) use batch::BatchOp;
pub(crate) use combine::CombineOp;
pub(crate) use input::{InputOp, ValueInputOp};
pub(crate) use output::OutputAction;
pub(crate) use syntax::SyntaxOp;
pub(crate) use transform::TransformOp;
