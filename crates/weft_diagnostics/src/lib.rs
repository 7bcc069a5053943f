//! Diagnostics reported by generators and by the engine itself.
//!
//! Generators attach [`Diagnostic`]s to their outputs; the driver reports its
//! own (for example when a generator fails) through a [`DiagnosticSink`].
//! Every diagnostic carries a [`DiagnosticCode`] such as `G001`.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod severity;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::Diagnostic;
pub use severity::Severity;
pub use sink::DiagnosticSink;
