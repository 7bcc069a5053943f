//! Diagnostic codes reported by the driver.

use crate::error::SharedError;
use weft_diagnostics::{Category, Diagnostic, DiagnosticCode};
use weft_source::Span;

/// A generator's callback failed during a run.
pub const GENERATOR_FAILED: DiagnosticCode = DiagnosticCode::new(Category::Generator, 1);

/// A generator failed to initialize.
pub const GENERATOR_INIT_FAILED: DiagnosticCode = DiagnosticCode::new(Category::Generator, 2);

pub(crate) fn generator_failed(name: &str, error: &SharedError) -> Diagnostic {
    Diagnostic::warning(
        GENERATOR_FAILED,
        format!("generator '{name}' failed to generate output: {error}"),
        Span::DUMMY,
    )
    .with_note("the generator contributes no output; code that depends on it may not compile")
}

pub(crate) fn generator_init_failed(name: &str, error: &SharedError) -> Diagnostic {
    Diagnostic::warning(
        GENERATOR_INIT_FAILED,
        format!("generator '{name}' failed to initialize: {error}"),
        Span::DUMMY,
    )
    .with_note("the generator contributes no output; code that depends on it may not compile")
}
