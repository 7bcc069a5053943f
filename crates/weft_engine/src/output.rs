//! Generated artifacts and the contexts output callbacks write them through.

use crate::cancel::CancellationToken;
use crate::error::ArtifactError;
use crate::table::StateTable;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use weft_common::ContentHash;
use weft_config::OutputKindName;
use weft_diagnostics::{Diagnostic, DiagnosticSink};

/// The kind of an output registration.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Sources needed by the host for analysis as well as the final build.
    Source,
    /// Sources that only affect the final build.
    Implementation,
    /// Structured values for the host itself.
    Host,
    /// Constant sources added once when the generator initializes.
    PostInit,
}

impl OutputKind {
    /// The name under which steps of this kind are reported.
    pub fn step_name(self) -> &'static str {
        match self {
            OutputKind::Source => "SourceOutput",
            OutputKind::Implementation => "ImplementationSourceOutput",
            OutputKind::Host => "HostOutput",
            OutputKind::PostInit => "PostInitializationOutput",
        }
    }
}

impl From<OutputKindName> for OutputKind {
    fn from(name: OutputKindName) -> Self {
        match name {
            OutputKindName::Source => OutputKind::Source,
            OutputKindName::Implementation => OutputKind::Implementation,
            OutputKindName::Host => OutputKind::Host,
            OutputKindName::PostInit => OutputKind::PostInit,
        }
    }
}

/// A source added by an output callback.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SourceText {
    /// The name the source was added under.
    pub hint_name: String,
    /// The source text.
    pub text: Arc<str>,
}

/// A generated source as reported in a run result.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct GeneratedSource {
    /// The name the generator added the source under.
    pub hint_name: String,
    /// The source text.
    pub text: Arc<str>,
    /// Hash of the text.
    pub content_hash: ContentHash,
    /// Where the host should place the source:
    /// `<base_directory>/<generator>/<hint_name>`.
    pub path: PathBuf,
}

/// A structured value produced for the host.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct HostOutput {
    /// The key the value was added under.
    pub key: String,
    /// The value.
    pub value: serde_json::Value,
}

/// Everything one output callback invocation produced.
#[derive(Clone, PartialEq, Debug, Default)]
pub(crate) struct OutputRecord {
    pub(crate) sources: Vec<SourceText>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) host_outputs: Vec<HostOutput>,
}

/// Checks that a hint name can be used as a relative file path.
pub(crate) fn validate_hint_name(hint_name: &str) -> Result<(), ArtifactError> {
    let invalid = |reason| ArtifactError::InvalidHintName {
        hint_name: hint_name.to_string(),
        reason,
    };
    if hint_name.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if hint_name.starts_with(['/', '\\']) || Path::new(hint_name).is_absolute() {
        return Err(invalid("must be a relative path"));
    }
    if hint_name
        .chars()
        .any(|c| c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*'))
    {
        return Err(invalid("contains a character that is not allowed in file names"));
    }
    if hint_name.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(invalid("must not leave the generator's output directory"));
    }
    Ok(())
}

/// Collects the sources of one record, rejecting invalid and repeated hint
/// names. The first rejected source is kept as the record's error.
#[derive(Default)]
struct SourceCollector {
    sources: Vec<SourceText>,
    seen: HashSet<String>,
    error: Option<ArtifactError>,
}

impl SourceCollector {
    fn add(&mut self, hint_name: &str, text: Arc<str>) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = validate_hint_name(hint_name) {
            self.error = Some(err);
            return;
        }
        if !self.seen.insert(hint_name.to_ascii_lowercase()) {
            self.error = Some(ArtifactError::DuplicateHintName {
                hint_name: hint_name.to_string(),
            });
            return;
        }
        self.sources.push(SourceText {
            hint_name: hint_name.to_string(),
            text,
        });
    }

    fn finish(self) -> Result<Vec<SourceText>, ArtifactError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.sources),
        }
    }
}

/// Handed to source output callbacks.
pub struct SourceProductionContext<'a> {
    cancel: &'a CancellationToken,
    sources: SourceCollector,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> SourceProductionContext<'a> {
    pub(crate) fn new(cancel: &'a CancellationToken) -> Self {
        Self {
            cancel,
            sources: SourceCollector::default(),
            diagnostics: Vec::new(),
        }
    }

    /// Adds a generated source.
    ///
    /// Hint names must be non-empty relative paths without characters that
    /// are invalid in file names, and unique within the generator ignoring
    /// ASCII case. A rejected hint name faults the generator.
    pub fn add_source(&mut self, hint_name: &str, text: impl Into<Arc<str>>) {
        self.sources.add(hint_name, text.into());
    }

    /// Reports a diagnostic to the host.
    pub fn report_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// The run's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        self.cancel
    }

    pub(crate) fn finish(self) -> Result<OutputRecord, ArtifactError> {
        Ok(OutputRecord {
            sources: self.sources.finish()?,
            diagnostics: self.diagnostics,
            host_outputs: Vec::new(),
        })
    }
}

/// Handed to host output callbacks.
pub struct HostProductionContext<'a> {
    cancel: &'a CancellationToken,
    outputs: Vec<HostOutput>,
}

impl<'a> HostProductionContext<'a> {
    pub(crate) fn new(cancel: &'a CancellationToken) -> Self {
        Self {
            cancel,
            outputs: Vec::new(),
        }
    }

    /// Adds a value for the host under `key`.
    pub fn add_output(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.outputs.push(HostOutput {
            key: key.into(),
            value,
        });
    }

    /// The run's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        self.cancel
    }

    pub(crate) fn finish(self) -> OutputRecord {
        OutputRecord {
            host_outputs: self.outputs,
            ..OutputRecord::default()
        }
    }
}

/// Handed to post-initialization callbacks, which add constant sources.
pub struct PostInitContext {
    sources: SourceCollector,
}

impl PostInitContext {
    pub(crate) fn new() -> Self {
        Self {
            sources: SourceCollector::default(),
        }
    }

    /// Adds a source, under the same hint name rules as
    /// [`SourceProductionContext::add_source`].
    pub fn add_source(&mut self, hint_name: &str, text: impl Into<Arc<str>>) {
        self.sources.add(hint_name, text.into());
    }

    pub(crate) fn finish(self) -> Result<Vec<SourceText>, ArtifactError> {
        self.sources.finish()
    }
}

/// Accumulates one generator's artifacts in registration order.
pub(crate) struct GeneratorOutputs {
    directory: PathBuf,
    sources: Vec<GeneratedSource>,
    seen: HashSet<String>,
    diagnostics: DiagnosticSink,
    host_outputs: Vec<HostOutput>,
}

impl GeneratorOutputs {
    pub(crate) fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            sources: Vec::new(),
            seen: HashSet::new(),
            diagnostics: DiagnosticSink::new(),
            host_outputs: Vec::new(),
        }
    }

    pub(crate) fn add_source(&mut self, source: &SourceText) -> Result<(), ArtifactError> {
        if !self.seen.insert(source.hint_name.to_ascii_lowercase()) {
            return Err(ArtifactError::DuplicateHintName {
                hint_name: source.hint_name.clone(),
            });
        }
        self.sources.push(GeneratedSource {
            hint_name: source.hint_name.clone(),
            text: Arc::clone(&source.text),
            content_hash: ContentHash::from_text(&source.text),
            path: self.directory.join(&source.hint_name),
        });
        Ok(())
    }

    /// Appends every live record of an output table.
    pub(crate) fn append(&mut self, table: &StateTable<OutputRecord>) -> Result<(), ArtifactError> {
        for record in table.live_values() {
            for source in &record.sources {
                self.add_source(source)?;
            }
            self.diagnostics.extend(record.diagnostics.iter().cloned());
            self.host_outputs.extend(record.host_outputs.iter().cloned());
        }
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (Vec<GeneratedSource>, Vec<Diagnostic>, Vec<HostOutput>) {
        (self.sources, self.diagnostics.take_all(), self.host_outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_name_rules() {
        assert!(validate_hint_name("Widget.g.rs").is_ok());
        assert!(validate_hint_name("nested/Widget.g.rs").is_ok());
        for bad in ["", "  ", "/abs.rs", "a:b.rs", "what?.rs", "../up.rs", "tab\there"] {
            assert!(
                matches!(validate_hint_name(bad), Err(ArtifactError::InvalidHintName { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn duplicate_hint_names_ignore_case() {
        let cancel = CancellationToken::new();
        let mut cx = SourceProductionContext::new(&cancel);
        cx.add_source("Widget.g.rs", "a");
        cx.add_source("widget.G.rs", "b");
        assert_eq!(
            cx.finish().unwrap_err(),
            ArtifactError::DuplicateHintName {
                hint_name: "widget.G.rs".to_string()
            }
        );
    }

    #[test]
    fn host_context_collects_values() {
        let cancel = CancellationToken::new();
        let mut cx = HostProductionContext::new(&cancel);
        cx.add_output("count", serde_json::json!(3));
        let record = cx.finish();
        assert_eq!(record.host_outputs.len(), 1);
        assert_eq!(record.host_outputs[0].value, serde_json::json!(3));
    }

    #[test]
    fn generator_outputs_place_sources() {
        let mut outputs = GeneratorOutputs::new(PathBuf::from("gen").join("Records"));
        let source = SourceText {
            hint_name: "Point.g.rs".to_string(),
            text: Arc::from("struct Point;"),
        };
        outputs.add_source(&source).unwrap();
        assert!(outputs.add_source(&source).is_err());
        let (sources, _, _) = outputs.into_parts();
        assert_eq!(sources[0].path, PathBuf::from("gen/Records/Point.g.rs"));
        assert_eq!(sources[0].content_hash, ContentHash::from_text("struct Point;"));
    }

    #[test]
    fn step_names() {
        assert_eq!(OutputKind::Implementation.step_name(), "ImplementationSourceOutput");
        assert_eq!(OutputKind::from(OutputKindName::Host), OutputKind::Host);
    }
}
