//! Configuration types deserialized from `weft.toml`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The top-level configuration parsed from `weft.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeftConfig {
    /// Driver behavior.
    #[serde(default)]
    pub driver: DriverSection,
    /// Per-node event output.
    #[serde(default)]
    pub events: EventsSection,
    /// Per-generator overrides, keyed by generator name.
    #[serde(default)]
    pub generators: BTreeMap<String, GeneratorSection>,
}

impl WeftConfig {
    /// Returns the names of generators switched off with `enabled = false`.
    pub fn disabled_generators(&self) -> Vec<String> {
        self.generators
            .iter()
            .filter(|(_, section)| !section.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// The `[driver]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverSection {
    /// Record a step for every node item so runs can report their history.
    #[serde(default)]
    pub track_incremental_steps: bool,
    /// Output kinds the driver skips entirely.
    #[serde(default)]
    pub disabled_outputs: Vec<OutputKindName>,
    /// Directory that generated source paths are rooted at.
    #[serde(default)]
    pub base_directory: Option<PathBuf>,
}

/// Output kinds as spelled in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKindName {
    /// Regular source outputs.
    Source,
    /// Sources only needed for a full build, not for editing.
    Implementation,
    /// Host key/value outputs.
    Host,
    /// Fixed sources added when a generator is initialized.
    PostInit,
}

/// The `[events]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsSection {
    /// Emit one event per node update.
    #[serde(default)]
    pub enabled: bool,
    /// File to append JSON-lines events to.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// A `[generators.<name>]` section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorSection {
    /// Whether the generator runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}
