//! Parsing and validation of `weft.toml` driver configuration.
//!
//! Hosts that let users tune the driver read the project's `weft.toml` into a
//! [`WeftConfig`] and turn it into driver options. Every section is optional.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
