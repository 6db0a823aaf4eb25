//! # Node Runtime Library
//!
//! Wiring for the `node-runtime` binary, exposed for testing.

pub mod logging;
pub mod runtime;

pub use logging::init_logging;
pub use runtime::{resolve_config_path, NodeRuntime, CONFIG_ENV, DEFAULT_CONFIG_PATH};
