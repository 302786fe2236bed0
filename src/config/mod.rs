// src/config/mod.rs

//! Configuration: TOML model, loading and validation.
//!
//! - [`model`] mirrors the `Pipedag.toml` layout.
//! - [`loader`] reads files (or the embedded default task set).
//! - [`validate`] turns a [`RawConfigFile`] into a checked [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    DEFAULT_CONFIG_FILE, builtin_config, load_and_validate, load_from_path, load_or_builtin,
    parse_str, project_root,
};
pub use model::{
    ConfigFile, RawConfigFile, ServerSection, StepConfig, TaskConfig, WatchConfig, WatchSection,
};
