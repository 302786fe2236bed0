// src/plugin/mod.rs

//! Transform plugins: the steps a configured task is made of.
//!
//! A plugin gets the files a step's `src` globs matched, an optional
//! destination directory, the step's free-form `options` table and the CLI
//! flag map, writes zero or more files and reports them back.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::fs::FileSystem;

pub mod clean;
pub mod command;
pub mod minify;
pub mod sass;
pub mod validate;

pub use clean::CleanPlugin;
pub use command::ExecPlugin;
pub use minify::MinifyJsPlugin;
pub use sass::SassPlugin;
pub use validate::{CssValidatorPlugin, HtmlValidatorPlugin};

/// Flags from the command line (`--profile`, `--set key=value`), shared by
/// every plugin invocation of a run.
pub type Flags = BTreeMap<String, String>;

/// Boxed future returned by [`TransformPlugin::run`].
pub type PluginFuture<'a> =
    Pin<Box<dyn Future<Output = Result<PluginOutput, PluginError>> + Send + 'a>>;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Sass compilation failed")]
    Sass(#[from] Box<grass::Error>),

    #[error("Command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    #[error("Invalid JSON")]
    Json(#[from] serde_json::Error),

    #[error("Invalid option '{key}': {message}")]
    InvalidOption { key: String, message: String },

    #[error("Validation reported {errors} error(s) in {path}")]
    ValidationFailed { path: String, errors: usize },

    #[error(transparent)]
    Fs(#[from] anyhow::Error),
}

impl PluginError {
    pub fn invalid_option(key: &str, message: impl Into<String>) -> Self {
        PluginError::InvalidOption {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Free-form per-step options (`options = { ... }` in the config file).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct PluginOptions(BTreeMap<String, toml::Value>);

impl PluginOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests and programmatic pipelines.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>, PluginError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(toml::Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(PluginError::invalid_option(
                key,
                format!("expected a string, got {}", other.type_str()),
            )),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, PluginError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(toml::Value::Boolean(b)) => Ok(Some(*b)),
            Some(other) => Err(PluginError::invalid_option(
                key,
                format!("expected a boolean, got {}", other.type_str()),
            )),
        }
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, PluginError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(toml::Value::Integer(i)) => u64::try_from(*i)
                .map(Some)
                .map_err(|_| PluginError::invalid_option(key, "expected a non-negative integer")),
            Some(other) => Err(PluginError::invalid_option(
                key,
                format!("expected an integer, got {}", other.type_str()),
            )),
        }
    }
}

/// Everything a plugin invocation gets to see.
#[derive(Clone)]
pub struct PluginInput {
    /// Task the step belongs to (for logging).
    pub task: String,
    /// Project root; inputs and `dest` are already joined onto it.
    pub root: PathBuf,
    /// Files matched by the step's `src` globs, sorted.
    pub inputs: Vec<PathBuf>,
    pub dest: Option<PathBuf>,
    pub options: PluginOptions,
    pub flags: Arc<Flags>,
    pub fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for PluginInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInput")
            .field("task", &self.task)
            .field("inputs", &self.inputs)
            .field("dest", &self.dest)
            .field("options", &self.options)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl PluginInput {
    /// A string setting: CLI flag first, then the step option.
    pub fn str_setting(&self, key: &str) -> Result<Option<String>, PluginError> {
        if let Some(v) = self.flags.get(key) {
            return Ok(Some(v.clone()));
        }
        Ok(self.options.get_str(key)?.map(str::to_string))
    }

    pub fn bool_setting(&self, key: &str) -> Result<Option<bool>, PluginError> {
        if let Some(v) = self.flags.get(key) {
            return v
                .parse::<bool>()
                .map(Some)
                .map_err(|_| PluginError::invalid_option(key, format!("expected true/false, got '{v}'")));
        }
        self.options.get_bool(key)
    }

    pub fn u64_setting(&self, key: &str) -> Result<Option<u64>, PluginError> {
        if let Some(v) = self.flags.get(key) {
            return v
                .parse::<u64>()
                .map(Some)
                .map_err(|_| PluginError::invalid_option(key, format!("expected an integer, got '{v}'")));
        }
        self.options.get_u64(key)
    }

    /// The step's `dest`, or an error naming the missing key.
    pub fn require_dest(&self) -> Result<&Path, PluginError> {
        self.dest
            .as_deref()
            .ok_or_else(|| PluginError::invalid_option("dest", "this plugin needs a destination directory"))
    }

    /// Path relative to the project root, `/`-separated, for reports and
    /// source maps.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// Files a plugin wrote or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginOutput {
    pub written: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl PluginOutput {
    pub fn written(written: Vec<PathBuf>) -> Self {
        Self {
            written,
            removed: Vec::new(),
        }
    }
}

/// A transform step.
pub trait TransformPlugin: Send + Sync {
    /// Name used in `plugin = "..."`.
    fn name(&self) -> &'static str;

    fn run(&self, input: PluginInput) -> PluginFuture<'_>;
}

/// Plugins by name.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn TransformPlugin>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.plugins.keys()).finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every plugin pipedag ships.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(CleanPlugin);
        registry.register(SassPlugin);
        registry.register(MinifyJsPlugin);
        registry.register(HtmlValidatorPlugin);
        registry.register(CssValidatorPlugin);
        registry.register(ExecPlugin);
        registry
    }

    /// Register a plugin, replacing any plugin with the same name.
    pub fn register<P: TransformPlugin + 'static>(&mut self, plugin: P) {
        self.plugins.insert(plugin.name().to_string(), Arc::new(plugin));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TransformPlugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(|s| s.as_str())
    }
}
