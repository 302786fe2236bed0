// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::plugin::PluginOptions;

/// Configuration exactly as deserialized from TOML, before validation.
///
/// ```toml
/// [server]
/// port = 3000
///
/// [task.build-css]
/// reload = true
/// [[task.build-css.step]]
/// plugin = "sass"
/// src = ["sass/*.scss"]
/// dest = "build/css"
///
/// [task.build]
/// after = ["build-css"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub watch: WatchSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    server: ServerSection,
    watch: WatchSection,
    task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        server: ServerSection,
        watch: WatchSection,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self {
            server,
            watch,
            task,
        }
    }

    pub fn server(&self) -> &ServerSection {
        &self.server
    }

    pub fn watch_section(&self) -> &WatchSection {
        &self.watch
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskConfig> {
        &self.task
    }

    pub fn task(&self, name: &str) -> Option<&TaskConfig> {
        self.task.get(name)
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Directory to serve, relative to the project root.
    #[serde(default = "default_server_root")]
    pub root: String,

    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_root() -> String {
    ".".to_string()
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    3000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            root: default_server_root(),
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// How long a watch binding waits for more events before running.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    100
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// Shown by `pipedag list`.
    #[serde(default)]
    pub description: Option<String>,

    /// Prerequisites: all of these must succeed before this task runs.
    #[serde(default)]
    pub after: Vec<String>,

    /// Plugin calls, executed in order.
    #[serde(default, rename = "step")]
    pub steps: Vec<StepConfig>,

    /// Push the files written by the steps to the dev server, if one runs.
    #[serde(default)]
    pub reload: bool,

    /// Start the dev server, then keep the task alive until Ctrl-C.
    #[serde(default)]
    pub serve: bool,

    /// Watch bindings registered when this task runs. A task with bindings
    /// stays alive until Ctrl-C.
    #[serde(default)]
    pub watch: Vec<WatchConfig>,
}

/// `[[task.<name>.step]]`: one plugin invocation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepConfig {
    /// Registered plugin name (`clean`, `sass`, `minify-js`, ...).
    pub plugin: String,

    /// Input globs, relative to the project root.
    #[serde(default)]
    pub src: Vec<String>,

    /// Output directory, relative to the project root.
    #[serde(default)]
    pub dest: Option<String>,

    /// Free-form plugin options.
    #[serde(default)]
    pub options: PluginOptions,
}

/// `[[task.<name>.watch]]`: one watch binding.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchConfig {
    pub glob: String,

    /// Task to re-run on change.
    #[serde(default)]
    pub run: Option<String>,

    /// Push a browser reload with the changed paths.
    #[serde(default)]
    pub reload: bool,

    /// Skip the run when the content of the matched files did not change.
    #[serde(default)]
    pub use_hash: bool,
}
