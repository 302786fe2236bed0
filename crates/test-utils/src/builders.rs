#![allow(dead_code)]

use pipedag::config::{
    ConfigFile, RawConfigFile, ServerSection, StepConfig, TaskConfig, WatchConfig,
};
use pipedag::plugin::PluginOptions;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_server(mut self, server: ServerSection) -> Self {
        self.config.server = server;
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.config.watch.debounce_ms = ms;
        self
    }

    /// The raw (unvalidated) config, for tests that exercise validation.
    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    config: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: TaskConfig::default(),
        }
    }

    pub fn description(mut self, text: &str) -> Self {
        self.config.description = Some(text.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.config.after.push(dep.to_string());
        self
    }

    /// Append a plugin step.
    pub fn step(mut self, plugin: &str, src: &[&str], dest: Option<&str>, options: PluginOptions) -> Self {
        self.config.steps.push(StepConfig {
            plugin: plugin.to_string(),
            src: src.iter().map(|s| s.to_string()).collect(),
            dest: dest.map(str::to_string),
            options,
        });
        self
    }

    pub fn reload(mut self, val: bool) -> Self {
        self.config.reload = val;
        self
    }

    pub fn serve(mut self, val: bool) -> Self {
        self.config.serve = val;
        self
    }

    /// Re-run `task` when `glob` changes.
    pub fn watch_run(mut self, glob: &str, task: &str) -> Self {
        self.config.watch.push(WatchConfig {
            glob: glob.to_string(),
            run: Some(task.to_string()),
            ..WatchConfig::default()
        });
        self
    }

    /// Reload the browser when `glob` changes.
    pub fn watch_reload(mut self, glob: &str) -> Self {
        self.config.watch.push(WatchConfig {
            glob: glob.to_string(),
            reload: true,
            ..WatchConfig::default()
        });
        self
    }

    pub fn build(self) -> TaskConfig {
        self.config
    }
}

impl Default for TaskConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
