// src/errors.rs

//! Crate-wide error type.

use std::sync::Arc;

use thiserror::Error;

use crate::plugin::PluginError;

#[derive(Error, Debug)]
pub enum PipedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Cyclic dependency: {0}")]
    CyclicDependency(String),

    #[error("Plugin '{plugin}' failed")]
    Plugin {
        plugin: String,
        #[source]
        source: PluginError,
    },

    #[error("Port {0} is already in use")]
    PortInUse(u16),

    /// An action failed. `task` is the task whose action returned the error,
    /// which is not necessarily the task that was requested.
    #[error("Task '{task}' failed: {cause:#}")]
    TaskFailed {
        task: String,
        cause: Arc<anyhow::Error>,
    },

    #[error("TOML parsing error")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipedagError>;

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn alternate_format_prints_each_cause_once() {
        let err: anyhow::Result<()> = Err(PipedagError::Plugin {
            plugin: "sass".into(),
            source: PluginError::Io(std::io::Error::other("disk gone")),
        })
        .context("step 1 (sass)");

        let line = format!("{:#}", err.unwrap_err());
        assert_eq!(line, "step 1 (sass): Plugin 'sass' failed: IO error: disk gone");
        assert_eq!(line.matches("disk gone").count(), 1);
    }

    #[test]
    fn task_failure_carries_the_full_chain() {
        let cause = anyhow::Error::new(PipedagError::Plugin {
            plugin: "exec".into(),
            source: PluginError::Command {
                command: "false".into(),
                message: "exit status 1".into(),
            },
        })
        .context("step 2 (exec)");
        let err = PipedagError::TaskFailed {
            task: "deploy".into(),
            cause: Arc::new(cause),
        };

        assert_eq!(
            err.to_string(),
            "Task 'deploy' failed: step 2 (exec): Plugin 'exec' failed: Command `false` failed: exit status 1"
        );
    }
}
