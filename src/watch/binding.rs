// src/watch/binding.rs

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::engine::TaskName;

/// Boxed future returned by [`ChangeHandler::on_change`].
pub type ChangeFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// A glob pattern and what to do when a matching file changes.
///
/// At least one of `run` / `reload` should be set; a binding with neither
/// is accepted but only logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchBinding {
    pub glob: String,
    /// Task to run for a change.
    pub run: Option<TaskName>,
    /// Push a browser reload with the changed paths (after `run` succeeded).
    pub reload: bool,
    /// Skip changes that leave the content of every matched file unchanged.
    pub use_hash: bool,
}

impl WatchBinding {
    /// Re-run `task` when a file matching `glob` changes.
    pub fn task(glob: impl Into<String>, task: impl Into<TaskName>) -> Self {
        Self {
            glob: glob.into(),
            run: Some(task.into()),
            reload: false,
            use_hash: false,
        }
    }

    /// Reload connected browsers when a file matching `glob` changes.
    pub fn reload(glob: impl Into<String>) -> Self {
        Self {
            glob: glob.into(),
            run: None,
            reload: true,
            use_hash: false,
        }
    }

    pub fn and_reload(mut self) -> Self {
        self.reload = true;
        self
    }

    pub fn with_hash(mut self, use_hash: bool) -> Self {
        self.use_hash = use_hash;
        self
    }

    /// Short human description for logs: `sass/*.scss -> build-css`.
    pub fn describe(&self) -> String {
        let target = match (&self.run, self.reload) {
            (Some(task), true) => format!("{task} + reload"),
            (Some(task), false) => task.clone(),
            (None, true) => "reload".to_string(),
            (None, false) => "nothing".to_string(),
        };
        format!("{} -> {}", self.glob, target)
    }
}

/// What the watcher calls once per (debounced, merged) batch of changes.
///
/// `paths` are absolute, sorted and deduplicated. An error is logged by the
/// watcher and never stops it.
pub trait ChangeHandler: Send + Sync {
    fn on_change<'a>(&'a self, binding: &'a WatchBinding, paths: Vec<PathBuf>) -> ChangeFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_names_every_target() {
        assert_eq!(WatchBinding::task("sass/*.scss", "build-css").describe(), "sass/*.scss -> build-css");
        assert_eq!(WatchBinding::reload("*.html").describe(), "*.html -> reload");
        assert_eq!(
            WatchBinding::task("js/*.js", "build-js").and_reload().describe(),
            "js/*.js -> build-js + reload"
        );
    }
}
