// src/plugin/clean.rs

use tracing::{debug, info};

use super::{PluginFuture, PluginInput, PluginOutput, TransformPlugin};

/// Deletes every file the step's globs matched.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanPlugin;

impl TransformPlugin for CleanPlugin {
    fn name(&self) -> &'static str {
        "clean"
    }

    fn run(&self, input: PluginInput) -> PluginFuture<'_> {
        Box::pin(async move {
            let mut removed = Vec::with_capacity(input.inputs.len());

            for path in &input.inputs {
                input.fs.remove_file(path)?;
                debug!(task = %input.task, path = %input.display_path(path), "removed");
                removed.push(path.clone());
            }

            info!(task = %input.task, count = removed.len(), "cleaned files");

            Ok(PluginOutput {
                written: Vec::new(),
                removed,
            })
        })
    }
}
