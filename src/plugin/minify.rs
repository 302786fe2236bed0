// src/plugin/minify.rs

//! JavaScript minification through an external `esbuild` binary.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{PluginError, PluginFuture, PluginInput, PluginOutput, TransformPlugin};

pub const DEFAULT_ESBUILD: &str = "esbuild";
pub const DEFAULT_SUFFIX: &str = ".min";

/// Minifies each input into `<dest>/<stem><suffix>.js` with a companion
/// source map.
///
/// Options: `command` (default `esbuild`), `suffix` (default `.min`).
#[derive(Debug, Clone, Copy, Default)]
pub struct MinifyJsPlugin;

impl TransformPlugin for MinifyJsPlugin {
    fn name(&self) -> &'static str {
        "minify-js"
    }

    fn run(&self, input: PluginInput) -> PluginFuture<'_> {
        Box::pin(async move {
            let command = input
                .str_setting("command")?
                .unwrap_or_else(|| DEFAULT_ESBUILD.to_string());
            let suffix = input
                .str_setting("suffix")?
                .unwrap_or_else(|| DEFAULT_SUFFIX.to_string());
            let dest = input.require_dest()?.to_path_buf();

            let mut written = Vec::with_capacity(input.inputs.len() * 2);

            for path in &input.inputs {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let out = dest.join(format!("{stem}{suffix}.js"));

                debug!(
                    task = %input.task,
                    input = %input.display_path(path),
                    output = %input.display_path(&out),
                    "running {command}"
                );

                let output = Command::new(&command)
                    .arg(path)
                    .arg("--minify")
                    .arg("--sourcemap")
                    .arg(format!("--outfile={}", out.display()))
                    .current_dir(&input.root)
                    .stdin(Stdio::null())
                    .output()
                    .await
                    .map_err(|e| PluginError::Command {
                        command: command.clone(),
                        message: format!("could not start: {e}"),
                    })?;

                let stderr = String::from_utf8_lossy(&output.stderr);
                if !output.status.success() {
                    return Err(PluginError::Command {
                        command,
                        message: format!(
                            "exited with {} while minifying {}: {}",
                            output.status,
                            input.display_path(path),
                            stderr.trim()
                        ),
                    });
                }

                for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
                    if line.contains("warning") {
                        warn!(task = %input.task, "{}", line.trim());
                    } else {
                        debug!(task = %input.task, "{}", line.trim());
                    }
                }

                let mut map = out.clone().into_os_string();
                map.push(".map");
                written.push(out);
                written.push(map.into());
            }

            info!(task = %input.task, files = input.inputs.len(), "minified scripts");
            Ok(PluginOutput::written(written))
        })
    }
}
