// src/plugin/command.rs

//! Arbitrary shell commands as a pipeline step.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{PluginError, PluginFuture, PluginInput, PluginOutput, TransformPlugin};

/// Environment variable holding the step's matched inputs, one per line.
pub const INPUTS_ENV_VAR: &str = "PIPEDAG_INPUTS";

/// Runs option `cmd` through the platform shell in the project root.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecPlugin;

impl TransformPlugin for ExecPlugin {
    fn name(&self) -> &'static str {
        "exec"
    }

    fn run(&self, input: PluginInput) -> PluginFuture<'_> {
        Box::pin(async move {
            let cmd_line = input
                .str_setting("cmd")?
                .ok_or_else(|| PluginError::invalid_option("cmd", "missing command"))?;

            let inputs = input
                .inputs
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("\n");

            info!(task = %input.task, cmd = %cmd_line, "running command");

            let mut cmd = if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.arg("/C").arg(&cmd_line);
                c
            } else {
                let mut c = Command::new("sh");
                c.arg("-c").arg(&cmd_line);
                c
            };

            cmd.current_dir(&input.root)
                .env(INPUTS_ENV_VAR, inputs)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = cmd.spawn().map_err(|e| PluginError::Command {
                command: cmd_line.clone(),
                message: format!("could not start: {e}"),
            })?;

            // Drain both pipes so the child never blocks on a full buffer.
            let stdout_task = child.stdout.take().map(|stdout| {
                let task = input.task.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        info!(task = %task, "{line}");
                    }
                })
            });
            let stderr_task = child.stderr.take().map(|stderr| {
                let task = input.task.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        warn!(task = %task, "{line}");
                    }
                })
            });

            let status = child.wait().await?;

            for reader in [stdout_task, stderr_task].into_iter().flatten() {
                let _ = reader.await;
            }

            debug!(task = %input.task, exit_code = ?status.code(), "command exited");

            if !status.success() {
                return Err(PluginError::Command {
                    command: cmd_line,
                    message: format!("exited with {status}"),
                });
            }

            Ok(PluginOutput::default())
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::fs::RealFileSystem;
    use crate::plugin::PluginOptions;

    fn input(root: &std::path::Path, cmd: &str, inputs: Vec<PathBuf>) -> PluginInput {
        PluginInput {
            task: "exec".into(),
            root: root.to_path_buf(),
            inputs,
            dest: None,
            options: PluginOptions::new().with("cmd", cmd),
            flags: Arc::default(),
            fs: Arc::new(RealFileSystem),
        }
    }

    #[tokio::test]
    async fn runs_in_project_root_with_inputs() {
        let tmp = tempfile::tempdir().unwrap();
        let inputs = vec![tmp.path().join("a.txt"), tmp.path().join("b.txt")];

        ExecPlugin
            .run(input(tmp.path(), "printf '%s' \"$PIPEDAG_INPUTS\" > seen.txt", inputs.clone()))
            .await
            .unwrap();

        let seen = std::fs::read_to_string(tmp.path().join("seen.txt")).unwrap();
        let expected: Vec<String> = inputs.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        assert_eq!(seen, expected.join("\n"));
    }

    #[tokio::test]
    async fn non_zero_exit_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ExecPlugin
            .run(input(tmp.path(), "echo oops >&2; exit 2", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Command { .. }));
    }

    #[tokio::test]
    async fn missing_cmd_is_an_option_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut i = input(tmp.path(), "true", Vec::new());
        i.options = PluginOptions::new();
        assert!(matches!(
            ExecPlugin.run(i).await,
            Err(PluginError::InvalidOption { key, .. }) if key == "cmd"
        ));
    }
}
