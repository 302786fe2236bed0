// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `pipedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipedag",
    version,
    about = "Run front-end build tasks: compile, minify, validate, serve with live reload.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// When the default `Pipedag.toml` does not exist, the built-in task set
    /// is used.
    #[arg(long, value_name = "PATH", default_value = crate::config::DEFAULT_CONFIG_FILE, global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPEDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a task after all of its prerequisites.
    Run {
        /// Name of the task to run.
        task: String,

        /// Validation profile handed to plugins (e.g. `css3`, `css21`).
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,

        /// Extra plugin setting, `key=value`. May be repeated.
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        settings: Vec<(String, String)>,

        /// Resolve and print the execution order without running anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// List the configured tasks and their prerequisites.
    List,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_profile() {
        let args = CliArgs::try_parse_from([
            "pipedag", "run", "valid-css", "--profile=css21", "--set", "sleep_ms=0",
        ])
        .unwrap();

        match args.command {
            Command::Run {
                task,
                profile,
                settings,
                dry_run,
            } => {
                assert_eq!(task, "valid-css");
                assert_eq!(profile.as_deref(), Some("css21"));
                assert_eq!(settings, vec![("sleep_ms".to_string(), "0".to_string())]);
                assert!(!dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(args.config, "Pipedag.toml");
    }

    #[test]
    fn rejects_malformed_setting() {
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
        assert_eq!(
            parse_key_value("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
    }
}
