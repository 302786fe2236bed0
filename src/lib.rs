// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod plugin;
pub mod server;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, load_or_builtin, project_root};
use crate::dag::TaskGraph;
use crate::exec::{Workspace, build_task_graph};
use crate::plugin::Flags;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (or the built-in task set)
/// - the plugin workspace and the task graph
/// - one run of the requested task, or `list` / `--dry-run` output
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_or_builtin(&config_path)?;
    let root = project_root(&config_path);
    debug!(root = ?root, tasks = cfg.tasks().len(), "configuration loaded");

    match args.command {
        Command::List => {
            print_task_list(&cfg);
            Ok(())
        }
        Command::Run {
            task,
            profile,
            settings,
            dry_run,
        } => {
            let flags = build_flags(profile, settings);
            let ws = Arc::new(Workspace::from_config(&cfg, root, flags));
            let graph = Arc::new(build_task_graph(&cfg, ws)?);

            if dry_run {
                print_dry_run(&graph, &task)?;
                return Ok(());
            }

            let report = graph.run(&task).await?.into_result()?;
            info!(
                task = %report.target,
                tasks = report.succeeded.len(),
                "all tasks finished successfully"
            );
            Ok(())
        }
    }
}

/// Flag map handed to every plugin: `--profile` plus every `--set`.
/// Later `--set` entries win.
pub fn build_flags(profile: Option<String>, settings: Vec<(String, String)>) -> Flags {
    let mut flags = Flags::new();
    if let Some(profile) = profile {
        flags.insert("profile".to_string(), profile);
    }
    flags.extend(settings);
    flags
}

fn print_task_list(cfg: &ConfigFile) {
    println!("tasks ({}):", cfg.tasks().len());
    for (name, task) in cfg.tasks() {
        match &task.description {
            Some(desc) => println!("  {name:<18} {desc}"),
            None => println!("  {name}"),
        }
        if !task.after.is_empty() {
            println!("  {:<18}   after: {}", "", task.after.join(", "));
        }
    }
}

/// Print the resolved execution order of `task` without running anything.
fn print_dry_run(graph: &TaskGraph, task: &str) -> Result<()> {
    let order = graph.resolve(task)?;

    println!("pipedag dry-run: {task}");
    for (i, name) in order.iter().enumerate() {
        let deps = graph.dependencies_of(name);
        if deps.is_empty() {
            println!("  {}. {name}", i + 1);
        } else {
            println!("  {}. {name} (after {})", i + 1, deps.join(", "));
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
