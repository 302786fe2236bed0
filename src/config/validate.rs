// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{PipedagError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PipedagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.server, raw.watch, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    validate_steps(cfg)?;
    validate_watch_bindings(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(PipedagError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(PipedagError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(PipedagError::CyclicDependency(format!("{name} -> {name}")));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: prerequisite -> dependent.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(PipedagError::CyclicDependency(format!(
            "cycle detected in task graph involving task '{}'",
            cycle.node_id()
        ))),
    }
}

fn validate_steps(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for (index, step) in task.steps.iter().enumerate() {
            if step.plugin.trim().is_empty() {
                return Err(PipedagError::ConfigError(format!(
                    "task '{}' step #{} has an empty `plugin`",
                    name,
                    index + 1
                )));
            }
        }
    }
    Ok(())
}

fn validate_watch_bindings(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for binding in task.watch.iter() {
            if binding.glob.trim().is_empty() {
                return Err(PipedagError::ConfigError(format!(
                    "task '{}' has a watch binding with an empty `glob`",
                    name
                )));
            }
            match binding.run.as_deref() {
                Some(target) if !cfg.task.contains_key(target) => {
                    return Err(PipedagError::ConfigError(format!(
                        "task '{}' watches '{}' for unknown task '{}'",
                        name, binding.glob, target
                    )));
                }
                None if !binding.reload => {
                    return Err(PipedagError::ConfigError(format!(
                        "task '{}' watch binding '{}' needs `run` or `reload = true`",
                        name, binding.glob
                    )));
                }
                _ => {}
            }
        }
    }
    Ok(())
}
