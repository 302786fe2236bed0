// src/dag/state_manager.rs

//! Per-run state transitions for tasks in the scheduler.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo};
use crate::engine::TaskName;

/// Mutable view over a run's task states.
pub struct StateManager<'a> {
    order: &'a [TaskName],
    dependents: &'a HashMap<TaskName, Vec<TaskName>>,
    tasks: &'a mut HashMap<TaskName, TaskInfo>,
    run_id: u64,
}

impl<'a> StateManager<'a> {
    pub fn new(
        order: &'a [TaskName],
        dependents: &'a HashMap<TaskName, Vec<TaskName>>,
        tasks: &'a mut HashMap<TaskName, TaskInfo>,
        run_id: u64,
    ) -> Self {
        Self {
            order,
            dependents,
            tasks,
            run_id,
        }
    }

    /// Mark every task downstream of `failed_task` that has not started yet
    /// as `Blocked`.
    ///
    /// Returns the newly blocked tasks.
    pub fn mark_dependents_blocked(&mut self, failed_task: &str) -> Vec<TaskName> {
        let mut stack: Vec<TaskName> = self
            .dependents
            .get(failed_task)
            .cloned()
            .unwrap_or_default();

        let mut newly_blocked = Vec::new();

        while let Some(name) = stack.pop() {
            let Some(info) = self.tasks.get_mut(&name) else {
                continue;
            };

            match info.run_state {
                RunState::Pending => {
                    info.run_state = RunState::Blocked;
                    debug!(
                        task = %info.name,
                        upstream = %failed_task,
                        "blocking task due to upstream failure"
                    );
                    newly_blocked.push(info.name.clone());
                    if let Some(next) = self.dependents.get(&name) {
                        stack.extend(next.iter().cloned());
                    }
                }
                RunState::Running => {
                    // Cannot happen: a running task had all prerequisites succeed.
                    warn!(task = %info.name, "dependent of a failed task is already running");
                }
                RunState::Succeeded | RunState::Failed | RunState::Blocked => {}
            }
        }

        newly_blocked
    }

    /// Mark every `Pending` task whose prerequisites all succeeded as
    /// `Running` and return them, in resolution order.
    pub fn collect_new_ready_tasks(&mut self) -> Vec<ScheduledTask> {
        let candidates: Vec<TaskName> = self
            .order
            .iter()
            .filter(|name| {
                self.tasks.get(*name).is_some_and(|info| {
                    info.run_state == RunState::Pending && deps_satisfied(self.tasks, info)
                })
            })
            .cloned()
            .collect();

        let mut ready = Vec::with_capacity(candidates.len());
        for name in candidates {
            if let Some(info) = self.tasks.get_mut(&name) {
                info!(
                    task = %info.name,
                    run_id = self.run_id,
                    "prerequisites satisfied; scheduling task"
                );
                info.run_state = RunState::Running;
                ready.push(ScheduledTask {
                    name: info.name.clone(),
                    run_id: self.run_id,
                });
            }
        }

        ready
    }

    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks.values().all(|info| info.run_state.is_terminal())
    }
}

/// Whether all prerequisites of `info` succeeded in this run.
pub fn deps_satisfied(tasks: &HashMap<TaskName, TaskInfo>, info: &TaskInfo) -> bool {
    info.deps.iter().all(|dep_name| match tasks.get(dep_name) {
        Some(dep) => dep.run_state == RunState::Succeeded,
        None => {
            warn!(
                task = %info.name,
                dep = %dep_name,
                "prerequisite missing from run"
            );
            false
        }
    })
}
