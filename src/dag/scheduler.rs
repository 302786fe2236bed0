use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{self, StateManager};
use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo, TaskRunState};
use crate::engine::{TaskName, TaskOutcome};
use crate::errors::Result;

/// Per-run state machine for one invocation of a target task.
///
/// It is responsible for:
/// - remembering which tasks the target needs (resolved once, up front)
/// - deciding when a task is ready to run (all prerequisites succeeded)
/// - blocking everything downstream of a failure
/// - noticing when every task in the run is terminal
#[derive(Debug)]
pub struct Scheduler {
    target: TaskName,
    run_id: u64,
    /// Resolution order: prerequisites first, target last.
    order: Vec<TaskName>,
    tasks: HashMap<TaskName, TaskInfo>,
    /// Reverse edges restricted to the tasks in this run.
    dependents: HashMap<TaskName, Vec<TaskName>>,
    started: bool,
    finished: bool,
}

impl Scheduler {
    /// Resolve `target` against `graph` and prepare a run.
    ///
    /// Fails with `UnknownTask` / `CyclicDependency` before anything is
    /// scheduled.
    pub fn for_target(graph: &TaskGraph, target: &str, run_id: u64) -> Result<Self> {
        let order = graph.resolve(target)?;

        let mut tasks = HashMap::with_capacity(order.len());
        let mut dependents: HashMap<TaskName, Vec<TaskName>> = HashMap::new();

        for name in &order {
            let deps = graph.dependencies_of(name).to_vec();
            for dep in &deps {
                dependents.entry(dep.clone()).or_default().push(name.clone());
            }
            tasks.insert(name.clone(), TaskInfo::new(name.clone(), deps));
        }

        debug!(task = %target, run_id, plan = ?order, "scheduler: resolved run");

        Ok(Self {
            target: target.to_string(),
            run_id,
            order,
            tasks,
            dependents,
            started: false,
            finished: false,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Every task in this run, in resolution order.
    pub fn plan(&self) -> &[TaskName] {
        &self.order
    }

    /// `true` once every task in the run is terminal.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Read-only view of the given task's run state.
    pub fn run_state_of(&self, task: &str) -> TaskRunState {
        self.tasks.get(task).map(|info| info.run_state).into()
    }

    /// Whether all prerequisites of `task` have succeeded in this run.
    ///
    /// Returns `None` if the task is not part of the run.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let info = self.tasks.get(task)?;
        Some(state_manager::deps_satisfied(&self.tasks, info))
    }

    /// Tasks in the given state, in resolution order.
    pub fn tasks_in_state(&self, state: TaskRunState) -> Vec<TaskName> {
        self.order
            .iter()
            .filter(|name| self.run_state_of(name) == state)
            .cloned()
            .collect()
    }

    /// Start the run: returns the tasks without prerequisites.
    pub fn start(&mut self) -> Vec<ScheduledTask> {
        self.step_start().newly_scheduled
    }

    /// Handle completion of a task with a concrete outcome (production API).
    pub fn handle_completion(&mut self, task: &str, outcome: &TaskOutcome) -> Vec<ScheduledTask> {
        self.step_completion(task, outcome).newly_scheduled
    }

    /// Manual-step variant of `start` that returns a rich [`SchedulerStep`].
    pub fn step_start(&mut self) -> SchedulerStep {
        if self.started {
            warn!(run_id = self.run_id, "scheduler: run already started; ignoring");
            return SchedulerStep::empty();
        }
        self.started = true;

        info!(task = %self.target, run_id = self.run_id, "scheduler: starting run");

        let mut manager = StateManager::new(&self.order, &self.dependents, &mut self.tasks, self.run_id);
        let newly_scheduled = manager.collect_new_ready_tasks();
        let run_just_finished = self.maybe_finish_run();

        SchedulerStep {
            newly_scheduled,
            newly_blocked: Vec::new(),
            run_just_finished,
        }
    }

    /// Manual-step variant of `handle_completion` that returns a rich [`SchedulerStep`].
    pub fn step_completion(&mut self, task: &str, outcome: &TaskOutcome) -> SchedulerStep {
        if self.finished {
            warn!(task = %task, run_id = self.run_id, "completion after run finished; ignoring");
            return SchedulerStep::empty();
        }

        let Some(info) = self.tasks.get_mut(task) else {
            warn!(task = %task, "completion for task outside this run; ignoring");
            return SchedulerStep::empty();
        };

        if info.run_state != RunState::Running {
            warn!(
                task = %task,
                state = ?info.run_state,
                "completion for task that is not running; ignoring"
            );
            return SchedulerStep::empty();
        }

        let mut newly_scheduled = Vec::new();
        let mut newly_blocked = Vec::new();

        match outcome {
            TaskOutcome::Success => {
                info.run_state = RunState::Succeeded;
                debug!(task = %task, run_id = self.run_id, "task completed successfully");
                let mut manager =
                    StateManager::new(&self.order, &self.dependents, &mut self.tasks, self.run_id);
                newly_scheduled.extend(manager.collect_new_ready_tasks());
            }
            TaskOutcome::Failed(err) => {
                info.run_state = RunState::Failed;
                warn!(
                    task = %task,
                    run_id = self.run_id,
                    error = %format!("{err:#}"),
                    "task failed; blocking dependents in this run"
                );
                let mut manager =
                    StateManager::new(&self.order, &self.dependents, &mut self.tasks, self.run_id);
                newly_blocked = manager.mark_dependents_blocked(task);
            }
        }

        let run_just_finished = self.maybe_finish_run();

        SchedulerStep {
            newly_scheduled,
            newly_blocked,
            run_just_finished,
        }
    }

    fn maybe_finish_run(&mut self) -> bool {
        if self.finished {
            return false;
        }

        let manager = StateManager::new(&self.order, &self.dependents, &mut self.tasks, self.run_id);
        if manager.all_tasks_terminal() {
            info!(
                task = %self.target,
                run_id = self.run_id,
                "scheduler: all tasks terminal; run finished"
            );
            self.finished = true;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::exec::fn_action;

    fn graph(edges: &[(&str, &[&str])]) -> TaskGraph {
        let mut g = TaskGraph::new();
        for (name, deps) in edges {
            g.register(*name, deps.iter().copied(), fn_action(|_| async { Ok(()) }))
                .unwrap();
        }
        g
    }

    fn names(tasks: &[ScheduledTask]) -> Vec<&str> {
        tasks.iter().map(|t| t.name.as_str()).collect()
    }

    fn failed() -> TaskOutcome {
        TaskOutcome::Failed(Arc::new(anyhow::anyhow!("boom")))
    }

    #[test]
    fn diamond_runs_shared_prerequisite_once() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);
        let mut s = Scheduler::for_target(&g, "d", 1).unwrap();

        assert_eq!(names(&s.start()), ["a"]);
        assert_eq!(names(&s.handle_completion("a", &TaskOutcome::Success)), ["b", "c"]);
        assert!(s.handle_completion("b", &TaskOutcome::Success).is_empty());
        assert_eq!(s.deps_satisfied("d"), Some(false));
        assert_eq!(names(&s.handle_completion("c", &TaskOutcome::Success)), ["d"]);

        let step = s.step_completion("d", &TaskOutcome::Success);
        assert!(step.run_just_finished);
        assert!(s.is_finished());
    }

    #[test]
    fn failure_blocks_transitive_dependents_but_not_siblings() {
        let g = graph(&[
            ("a", &[]),
            ("b", &[]),
            ("c", &["a"]),
            ("d", &["c", "b"]),
        ]);
        let mut s = Scheduler::for_target(&g, "d", 7).unwrap();

        assert_eq!(names(&s.start()), ["a", "b"]);

        let step = s.step_completion("a", &failed());
        assert_eq!(step.newly_blocked.len(), 2);
        assert!(!step.run_just_finished, "b is still running");
        assert_eq!(s.run_state_of("c"), TaskRunState::Blocked);
        assert_eq!(s.run_state_of("d"), TaskRunState::Blocked);
        assert_eq!(s.run_state_of("b"), TaskRunState::Running);

        let step = s.step_completion("b", &TaskOutcome::Success);
        assert!(step.newly_scheduled.is_empty());
        assert!(step.run_just_finished);
        assert_eq!(s.tasks_in_state(TaskRunState::Failed), ["a"]);
    }

    #[test]
    fn unrelated_tasks_are_not_part_of_the_run() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("other", &[])]);
        let s = Scheduler::for_target(&g, "b", 1).unwrap();

        assert_eq!(s.plan(), ["a", "b"]);
        assert_eq!(s.run_state_of("other"), TaskRunState::NotInRun);
        assert_eq!(s.deps_satisfied("other"), None);
    }

    #[test]
    fn stray_completions_are_ignored() {
        let g = graph(&[("a", &[]), ("b", &["a"])]);
        let mut s = Scheduler::for_target(&g, "b", 1).unwrap();
        s.start();

        let step = s.step_completion("b", &TaskOutcome::Success);
        assert!(step.newly_scheduled.is_empty());
        assert_eq!(s.run_state_of("b"), TaskRunState::Pending);
    }
}
