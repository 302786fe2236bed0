// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::sync::Arc;

use crate::dag::{ScheduledTask, Scheduler, TaskRunState};
use crate::engine::{TaskName, TaskOutcome};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Every task in the run is terminal.
    Finish,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep waiting for events.
    pub keep_running: bool,
}

/// Seed a fresh run with its tasks that have no prerequisites.
pub fn handle_run_start(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.step_start();
    let mut commands = Vec::new();

    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }

    finish_if_done(scheduler, commands)
}

/// Handle a task completion event.
///
/// Failures of running tasks are recorded in `failures` (completion order);
/// the scheduler blocks the failed task's dependents. Stray completions
/// change nothing.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    failures: &mut Vec<(TaskName, Arc<anyhow::Error>)>,
    task: TaskName,
    outcome: TaskOutcome,
) -> CoreStep {
    let was_running = scheduler.run_state_of(&task) == TaskRunState::Running;
    let step = scheduler.step_completion(&task, &outcome);
    let mut commands = Vec::new();

    if let (true, TaskOutcome::Failed(err)) = (was_running, outcome) {
        failures.push((task, err));
    }

    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }

    finish_if_done(scheduler, commands)
}

fn finish_if_done(scheduler: &Scheduler, mut commands: Vec<CoreCommand>) -> CoreStep {
    let keep_running = !scheduler.is_finished();
    if !keep_running {
        commands.push(CoreCommand::Finish);
    }

    CoreStep {
        commands,
        keep_running,
    }
}
