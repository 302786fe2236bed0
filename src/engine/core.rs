// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) reads events from the
//! channel and hands `ScheduledTask`s to the executor. The core itself can be
//! unit tested without Tokio or any real action.

use std::sync::Arc;

use crate::dag::{Scheduler, TaskRunState};
use crate::engine::event_handlers::{CoreStep, handle_run_start, handle_task_completion};
use crate::engine::{RunReport, RuntimeEvent, TaskName};

/// Pure core runtime state for a single run.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    failures: Vec<(TaskName, Arc<anyhow::Error>)>,
    succeeded: Vec<TaskName>,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            failures: Vec::new(),
            succeeded: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Dispatch the tasks without prerequisites.
    pub fn start(&mut self) -> CoreStep {
        handle_run_start(&mut self.scheduler)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskCompleted { task, outcome } => {
                let was_running = self.scheduler.run_state_of(&task) == TaskRunState::Running;
                if was_running && outcome.is_success() {
                    self.succeeded.push(task.clone());
                }
                handle_task_completion(&mut self.scheduler, &mut self.failures, task, outcome)
            }
        }
    }

    pub fn into_report(self) -> RunReport {
        RunReport {
            target: self.scheduler.target().to_string(),
            run_id: self.scheduler.run_id(),
            succeeded: self.succeeded,
            failed: self.failures,
            blocked: self.scheduler.tasks_in_state(TaskRunState::Blocked),
        }
    }
}
