// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::ScheduledTask;
use crate::engine::TaskName;

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step a run and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became ready to run as a result of this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks that were newly blocked by a failed prerequisite in this step.
    pub newly_blocked: Vec<TaskName>,
    /// Whether this step caused the run to finish.
    pub run_just_finished: bool,
}

impl SchedulerStep {
    pub(crate) fn empty() -> Self {
        Self::default()
    }
}
