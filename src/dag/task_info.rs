// src/dag/task_info.rs

//! Per-run task state.

use crate::engine::TaskName;

/// Per-run state of a task (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Waiting on prerequisites.
    Pending,
    /// Dispatched to the executor; the action has not resolved yet.
    Running,
    Succeeded,
    Failed,
    /// Never ran because a prerequisite failed.
    Blocked,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::Blocked
        )
    }
}

/// Public, read-only view of a task's state in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    /// The task is not part of this run.
    NotInRun,
    Pending,
    Running,
    Succeeded,
    Failed,
    Blocked,
}

impl From<Option<RunState>> for TaskRunState {
    fn from(state: Option<RunState>) -> Self {
        match state {
            None => TaskRunState::NotInRun,
            Some(RunState::Pending) => TaskRunState::Pending,
            Some(RunState::Running) => TaskRunState::Running,
            Some(RunState::Succeeded) => TaskRunState::Succeeded,
            Some(RunState::Failed) => TaskRunState::Failed,
            Some(RunState::Blocked) => TaskRunState::Blocked,
        }
    }
}

/// A task participating in a run.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    /// Direct prerequisites (all of them are part of the same run).
    pub deps: Vec<TaskName>,
    pub run_state: RunState,
}

impl TaskInfo {
    pub fn new(name: TaskName, deps: Vec<TaskName>) -> Self {
        Self {
            name,
            deps,
            run_state: RunState::Pending,
        }
    }
}

/// A task the scheduler wants the executor to start now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub name: TaskName,
    /// Identifier of the run this task belongs to.
    pub run_id: u64,
}
