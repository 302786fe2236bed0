// src/dag/mod.rs

//! Task graph and per-run scheduling.
//!
//! - [`graph`] holds named tasks, their prerequisites and their actions.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which tasks are ready to run, and which are blocked by a failure.
//! - [`task_info`] provides per-run task state and scheduled task types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::TaskGraph;
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use task_info::{ScheduledTask, TaskRunState};
