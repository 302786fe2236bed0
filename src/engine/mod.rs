// src/engine/mod.rs

//! Run engine for pipedag.
//!
//! One call to [`run_to_completion`] is one invocation of a target task:
//! - the target is resolved into a [`Scheduler`](crate::dag::Scheduler)
//!   (unknown names and cycles fail here, before anything runs);
//! - the event loop in [`runtime`] dispatches ready tasks to an executor and
//!   reacts to their completion events;
//! - the pure state machine in [`core`] decides what happens next.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::info;

use crate::dag::{Scheduler, TaskGraph};
use crate::errors::{PipedagError, Result};
use crate::exec::ActionExecutor;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Outcome of a task action for the scheduler.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Success,
    Failed(Arc<anyhow::Error>),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }
}

/// Events flowing into the runtime from the executor.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A task action resolved with a concrete outcome.
    TaskCompleted { task: TaskName, outcome: TaskOutcome },
}

/// Summary of one finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub target: TaskName,
    pub run_id: u64,
    /// Tasks that succeeded, in completion order.
    pub succeeded: Vec<TaskName>,
    /// Tasks whose action failed, in completion order.
    pub failed: Vec<(TaskName, Arc<anyhow::Error>)>,
    /// Tasks that never ran because a prerequisite failed.
    pub blocked: Vec<TaskName>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }

    /// Turn a failed run into `TaskFailed`, naming the first task that failed.
    pub fn into_result(self) -> Result<RunReport> {
        match self.failed.first() {
            Some((task, cause)) => Err(PipedagError::TaskFailed {
                task: task.clone(),
                cause: Arc::clone(cause),
            }),
            None => Ok(self),
        }
    }
}

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_run_id() -> u64 {
    RUN_COUNTER.fetch_add(1, Ordering::Relaxed) + 1
}

/// Run `target` and everything it depends on, returning once every task in
/// the run is terminal.
///
/// The returned report may describe a failed run; use
/// [`RunReport::into_result`] to turn that into an error.
pub async fn run_to_completion(graph: Arc<TaskGraph>, target: &str) -> Result<RunReport> {
    let run_id = next_run_id();
    let scheduler = Scheduler::for_target(&graph, target, run_id)?;

    info!(task = %target, run_id, tasks = scheduler.plan().len(), "starting run");

    let (event_tx, event_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = ActionExecutor::new(graph, event_tx);
    let runtime = Runtime::new(CoreRuntime::new(scheduler), event_rx, executor);

    runtime.run().await
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
