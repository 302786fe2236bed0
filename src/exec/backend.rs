// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning actions
//! itself. Production code uses [`ActionExecutor`]; tests can provide their
//! own backend that records which tasks were scheduled and emits
//! `TaskCompleted` events directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::dag::{ScheduledTask, TaskGraph};
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::errors::{PipedagError, Result};

use super::action::ActionContext;

/// Trait abstracting how scheduled tasks are executed.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    ///
    /// Every dispatched task must eventually produce exactly one
    /// `RuntimeEvent::TaskCompleted`.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Runs each scheduled task's action in its own tokio task.
pub struct ActionExecutor {
    graph: Arc<TaskGraph>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl ActionExecutor {
    pub fn new(graph: Arc<TaskGraph>, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { graph, runtime_tx }
    }
}

impl ExecutorBackend for ActionExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for task in tasks {
                let action = self.graph.action_of(&task.name).ok_or_else(|| {
                    PipedagError::UnknownTask(task.name.clone())
                })?;

                let ctx = ActionContext {
                    task: task.name.clone(),
                    run_id: task.run_id,
                    graph: Arc::clone(&self.graph),
                };
                let tx = self.runtime_tx.clone();

                tokio::spawn(async move {
                    let name = task.name;
                    let started = Instant::now();
                    info!(task = %name, run_id = task.run_id, "starting task");

                    // A nested spawn so a panicking action surfaces as a JoinError.
                    let joined = tokio::spawn(async move { action.run(ctx).await }).await;

                    let outcome = match joined {
                        Ok(Ok(())) => {
                            info!(
                                task = %name,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "finished task"
                            );
                            TaskOutcome::Success
                        }
                        Ok(Err(err)) => {
                            let chain = format!("{err:#}");
                            error!(
                                task = %name,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                error = %chain,
                                "task failed"
                            );
                            TaskOutcome::Failed(Arc::new(err))
                        }
                        Err(join_err) => {
                            error!(task = %name, error = %join_err, "task panicked");
                            TaskOutcome::Failed(Arc::new(anyhow::anyhow!(
                                "task '{name}' panicked: {join_err}"
                            )))
                        }
                    };

                    if tx
                        .send(RuntimeEvent::TaskCompleted {
                            task: name.clone(),
                            outcome,
                        })
                        .await
                        .is_err()
                    {
                        warn!(task = %name, "runtime is gone; dropping completion event");
                    }
                });
            }
            Ok(())
        })
    }
}
