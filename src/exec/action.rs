// src/exec/action.rs

//! The unit of work attached to a task.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::dag::TaskGraph;
use crate::engine::TaskName;

/// Boxed future returned by [`TaskAction::run`].
pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// What an action gets to know about the run it belongs to.
#[derive(Clone)]
pub struct ActionContext {
    pub task: TaskName,
    pub run_id: u64,
    /// The graph the task was run from, so long-lived actions (watchers) can
    /// start runs of their own.
    pub graph: Arc<TaskGraph>,
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("task", &self.task)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

/// A task's action. The task is finished when the returned future resolves.
pub trait TaskAction: Send + Sync {
    fn run(&self, ctx: ActionContext) -> ActionFuture<'_>;
}

/// Adapter turning an async closure into a [`TaskAction`].
pub struct FnAction<F>(F);

impl<F, Fut> TaskAction for FnAction<F>
where
    F: Fn(ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn run(&self, ctx: ActionContext) -> ActionFuture<'_> {
        Box::pin((self.0)(ctx))
    }
}

/// Wrap an async closure as a task action.
///
/// ```rust,ignore
/// graph.register("hello", Vec::<String>::new(), fn_action(|ctx| async move {
///     tracing::info!(task = %ctx.task, "hello");
///     Ok(())
/// }))?;
/// ```
pub fn fn_action<F, Fut>(f: F) -> FnAction<F>
where
    F: Fn(ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnAction(f)
}
