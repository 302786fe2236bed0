// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`action`] defines what a task does ([`TaskAction`]) and an adapter for
//!   plain async closures.
//! - [`backend`] provides the `ExecutorBackend` trait and the
//!   [`ActionExecutor`] the engine uses in production, which tests can
//!   replace with a fake implementation.
//! - [`pipeline`] builds actions out of configured plugin steps, and the
//!   task graph out of a whole configuration file.

pub mod action;
pub mod backend;
pub mod pipeline;

pub use action::{ActionContext, ActionFuture, FnAction, TaskAction, fn_action};
pub use backend::{ActionExecutor, ExecutorBackend};
pub use pipeline::{PipelineAction, Workspace, build_task_graph};
