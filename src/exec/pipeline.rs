// src/exec/pipeline.rs

//! Configured tasks: ordered plugin steps, plus the optional long-lived
//! parts (dev server, watch bindings).

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{OnceCell, watch};
use tracing::{debug, info};

use crate::config::{ConfigFile, ServerSection, StepConfig, TaskConfig};
use crate::dag::TaskGraph;
use crate::errors::{PipedagError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::plugin::{Flags, PluginInput, PluginOutput, PluginRegistry, TransformPlugin};
use crate::server::{DevServer, DevServerHandle};
use crate::watch::{
    ChangeFuture, ChangeHandler, DEFAULT_DEBOUNCE, FileWatcher, GlobMatcher, WatchBinding,
    WatcherHandle, collect_matching_files,
};

use super::action::{ActionContext, ActionFuture, TaskAction};

/// Everything the configured tasks of one process share.
pub struct Workspace {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    plugins: PluginRegistry,
    flags: Arc<Flags>,
    server: ServerSection,
    debounce: Duration,
    dev_server: OnceCell<DevServerHandle>,
    shutdown_tx: watch::Sender<bool>,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("root", &self.root)
            .field("plugins", &self.plugins)
            .field("flags", &self.flags)
            .field("server", &self.server)
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            root: root.into(),
            fs: Arc::new(RealFileSystem),
            plugins: PluginRegistry::with_builtins(),
            flags: Arc::new(Flags::new()),
            server: ServerSection::default(),
            debounce: DEFAULT_DEBOUNCE,
            dev_server: OnceCell::new(),
            shutdown_tx,
        }
    }

    /// Workspace for a loaded configuration file.
    pub fn from_config(cfg: &ConfigFile, root: impl Into<PathBuf>, flags: Flags) -> Self {
        Self::new(root)
            .with_flags(flags)
            .with_server(cfg.server().clone())
            .with_debounce(Duration::from_millis(cfg.watch_section().debounce_ms))
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = Arc::new(flags);
        self
    }

    pub fn with_server(mut self, server: ServerSection) -> Self {
        self.server = server;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    /// The running dev server, if a `serve` task started one.
    pub fn dev_server(&self) -> Option<&DevServerHandle> {
        self.dev_server.get()
    }

    /// Start the dev server once; later calls return the same handle.
    pub async fn ensure_dev_server(&self) -> Result<DevServerHandle> {
        let handle = self
            .dev_server
            .get_or_try_init(|| async {
                let root = self.root.join(&self.server.root);
                DevServer::start(root, &self.server.host, self.server.port).await
            })
            .await?;
        Ok(handle.clone())
    }

    /// Release every long-lived task (servers, watchers) waiting for Ctrl-C.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    async fn wait_for_shutdown(&self) -> anyhow::Result<()> {
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("listening for Ctrl-C"),
            _ = stop_requested(self.shutdown_tx.subscribe()) => Ok(()),
        }
    }
}

async fn stop_requested(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// A step with its plugin resolved and its globs compiled.
struct PreparedStep {
    config: StepConfig,
    plugin: Arc<dyn TransformPlugin>,
    matcher: Option<GlobMatcher>,
}

/// The action of a configured task.
pub struct PipelineAction {
    task: String,
    steps: Vec<PreparedStep>,
    reload: bool,
    serve: bool,
    watch: Vec<WatchBinding>,
    ws: Arc<Workspace>,
}

impl fmt::Debug for PipelineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineAction")
            .field("task", &self.task)
            .field("steps", &self.steps.iter().map(|s| &s.config.plugin).collect::<Vec<_>>())
            .field("reload", &self.reload)
            .field("serve", &self.serve)
            .field("watch", &self.watch)
            .finish_non_exhaustive()
    }
}

impl PipelineAction {
    /// Prepare a task's action. Fails on unknown plugins and invalid globs.
    pub fn from_config(name: &str, cfg: &TaskConfig, ws: Arc<Workspace>) -> Result<Self> {
        let mut steps = Vec::with_capacity(cfg.steps.len());
        for step in &cfg.steps {
            let plugin = ws.plugins.get(&step.plugin).ok_or_else(|| {
                PipedagError::ConfigError(format!(
                    "task '{name}': unknown plugin '{}' (known: {})",
                    step.plugin,
                    ws.plugins.names().collect::<Vec<_>>().join(", ")
                ))
            })?;

            let matcher = if step.src.is_empty() {
                None
            } else {
                Some(GlobMatcher::new(&step.src).map_err(|e| {
                    PipedagError::ConfigError(format!("task '{name}': {e:#}"))
                })?)
            };

            steps.push(PreparedStep {
                config: step.clone(),
                plugin,
                matcher,
            });
        }

        let watch = cfg
            .watch
            .iter()
            .map(|w| WatchBinding {
                glob: w.glob.clone(),
                run: w.run.clone(),
                reload: w.reload,
                use_hash: w.use_hash,
            })
            .collect();

        Ok(Self {
            task: name.to_string(),
            steps,
            reload: cfg.reload,
            serve: cfg.serve,
            watch,
            ws,
        })
    }

    async fn run_step(&self, step: &PreparedStep) -> Result<PluginOutput> {
        let ws = &self.ws;
        let inputs = match &step.matcher {
            Some(matcher) => collect_matching_files(ws.fs.as_ref(), &ws.root, matcher)?,
            None => Vec::new(),
        };

        debug!(
            task = %self.task,
            plugin = %step.config.plugin,
            inputs = inputs.len(),
            "running step"
        );

        let input = PluginInput {
            task: self.task.clone(),
            root: ws.root.clone(),
            inputs,
            dest: step.config.dest.as_ref().map(|d| ws.root.join(d)),
            options: step.config.options.clone(),
            flags: Arc::clone(&ws.flags),
            fs: Arc::clone(&ws.fs),
        };

        step.plugin
            .run(input)
            .await
            .map_err(|source| PipedagError::Plugin {
                plugin: step.config.plugin.clone(),
                source,
            })
    }

    fn start_watcher(&self, graph: Arc<TaskGraph>) -> Result<WatcherHandle> {
        let handler = Arc::new(RerunHandler {
            graph,
            ws: Arc::clone(&self.ws),
        });
        let mut watcher = FileWatcher::new(self.ws.root.clone(), handler)
            .with_debounce(self.ws.debounce)
            .with_fs(Arc::clone(&self.ws.fs));
        for binding in &self.watch {
            watcher.bind(binding.clone())?;
        }
        watcher.start()
    }
}

impl TaskAction for PipelineAction {
    fn run(&self, ctx: ActionContext) -> ActionFuture<'_> {
        Box::pin(async move {
            let mut written = Vec::new();
            for (i, step) in self.steps.iter().enumerate() {
                let output = self
                    .run_step(step)
                    .await
                    .with_context(|| format!("step {} ({})", i + 1, step.config.plugin))?;
                written.extend(output.written);
            }

            if self.reload && !written.is_empty() {
                if let Some(server) = self.ws.dev_server() {
                    server.notify_reload(&written);
                }
            }

            if !self.serve && self.watch.is_empty() {
                return Ok(());
            }

            let server = if self.serve {
                let server = self.ws.ensure_dev_server().await?;
                info!(task = %self.task, url = %server.url(), "serving");
                Some(server)
            } else {
                None
            };

            let watcher = if self.watch.is_empty() {
                None
            } else {
                Some(self.start_watcher(Arc::clone(&ctx.graph))?)
            };

            info!(task = %self.task, "running until Ctrl-C");
            self.ws.wait_for_shutdown().await?;
            info!(task = %self.task, "shutting down");

            drop(watcher);
            drop(server);
            Ok(())
        })
    }
}

/// Watch handler for configured bindings: re-run the bound task, then push
/// a reload to the dev server.
struct RerunHandler {
    graph: Arc<TaskGraph>,
    ws: Arc<Workspace>,
}

impl ChangeHandler for RerunHandler {
    fn on_change<'a>(&'a self, binding: &'a WatchBinding, paths: Vec<PathBuf>) -> ChangeFuture<'a> {
        Box::pin(async move {
            if let Some(task) = &binding.run {
                info!(task = %task, changed = paths.len(), "change detected; re-running");
                self.graph.run(task).await?.into_result()?;
            }

            if binding.reload {
                match self.ws.dev_server() {
                    Some(server) => {
                        server.notify_reload(&paths);
                    }
                    None => debug!(glob = %binding.glob, "no dev server running; skipping reload"),
                }
            }

            Ok(())
        })
    }
}

/// Build the task graph for a configuration file, every task backed by a
/// [`PipelineAction`], and validate it.
pub fn build_task_graph(cfg: &ConfigFile, ws: Arc<Workspace>) -> Result<TaskGraph> {
    let mut graph = TaskGraph::new();
    for (name, task) in cfg.tasks() {
        let action = PipelineAction::from_config(name, task, Arc::clone(&ws))?;
        graph.register(name.clone(), task.after.iter().cloned(), action)?;
    }
    graph.validate()?;
    Ok(graph)
}
