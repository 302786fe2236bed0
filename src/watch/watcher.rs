// src/watch/watcher.rs

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::TaskName;
use crate::errors::{PipedagError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::watch::binding::{ChangeHandler, WatchBinding};
use crate::watch::path_utils::relative_str;
use crate::watch::patterns::GlobMatcher;
use crate::watch::worker::{BindingWorker, Member, RoutedChange};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Watches the project root and dispatches changes to bindings.
///
/// Bindings are registered up front; [`FileWatcher::start`] spawns one
/// worker per bound task (and per reload-only binding) plus the notify
/// watcher feeding them.
pub struct FileWatcher {
    root: PathBuf,
    debounce: Duration,
    fs: Arc<dyn FileSystem>,
    handler: Arc<dyn ChangeHandler>,
    bindings: Vec<(WatchBinding, GlobMatcher)>,
}

impl fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileWatcher")
            .field("root", &self.root)
            .field("debounce", &self.debounce)
            .field("bindings", &self.bindings.iter().map(|(b, _)| b).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    pub fn new(root: impl Into<PathBuf>, handler: Arc<dyn ChangeHandler>) -> Self {
        Self {
            root: root.into(),
            debounce: DEFAULT_DEBOUNCE,
            fs: Arc::new(RealFileSystem),
            handler,
            bindings: Vec::new(),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Filesystem used for `use_hash` content hashing.
    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Re-run `task` when a file matching `glob` changes.
    pub fn watch(&mut self, glob: &str, task: impl Into<TaskName>) -> Result<&mut Self> {
        self.bind(WatchBinding::task(glob, task))
    }

    /// Reload connected browsers when a file matching `glob` changes.
    pub fn watch_reload(&mut self, glob: &str) -> Result<&mut Self> {
        self.bind(WatchBinding::reload(glob))
    }

    pub fn bind(&mut self, binding: WatchBinding) -> Result<&mut Self> {
        let matcher = GlobMatcher::new(&[binding.glob.as_str()]).map_err(|e| {
            PipedagError::ConfigError(format!("watch glob '{}': {e:#}", binding.glob))
        })?;
        debug!(binding = %binding.describe(), "registered watch binding");
        self.bindings.push((binding, matcher));
        Ok(self)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &WatchBinding> {
        self.bindings.iter().map(|(b, _)| b)
    }

    /// Bindings whose glob matches a root-relative, `/`-separated path.
    pub fn matching_bindings(&self, rel_path: &str) -> Vec<&WatchBinding> {
        self.bindings
            .iter()
            .filter(|(_, m)| m.is_match(rel_path))
            .map(|(b, _)| b)
            .collect()
    }

    /// Start watching. Must be called from within a tokio runtime.
    ///
    /// Watching stops when the returned handle is dropped.
    pub fn start(self) -> Result<WatcherHandle> {
        let root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());

        let mut routes = Vec::with_capacity(self.bindings.len());
        let mut workers = Vec::new();

        for members in group_by_target(self.bindings) {
            let (tx, rx) = mpsc::unbounded_channel::<RoutedChange>();
            for (index, member) in members.iter().enumerate() {
                routes.push(Route {
                    describe: member.binding.describe(),
                    matcher: member.matcher.clone(),
                    index,
                    tx: tx.clone(),
                });
            }
            let worker = BindingWorker {
                members,
                root: root.clone(),
                debounce: self.debounce,
                fs: Arc::clone(&self.fs),
                handler: Arc::clone(&self.handler),
            };
            debug!(worker = %worker.describe(), "starting watch worker");
            workers.push(worker.spawn(rx));
        }

        // Channel from the blocking notify callback into the async world.
        let (path_tx, mut path_rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = RecommendedWatcher::new(
            {
                let path_tx = path_tx.clone();
                move |res: notify::Result<Event>| match res {
                    Ok(event) => {
                        if !is_content_change(&event.kind) {
                            return;
                        }
                        for path in event.paths {
                            // Receiver gone means the watcher is shutting down.
                            let _ = path_tx.send(path);
                        }
                    }
                    Err(err) => {
                        warn!("file watch error: {err}");
                    }
                }
            },
            Config::default(),
        )
        .map_err(|e| PipedagError::Other(e.into()))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| PipedagError::Other(e.into()))?;

        info!(root = ?root, bindings = routes.len(), "file watcher started");

        let router_root = root.clone();
        workers.push(tokio::spawn(async move {
            while let Some(path) = path_rx.recv().await {
                route_path(&router_root, &routes, &path);
            }
            debug!("watch router finished");
        }));

        Ok(WatcherHandle {
            _watcher: watcher,
            root,
            path_tx,
            tasks: workers,
        })
    }
}

struct Route {
    describe: String,
    matcher: GlobMatcher,
    /// Position of the binding within its worker.
    index: usize,
    tx: mpsc::UnboundedSender<RoutedChange>,
}

/// Bindings that re-run the same task share one worker, so a change seen by
/// several of them still starts a single run. Reload-only bindings keep a
/// worker each.
fn group_by_target(bindings: Vec<(WatchBinding, GlobMatcher)>) -> Vec<Vec<Member>> {
    let mut groups: Vec<Vec<Member>> = Vec::new();
    let mut by_task: HashMap<TaskName, usize> = HashMap::new();

    for (binding, matcher) in bindings {
        let member = Member { binding, matcher };
        let slot = match &member.binding.run {
            Some(task) => by_task.get(task).copied(),
            None => None,
        };
        match slot {
            Some(slot) => groups[slot].push(member),
            None => {
                if let Some(task) = &member.binding.run {
                    by_task.insert(task.clone(), groups.len());
                }
                groups.push(vec![member]);
            }
        }
    }
    groups
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

fn route_path(root: &Path, routes: &[Route], path: &Path) {
    let Some(rel) = relative_str(root, path) else {
        debug!(?path, "change outside the watched root; ignoring");
        return;
    };

    for route in routes.iter().filter(|r| r.matcher.is_match(&rel)) {
        debug!(path = %rel, binding = %route.describe, "watch match");
        if route.tx.send((route.index, path.to_path_buf())).is_err() {
            warn!(binding = %route.describe, "watch worker is gone");
        }
    }
}

/// Handle for a running [`FileWatcher`].
///
/// Keeps the `notify` watcher alive; dropping the handle stops watching and
/// aborts the workers.
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    root: PathBuf,
    path_tx: mpsc::UnboundedSender<PathBuf>,
    tasks: Vec<JoinHandle<()>>,
}

impl fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl WatcherHandle {
    /// The canonicalized root being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Feed a path as if the filesystem had reported a change to it.
    ///
    /// Relative paths are taken relative to the watched root.
    pub fn trigger_path(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let path = if path.is_relative() {
            self.root.join(path)
        } else {
            path.to_path_buf()
        };
        let _ = self.path_tx.send(path);
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::binding::ChangeFuture;

    struct Nop;

    impl ChangeHandler for Nop {
        fn on_change<'a>(&'a self, _: &'a WatchBinding, _: Vec<PathBuf>) -> ChangeFuture<'a> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn bindings_match_independently() {
        let mut w = FileWatcher::new("/project", Arc::new(Nop));
        w.watch("sass/*.scss", "build-css").unwrap();
        w.watch("js/*.js", "build-js").unwrap();
        w.watch_reload("*.html").unwrap();

        let hits = |p: &str| -> Vec<String> {
            w.matching_bindings(p).iter().map(|b| b.describe()).collect()
        };

        assert_eq!(hits("sass/main.scss"), ["sass/*.scss -> build-css"]);
        assert_eq!(hits("js/app.js"), ["js/*.js -> build-js"]);
        assert_eq!(hits("index.html"), ["*.html -> reload"]);
        assert!(hits("build/js/app.min.js").is_empty());
        assert!(hits("sass/nested/deep.scss").is_empty());
    }

    #[test]
    fn invalid_glob_is_a_config_error() {
        let mut w = FileWatcher::new("/project", Arc::new(Nop));
        assert!(matches!(w.watch("sass/[", "x"), Err(PipedagError::ConfigError(_))));
    }

    #[test]
    fn bindings_sharing_a_task_share_a_worker() {
        let binding = |b: WatchBinding| {
            let matcher = GlobMatcher::new(&[b.glob.as_str()]).unwrap();
            (b, matcher)
        };
        let groups = group_by_target(vec![
            binding(WatchBinding::task("sass/*.scss", "build-css")),
            binding(WatchBinding::reload("*.html")),
            binding(WatchBinding::task("sass/**/*.scss", "build-css")),
            binding(WatchBinding::task("js/*.js", "build-js")),
            binding(WatchBinding::reload("img/*")),
        ]);

        let globs: Vec<Vec<&str>> = groups
            .iter()
            .map(|g| g.iter().map(|m| m.binding.glob.as_str()).collect())
            .collect();
        assert_eq!(
            globs,
            vec![
                vec!["sass/*.scss", "sass/**/*.scss"],
                vec!["*.html"],
                vec!["js/*.js"],
                vec!["img/*"],
            ]
        );
    }

    #[test]
    fn only_content_events_count() {
        use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};

        assert!(is_content_change(&EventKind::Create(CreateKind::File)));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_content_change(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_content_change(&EventKind::Access(AccessKind::Any)));
        assert!(!is_content_change(&EventKind::Other));
    }
}
