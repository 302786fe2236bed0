// src/watch/worker.rs

//! Per-target worker: debounces and merges change events for every binding
//! that shares a `run` task, and runs the handler for at most one batch at a
//! time.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::fs::FileSystem;
use crate::watch::binding::{ChangeHandler, WatchBinding};
use crate::watch::hash::compute_hash_for_paths;
use crate::watch::patterns::{GlobMatcher, collect_matching_files};

/// A change routed to a worker: which member binding matched, and the path.
pub(crate) type RoutedChange = (usize, PathBuf);

pub(crate) struct Member {
    pub binding: WatchBinding,
    pub matcher: GlobMatcher,
}

pub(crate) struct BindingWorker {
    pub members: Vec<Member>,
    pub root: PathBuf,
    pub debounce: Duration,
    pub fs: Arc<dyn FileSystem>,
    pub handler: Arc<dyn ChangeHandler>,
}

impl BindingWorker {
    pub fn describe(&self) -> String {
        describe_members(&self.members)
    }

    /// Spawn the worker loop. It ends when every sender of `rx` is dropped.
    pub fn spawn(self, mut rx: mpsc::UnboundedReceiver<RoutedChange>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let label = self.describe();

            let mut last_hashes = Vec::with_capacity(self.members.len());
            for member in &self.members {
                last_hashes.push(if member.binding.use_hash {
                    self.content_hash(member).await
                } else {
                    None
                });
            }

            // Events that arrive while the handler runs wait in `rx`; the next
            // iteration merges all of them into a single follow-up batch.
            while let Some(first) = rx.recv().await {
                let mut changed: BTreeMap<usize, BTreeSet<PathBuf>> = BTreeMap::new();
                let (idx, path) = first;
                changed.entry(idx).or_default().insert(path);

                if !self.debounce.is_zero() {
                    tokio::time::sleep(self.debounce).await;
                }
                while let Ok((idx, path)) = rx.try_recv() {
                    changed.entry(idx).or_default().insert(path);
                }

                let mut fired = Vec::new();
                let mut paths = BTreeSet::new();
                for (idx, member_paths) in changed {
                    let Some(member) = self.members.get(idx) else {
                        continue;
                    };
                    if member.binding.use_hash {
                        let hash = self.content_hash(member).await;
                        if hash.is_some() && hash == last_hashes[idx] {
                            info!(
                                binding = %member.binding.describe(),
                                "watched content unchanged; skipping"
                            );
                            continue;
                        }
                        last_hashes[idx] = hash;
                    }
                    fired.push(&member.binding);
                    paths.extend(member_paths);
                }

                let Some(binding) = merge_bindings(&fired) else {
                    continue;
                };
                let paths: Vec<PathBuf> = paths.into_iter().collect();
                debug!(binding = %label, ?paths, "change batch");

                if let Err(err) = self.handler.on_change(&binding, paths).await {
                    warn!(
                        binding = %label,
                        error = %format!("{err:#}"),
                        "change handler failed; still watching"
                    );
                }
            }

            debug!(binding = %label, "watch worker finished");
        })
    }

    /// Hash over every file the member's glob currently matches.
    async fn content_hash(&self, member: &Member) -> Option<String> {
        let fs = Arc::clone(&self.fs);
        let root = self.root.clone();
        let matcher = member.matcher.clone();

        let result = tokio::task::spawn_blocking(move || {
            let files = collect_matching_files(fs.as_ref(), &root, &matcher)?;
            compute_hash_for_paths(fs.as_ref(), &files)
        })
        .await;

        match result {
            Ok(Ok(hash)) => Some(hash),
            Ok(Err(err)) => {
                warn!(binding = %member.binding.describe(), error = %format!("{err:#}"), "hashing watched files failed");
                None
            }
            Err(err) => {
                warn!(binding = %member.binding.describe(), error = %err, "hashing task panicked");
                None
            }
        }
    }
}

fn describe_members(members: &[Member]) -> String {
    let bindings: Vec<&WatchBinding> = members.iter().map(|m| &m.binding).collect();
    match merge_bindings(&bindings) {
        Some(binding) => binding.describe(),
        None => "nothing".to_string(),
    }
}

/// One binding standing for every member that fired in a batch.
///
/// Globs are joined with ` | `; `reload` and `use_hash` hold if any member
/// set them. Members of a worker always share `run`.
fn merge_bindings(fired: &[&WatchBinding]) -> Option<WatchBinding> {
    let (first, rest) = fired.split_first()?;
    let mut merged = (*first).clone();
    for binding in rest {
        merged.glob.push_str(" | ");
        merged.glob.push_str(&binding.glob);
        merged.reload |= binding.reload;
        merged.use_hash |= binding.use_hash;
    }
    Some(merged)
}
