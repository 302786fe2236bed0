#![allow(dead_code)]

//! Recording actions and change handlers for graph and watcher tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use pipedag::dag::TaskGraph;
use pipedag::exec::{TaskAction, fn_action};
use pipedag::watch::{ChangeFuture, ChangeHandler, WatchBinding};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start(String),
    End(String),
}

/// Shared log of action starts and ends, in the order they happened.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Names of the tasks that started, in start order.
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Start(name) => Some(name),
                Event::End(_) => None,
            })
            .collect()
    }

    pub fn count_started(&self, name: &str) -> usize {
        self.started().iter().filter(|n| *n == name).count()
    }

    /// Position of an event in the log.
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    /// An action that records its start, yields briefly, then records its end.
    pub fn action(&self, name: &str) -> impl TaskAction + 'static {
        self.timed_action(name, Duration::from_millis(5), false)
    }

    /// Like [`Recorder::action`] but the action returns an error.
    pub fn failing_action(&self, name: &str) -> impl TaskAction + 'static {
        self.timed_action(name, Duration::from_millis(5), true)
    }

    pub fn timed_action(&self, name: &str, delay: Duration, fail: bool) -> impl TaskAction + 'static {
        let events = Arc::clone(&self.events);
        let name = name.to_string();
        fn_action(move |_ctx| {
            let events = Arc::clone(&events);
            let name = name.clone();
            async move {
                events.lock().unwrap().push(Event::Start(name.clone()));
                tokio::time::sleep(delay).await;
                events.lock().unwrap().push(Event::End(name.clone()));
                if fail {
                    anyhow::bail!("{name} exploded");
                }
                Ok(())
            }
        })
    }

    /// Build a graph from `(name, prerequisites)` pairs, every task backed by
    /// a recording action.
    pub fn graph(&self, tasks: &[(&str, &[&str])]) -> TaskGraph {
        let mut graph = TaskGraph::new();
        for (name, deps) in tasks {
            graph
                .register(*name, deps.iter().copied(), self.action(name))
                .expect("register task");
        }
        graph
    }
}

/// Change handler that forwards every batch to a channel.
pub struct RecordingChangeHandler {
    tx: mpsc::UnboundedSender<(WatchBinding, Vec<PathBuf>)>,
}

impl RecordingChangeHandler {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(WatchBinding, Vec<PathBuf>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl ChangeHandler for RecordingChangeHandler {
    fn on_change<'a>(&'a self, binding: &'a WatchBinding, paths: Vec<PathBuf>) -> ChangeFuture<'a> {
        Box::pin(async move {
            let _ = self.tx.send((binding.clone(), paths));
            Ok(())
        })
    }
}

/// Change handler that takes `delay` per batch and tracks how many batches
/// overlap.
#[derive(Debug)]
pub struct SlowChangeHandler {
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowChangeHandler {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ChangeHandler for SlowChangeHandler {
    fn on_change<'a>(&'a self, _binding: &'a WatchBinding, _paths: Vec<PathBuf>) -> ChangeFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
