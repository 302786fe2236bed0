// src/dag/graph.rs

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::engine::{RunReport, TaskName};
use crate::errors::{PipedagError, Result};
use crate::exec::TaskAction;

/// A registered task: direct prerequisites plus the action to run.
struct TaskNode {
    deps: Vec<TaskName>,
    action: Arc<dyn TaskAction>,
}

/// Named tasks, their prerequisites and their actions.
///
/// Registration accepts forward references (a prerequisite may be registered
/// later); [`TaskGraph::validate`] checks the finished graph and
/// [`TaskGraph::resolve`] re-checks the part a run actually needs.
#[derive(Default)]
pub struct TaskGraph {
    nodes: BTreeMap<TaskName, TaskNode>,
    /// Reverse edges: prerequisite -> tasks that list it in `after`.
    dependents: BTreeMap<TaskName, Vec<TaskName>>,
}

impl fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deps: BTreeMap<&str, &[TaskName]> = self
            .nodes
            .iter()
            .map(|(name, node)| (name.as_str(), node.deps.as_slice()))
            .collect();
        f.debug_struct("TaskGraph").field("tasks", &deps).finish()
    }
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Fails if the name is already taken.
    pub fn register<N, I, D, A>(&mut self, name: N, prerequisites: I, action: A) -> Result<()>
    where
        N: Into<TaskName>,
        I: IntoIterator<Item = D>,
        D: Into<TaskName>,
        A: TaskAction + 'static,
    {
        self.register_arc(name, prerequisites, Arc::new(action))
    }

    /// Like [`TaskGraph::register`], for an action that is already shared.
    pub fn register_arc<N, I, D>(
        &mut self,
        name: N,
        prerequisites: I,
        action: Arc<dyn TaskAction>,
    ) -> Result<()>
    where
        N: Into<TaskName>,
        I: IntoIterator<Item = D>,
        D: Into<TaskName>,
    {
        let name = name.into();
        if self.nodes.contains_key(&name) {
            return Err(PipedagError::ConfigError(format!(
                "task '{name}' is registered twice"
            )));
        }

        let mut deps: Vec<TaskName> = Vec::new();
        for dep in prerequisites {
            let dep = dep.into();
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }

        for dep in &deps {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .push(name.clone());
        }

        debug!(task = %name, ?deps, "registered task");
        self.nodes.insert(name, TaskNode { deps, action });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All task names, sorted.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Immediate prerequisites of a task, in declaration order.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks that list `name` as a prerequisite.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.dependents
            .get(name)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn action_of(&self, name: &str) -> Option<Arc<dyn TaskAction>> {
        self.nodes.get(name).map(|n| Arc::clone(&n.action))
    }

    /// Check the whole graph: every prerequisite is registered and there are
    /// no cycles.
    pub fn validate(&self) -> Result<()> {
        for (name, node) in &self.nodes {
            for dep in &node.deps {
                if !self.nodes.contains_key(dep) {
                    return Err(PipedagError::UnknownTask(format!(
                        "{dep} (prerequisite of '{name}')"
                    )));
                }
            }
        }

        // Edge direction: prerequisite -> dependent.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }
        for (name, node) in &self.nodes {
            for dep in &node.deps {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => {
                // Resolve from the offending node to report the actual path.
                match self.resolve(cycle.node_id()) {
                    Err(e @ PipedagError::CyclicDependency(_)) => Err(e),
                    _ => Err(PipedagError::CyclicDependency(format!(
                        "cycle detected in task graph involving task '{}'",
                        cycle.node_id()
                    ))),
                }
            }
        }
    }

    /// Depth-first resolution of `target` and all of its prerequisites.
    ///
    /// Returns every task the run needs exactly once, prerequisites before
    /// the tasks depending on them, `target` last.
    pub fn resolve(&self, target: &str) -> Result<Vec<TaskName>> {
        if !self.nodes.contains_key(target) {
            return Err(PipedagError::UnknownTask(target.to_string()));
        }

        let mut order = Vec::new();
        let mut done: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();
        self.visit(target, &mut stack, &mut done, &mut order)?;
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        stack: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
        order: &mut Vec<TaskName>,
    ) -> Result<()> {
        if done.contains(name) {
            return Ok(());
        }

        if let Some(pos) = stack.iter().position(|s| *s == name) {
            let mut path: Vec<&str> = stack[pos..].to_vec();
            path.push(name);
            return Err(PipedagError::CyclicDependency(path.join(" -> ")));
        }

        let node = match self.nodes.get(name) {
            Some(node) => node,
            None => {
                let parent = stack.last().copied().unwrap_or("?");
                return Err(PipedagError::UnknownTask(format!(
                    "{name} (prerequisite of '{parent}')"
                )));
            }
        };

        stack.push(name);
        for dep in &node.deps {
            self.visit(dep, stack, done, order)?;
        }
        stack.pop();

        done.insert(name);
        order.push(name.to_string());
        Ok(())
    }

    /// Run `name` after all of its prerequisites.
    ///
    /// Shared prerequisites run once, independent prerequisites run
    /// concurrently, and a failed prerequisite keeps every task depending on
    /// it from running. Unknown names and cycles are reported before any
    /// action starts.
    pub async fn run(self: &Arc<Self>, name: &str) -> Result<RunReport> {
        crate::engine::run_to_completion(Arc::clone(self), name).await
    }
}
