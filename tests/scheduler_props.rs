// tests/scheduler_props.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use proptest::prelude::*;

use pipedag::dag::{Scheduler, TaskGraph, TaskRunState};
use pipedag::engine::TaskOutcome;
use pipedag_test_utils::recorder::Recorder;

/// Random DAG: task N may only depend on tasks 0..N, so it is acyclic.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, deps)| {
                    let set: HashSet<usize> = deps
                        .into_iter()
                        .filter(|_| i > 0)
                        .map(|d| d % i.max(1))
                        .collect();
                    set.into_iter().collect()
                })
                .collect()
        })
    })
}

fn name(i: usize) -> String {
    format!("task_{i}")
}

fn build_graph(deps: &[Vec<usize>]) -> (TaskGraph, HashMap<String, Vec<String>>) {
    let rec = Recorder::new();
    let mut graph = TaskGraph::new();
    let mut edges = HashMap::new();
    for (i, ds) in deps.iter().enumerate() {
        let ds: Vec<String> = ds.iter().map(|d| name(*d)).collect();
        graph
            .register(name(i), ds.clone(), rec.action(&name(i)))
            .unwrap();
        edges.insert(name(i), ds);
    }
    (graph, edges)
}

proptest! {
    /// Simulated runs always terminate, run each task at most once, never
    /// start a task before its prerequisites succeeded, and never start a
    /// task downstream of a failure.
    #[test]
    fn scheduler_runs_respect_dependencies(
        deps in dag_strategy(10),
        target_idx in 0..10usize,
        failing_idx in proptest::collection::vec(0..10usize, 0..3),
        pick in proptest::collection::vec(any::<usize>(), 64),
    ) {
        let (graph, edges) = build_graph(&deps);
        let target = name(target_idx % deps.len());
        let failing: HashSet<String> = failing_idx.iter().map(|i| name(i % deps.len())).collect();

        let graph = Arc::new(graph);
        let mut scheduler = Scheduler::for_target(&graph, &target, 1).unwrap();
        let in_run: HashSet<String> = scheduler.plan().iter().cloned().collect();

        let mut running: Vec<String> = scheduler.start().into_iter().map(|t| t.name).collect();
        let mut started: Vec<String> = running.clone();
        let mut succeeded: HashSet<String> = HashSet::new();
        let mut failed: HashSet<String> = HashSet::new();

        let mut steps = 0;
        while !running.is_empty() {
            steps += 1;
            prop_assert!(steps <= 100, "simulation did not terminate");

            // Complete tasks in an arbitrary order.
            let idx = pick[steps % pick.len()] % running.len();
            let task = running.remove(idx);

            let outcome = if failing.contains(&task) {
                failed.insert(task.clone());
                TaskOutcome::Failed(Arc::new(anyhow::anyhow!("fail")))
            } else {
                succeeded.insert(task.clone());
                TaskOutcome::Success
            };

            for next in scheduler.handle_completion(&task, &outcome) {
                for dep in &edges[&next.name] {
                    prop_assert!(succeeded.contains(dep), "{} started before {}", next.name, dep);
                }
                prop_assert!(!started.contains(&next.name), "{} started twice", next.name);
                started.push(next.name.clone());
                running.push(next.name);
            }
        }

        prop_assert!(scheduler.is_finished());
        prop_assert!(started.iter().all(|t| in_run.contains(t)));

        // Every task in the run is either done or blocked.
        for task in &in_run {
            let state = scheduler.run_state_of(task);
            prop_assert!(
                matches!(state, TaskRunState::Succeeded | TaskRunState::Failed | TaskRunState::Blocked),
                "{} ended in {:?}", task, state
            );
        }

        if failed.is_empty() {
            prop_assert_eq!(started.len(), in_run.len());
            prop_assert_eq!(scheduler.run_state_of(&target), TaskRunState::Succeeded);
        }
    }
}
