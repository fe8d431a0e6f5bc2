//! Explicit task graph execution
//!
//! Replaces the host build framework's task engine with a directed acyclic
//! graph of typed nodes: declared dependency edges, a pure skip predicate
//! evaluated at execution time, and an async action. Nodes are registered at
//! configuration time and executed at most once per invocation.
//!
//! Lifecycle per node: `Registered -> {Skipped | Executing -> {Succeeded |
//! Failed}}`. A node is `Skipped` when its predicate reports it up to date; a
//! `Failed` node aborts all of its transitive dependents (they stay
//! `Registered`), while independent sibling nodes run to completion.
//!
//! Execution is a topological wavefront over a bounded worker pool.
//! Dependency edges are supplied as previously returned [`TaskId`]s, so the
//! graph is acyclic by construction.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Pure predicate deciding whether a node's outputs are already up to date
pub type SkipPredicate = Box<dyn Fn() -> bool + Send + Sync>;

/// A node's unit of work
///
/// Called at most once per graph run; captures its context (config, fetcher,
/// paths) behind `Arc`s.
pub type TaskAction = Box<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Opaque handle to a registered node, used to declare dependency edges
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(usize);

/// Terminal (or not-yet-run) state of a node after a graph run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Registered but never executed (not requested, or an upstream failed)
    Registered,
    /// Skip predicate reported the node up to date; action not run
    Skipped,
    /// Action ran to completion
    Succeeded,
    /// Action returned an error
    Failed,
}

struct TaskNode {
    name: String,
    deps: Vec<TaskId>,
    skip: Option<SkipPredicate>,
    action: TaskAction,
}

/// A directed acyclic graph of tasks
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    by_name: HashMap<String, TaskId>,
    max_workers: usize,
}

impl TaskGraph {
    /// Create an empty graph executing at most `max_workers` nodes at once
    pub fn new(max_workers: usize) -> Self {
        Self {
            nodes: Vec::new(),
            by_name: HashMap::new(),
            max_workers: max_workers.max(1),
        }
    }

    /// Register a node
    ///
    /// `deps` must be handles previously returned by this graph. The skip
    /// predicate, when present, is evaluated at execution time once all
    /// dependencies have completed.
    pub fn add_task(
        &mut self,
        name: impl Into<String>,
        deps: &[TaskId],
        skip: Option<SkipPredicate>,
        action: TaskAction,
    ) -> Result<TaskId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(Error::Config {
                message: format!("task {name} registered twice"),
            });
        }
        let id = TaskId(self.nodes.len());
        self.by_name.insert(name.clone(), id);
        self.nodes.push(TaskNode {
            name,
            deps: deps.to_vec(),
            skip,
            action,
        });
        Ok(id)
    }

    /// Look up a registered node by name
    pub fn task_id(&self, name: &str) -> Option<TaskId> {
        self.by_name.get(name).copied()
    }

    /// Names of all registered nodes, in registration order
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.name.as_str())
    }

    /// Execute every registered node
    pub async fn run_all(&self) -> Result<GraphReport> {
        let all: Vec<TaskId> = (0..self.nodes.len()).map(TaskId).collect();
        self.execute(&all).await
    }

    /// Execute the named target nodes and their transitive dependencies
    pub async fn run(&self, targets: &[&str]) -> Result<GraphReport> {
        let mut ids = Vec::with_capacity(targets.len());
        for target in targets {
            ids.push(
                self.task_id(target)
                    .ok_or_else(|| Error::UnknownTask(target.to_string()))?,
            );
        }
        self.execute(&ids).await
    }

    /// The target set closed over dependency edges
    fn closure(&self, targets: &[TaskId]) -> HashSet<TaskId> {
        let mut needed = HashSet::new();
        let mut stack: Vec<TaskId> = targets.to_vec();
        while let Some(id) = stack.pop() {
            if needed.insert(id) {
                stack.extend(self.nodes[id.0].deps.iter().copied());
            }
        }
        needed
    }

    async fn execute(&self, targets: &[TaskId]) -> Result<GraphReport> {
        let needed = self.closure(targets);
        let mut states: Vec<TaskState> = vec![TaskState::Registered; self.nodes.len()];
        let mut failures: Vec<(String, Error)> = Vec::new();

        // Reverse edges and per-node unfinished-dependency counts, both
        // restricted to the needed set.
        let mut dependents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        let mut remaining: HashMap<TaskId, usize> = HashMap::new();
        for &id in &needed {
            let deps = &self.nodes[id.0].deps;
            remaining.insert(id, deps.len());
            for &dep in deps {
                dependents.entry(dep).or_default().push(id);
            }
        }

        let mut ready: VecDeque<TaskId> = {
            let mut initial: Vec<TaskId> = remaining
                .iter()
                .filter(|(_, count)| **count == 0)
                .map(|(id, _)| *id)
                .collect();
            initial.sort_by_key(|id| id.0);
            initial.into()
        };

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut join_set: JoinSet<(TaskId, Result<()>)> = JoinSet::new();
        let mut unfinished = needed.len();
        let mut blocked: HashSet<TaskId> = HashSet::new();

        while unfinished > 0 {
            // Launch everything currently ready; skip predicates are
            // evaluated here, at execution time.
            while let Some(id) = ready.pop_front() {
                let node = &self.nodes[id.0];
                if node.skip.as_ref().is_some_and(|skip| skip()) {
                    debug!(task = %node.name, "up to date, skipping");
                    states[id.0] = TaskState::Skipped;
                    unfinished -= 1;
                    Self::release_dependents(id, &dependents, &mut remaining, &mut ready);
                    continue;
                }

                debug!(task = %node.name, "executing");
                let future = (node.action)();
                let semaphore = semaphore.clone();
                join_set.spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return (
                                id,
                                Err(Error::Config {
                                    message: "worker pool closed".into(),
                                }),
                            );
                        }
                    };
                    (id, future.await)
                });
            }

            if unfinished == 0 {
                break;
            }

            let Some(joined) = join_set.join_next().await else {
                // Nothing in flight and nothing ready: every remaining node
                // is downstream of a failure.
                break;
            };
            let (id, result) = joined.map_err(|e| Error::Io(std::io::Error::other(e)))?;
            let name = &self.nodes[id.0].name;
            unfinished -= 1;

            match result {
                Ok(()) => {
                    debug!(task = %name, "succeeded");
                    states[id.0] = TaskState::Succeeded;
                    Self::release_dependents(id, &dependents, &mut remaining, &mut ready);
                }
                Err(err) => {
                    error!(task = %name, error = %err, "task failed");
                    states[id.0] = TaskState::Failed;
                    // Fail fast: transitive dependents never run, while
                    // independent in-flight siblings finish normally.
                    Self::block_dependents(id, &dependents, &mut blocked, &mut unfinished);
                    failures.push((name.clone(), err));
                }
            }
        }

        let report = GraphReport {
            states: self
                .nodes
                .iter()
                .enumerate()
                .map(|(index, node)| (node.name.clone(), states[index]))
                .collect(),
            failures,
        };
        info!(
            executed = report
                .states
                .values()
                .filter(|s| **s == TaskState::Succeeded)
                .count(),
            skipped = report
                .states
                .values()
                .filter(|s| **s == TaskState::Skipped)
                .count(),
            failed = report.failures.len(),
            "graph run finished"
        );
        Ok(report)
    }

    fn release_dependents(
        id: TaskId,
        dependents: &HashMap<TaskId, Vec<TaskId>>,
        remaining: &mut HashMap<TaskId, usize>,
        ready: &mut VecDeque<TaskId>,
    ) {
        if let Some(children) = dependents.get(&id) {
            for &child in children {
                if let Some(count) = remaining.get_mut(&child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(child);
                    }
                }
            }
        }
    }

    fn block_dependents(
        id: TaskId,
        dependents: &HashMap<TaskId, Vec<TaskId>>,
        blocked: &mut HashSet<TaskId>,
        unfinished: &mut usize,
    ) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(children) = dependents.get(&current) {
                for &child in children {
                    if blocked.insert(child) {
                        *unfinished -= 1;
                        stack.push(child);
                    }
                }
            }
        }
    }
}

/// Per-node outcome of a graph run
#[derive(Debug)]
pub struct GraphReport {
    states: HashMap<String, TaskState>,
    failures: Vec<(String, Error)>,
}

impl GraphReport {
    /// Terminal state of a node, by name
    pub fn state(&self, name: &str) -> Option<TaskState> {
        self.states.get(name).copied()
    }

    /// True when no node failed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// The failures that occurred, in completion order
    pub fn failures(&self) -> &[(String, Error)] {
        &self.failures
    }

    /// All node states
    pub fn states(&self) -> impl Iterator<Item = (&str, TaskState)> {
        self.states.iter().map(|(name, state)| (name.as_str(), *state))
    }

    /// Convert to a `Result`, surfacing the first failure with its node name
    pub fn into_result(mut self) -> Result<()> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            let (name, err) = self.failures.remove(0);
            Err(Error::for_task(name, err))
        }
    }
}
