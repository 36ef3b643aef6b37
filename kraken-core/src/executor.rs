// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Drives a `TaskGraph` to completion: a single-threaded sequential mode by default, or an
//! optional bounded-parallelism mode built on a borrowed or owned tokio runtime, mirroring the
//! source system's `task_executor::Executor`. Task bodies are treated as opaque blocking
//! operations in both modes.

use std::collections::HashMap;

use log::{debug, warn};

use crate::context::{Context, TaskId};
use crate::error::{Error, Result};
use crate::graph::TaskGraph;
use crate::task::TaskStatus;

/// Wraps a propagated `Error` from a task's `execute` with the failing task's path, the way a
/// task that returns `Failed` directly already carries its own message.
fn wrap_execution_error(ctx: &Context, id: TaskId, source: Error) -> TaskStatus {
    let wrapped = Error::TaskExecutionFailed { task: ctx.task_path(id), source: Box::new(source) };
    TaskStatus::Failed(wrapped.to_string())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop starting new tasks once one has failed; tasks already running are allowed to finish.
    HaltOnFailure,
    /// Keep scheduling any task whose strict predecessors are all non-failed.
    KeepGoing,
}

/// One task's final status, with its path already resolved for display.
#[derive(Clone, Debug)]
pub struct TaskResult {
    pub task: String,
    pub status: TaskStatus,
}

/// The outcome of one `Executor::run`: every selected task's final status, in decision order.
#[derive(Clone, Debug, Default)]
pub struct ExecutionReport {
    pub results: Vec<TaskResult>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        !self.results.iter().any(|r| r.status.is_failed())
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.iter().filter(|r| r.status.is_failed())
    }
}

pub struct Executor {
    policy: ErrorPolicy,
    parallelism: usize,
}

impl Executor {
    pub fn new(policy: ErrorPolicy, parallelism: usize) -> Self {
        Executor { policy, parallelism: parallelism.max(1) }
    }

    pub fn sequential(policy: ErrorPolicy) -> Self {
        Self::new(policy, 1)
    }

    pub fn run(&self, ctx: &Context, graph: &TaskGraph) -> Result<ExecutionReport> {
        if self.parallelism <= 1 {
            self.run_sequential(ctx, graph)
        } else {
            self.run_parallel(ctx, graph)
        }
    }

    /// Pops and handles exactly one ready (or decidable) task per outer tick, rather than
    /// sweeping the whole pending set: a task's status must be fully recorded before any other
    /// task's readiness or halt check is evaluated, matching the "pop a ready task" wording of
    /// the scheduling algorithm without depending on an arbitrary iteration order.
    fn run_sequential(&self, ctx: &Context, graph: &TaskGraph) -> Result<ExecutionReport> {
        let mut state = RunState::new(graph.nodes());
        loop {
            let mut progressed = false;
            for id in state.pending() {
                match state.decide(ctx, graph, id, self.policy) {
                    Decision::Blocked => continue,
                    Decision::Skip(status) => {
                        state.record(ctx, id, status);
                        progressed = true;
                        break;
                    }
                    Decision::Run => {
                        ctx.set_task_executing(id, true);
                        let status = match ctx.run_task(id) {
                            Ok(status) => status,
                            Err(e) => wrap_execution_error(ctx, id, e),
                        };
                        ctx.set_task_executing(id, false);
                        state.note_failure(&status);
                        state.record(ctx, id, status);
                        progressed = true;
                        break;
                    }
                }
            }
            if !progressed {
                break;
            }
        }
        debug!("sequential run completed: {} tasks", state.report.results.len());
        Ok(state.report)
    }

    fn run_parallel(&self, ctx: &Context, graph: &TaskGraph) -> Result<ExecutionReport> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.parallelism)
            .enable_all()
            .build()
            .expect("failed to start the parallel executor's tokio runtime");
        runtime.block_on(self.run_parallel_async(ctx, graph))
    }

    async fn run_parallel_async(&self, ctx: &Context, graph: &TaskGraph) -> Result<ExecutionReport> {
        let mut state = RunState::new(graph.nodes());
        let mut join_set: tokio::task::JoinSet<(TaskId, Result<TaskStatus>)> = tokio::task::JoinSet::new();
        let mut running = std::collections::HashSet::new();

        loop {
            for id in state.pending() {
                if running.contains(&id) {
                    continue;
                }
                match state.decide(ctx, graph, id, self.policy) {
                    Decision::Blocked => continue,
                    Decision::Skip(status) => state.record(ctx, id, status),
                    Decision::Run => {
                        if running.len() >= self.parallelism {
                            continue;
                        }
                        running.insert(id);
                        ctx.set_task_executing(id, true);
                        let ctx = ctx.clone();
                        join_set.spawn_blocking(move || (id, ctx.run_task(id)));
                    }
                }
            }

            if running.is_empty() {
                break;
            }

            if let Some(joined) = join_set.join_next().await {
                let (id, result) = match joined {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("a task's worker thread panicked: {e}");
                        continue;
                    }
                };
                running.remove(&id);
                ctx.set_task_executing(id, false);
                let status = match result {
                    Ok(status) => status,
                    Err(e) => wrap_execution_error(ctx, id, e),
                };
                state.note_failure(&status);
                state.record(ctx, id, status);
            }
        }
        Ok(state.report)
    }
}

enum Decision {
    Blocked,
    Run,
    Skip(TaskStatus),
}

/// Tracks per-run progress: which tasks have a final status, whether a failure has halted new
/// scheduling, and the report being assembled.
struct RunState {
    all: Vec<TaskId>,
    statuses: HashMap<TaskId, TaskStatus>,
    halted: bool,
    report: ExecutionReport,
}

impl RunState {
    fn new(all: Vec<TaskId>) -> Self {
        RunState { all, statuses: HashMap::new(), halted: false, report: ExecutionReport::default() }
    }

    fn pending(&self) -> Vec<TaskId> {
        self.all.iter().copied().filter(|id| !self.statuses.contains_key(id)).collect()
    }

    fn note_failure(&mut self, status: &TaskStatus) {
        if status.is_failed() {
            self.halted = true;
        }
    }

    fn decide(&self, ctx: &Context, graph: &TaskGraph, id: TaskId, policy: ErrorPolicy) -> Decision {
        let predecessors = graph.strict_predecessors(id);
        if let Some(failed) = predecessors.iter().find(|p| self.statuses.get(p).is_some_and(TaskStatus::is_failed)) {
            return Decision::Skip(TaskStatus::Skipped(format!("upstream failed: {}", ctx.task_path(*failed))));
        }
        let ready = predecessors.iter().all(|p| self.statuses.get(p).is_some_and(TaskStatus::satisfies_dependents));
        if !ready {
            return Decision::Blocked;
        }
        if self.halted && policy == ErrorPolicy::HaltOnFailure {
            return Decision::Skip(TaskStatus::Skipped("not started: halted after an earlier failure".to_string()));
        }
        Decision::Run
    }

    fn record(&mut self, ctx: &Context, id: TaskId, status: TaskStatus) {
        ctx.set_task_status(id, status.clone());
        let task = ctx.task_path(id);
        if let TaskStatus::Failed(reason) = &status {
            warn!("task {task} failed: {reason}");
        }
        self.statuses.insert(id, status.clone());
        self.report.results.push(TaskResult { task, status });
    }
}
