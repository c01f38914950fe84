// src/exec/executor.rs

//! The scheduler/executor: drains a plan's ready queue, forking background
//! work and serializing in-image work in the coordinator.
//!
//! Failure policy: a failed background action is re-attempted synchronously
//! in the coordinator, so the failure surfaces with full in-image context
//! (restarts, state, diagnostics) instead of inside a terminated child.
//! Only a second failure aborts the build.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::action::ActionKey;
use crate::breadcrumb::BreadcrumbWriter;
use crate::errors::{ForkdagError, Result};
use crate::exec::pool::{Completion, ForkGate, WorkOutcome, WorkerPool};
use crate::perform::Performer;
use crate::plan::{ActionStatus, Plan};

/// Knobs for one [`execute`] call.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Upper bound on simultaneous workers.
    pub max_forks: usize,
    /// Fork admission policy.
    pub fork_gate: ForkGate,
    /// Directory for per-action result files; created if missing.
    pub output_dir: PathBuf,
    /// Breadcrumb record path; recording disabled when unset.
    pub breadcrumbs_to: Option<PathBuf>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_forks: 16,
            fork_gate: ForkGate::default(),
            output_dir: PathBuf::from(".forkdag"),
            breadcrumbs_to: None,
        }
    }
}

/// Statistics from one [`execute`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorReport {
    /// Actions actually performed (in either context).
    pub performed: usize,
    /// Actions skipped because the build state already recorded them done.
    pub skipped: usize,
    /// Workers forked over the whole run.
    pub forks_spawned: usize,
    /// High-water mark of simultaneously live workers.
    pub max_live_forks: usize,
}

/// Execute `plan` to completion with `performer`.
pub fn execute<P: Performer + ?Sized>(
    plan: Plan,
    performer: &P,
    options: ExecutorOptions,
) -> Result<ExecutorReport> {
    Executor::new(plan, performer, options)?.run()
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum CompletionKind {
    Performed,
    Skipped,
}

struct Executor<'a, P: Performer + ?Sized> {
    performer: &'a P,
    options: ExecutorOptions,
    pool: WorkerPool,
    plan: Plan,
    breadcrumbs: Option<BreadcrumbWriter>,
    remaining: usize,
    report: ExecutorReport,
}

impl<'a, P: Performer + ?Sized> Executor<'a, P> {
    fn new(plan: Plan, performer: &'a P, options: ExecutorOptions) -> Result<Self> {
        fs::create_dir_all(&options.output_dir)?;
        let breadcrumbs = options
            .breadcrumbs_to
            .as_deref()
            .map(BreadcrumbWriter::create)
            .transpose()?;
        let pool = WorkerPool::new(options.max_forks, options.fork_gate);
        let remaining = plan.action_count();
        Ok(Self {
            performer,
            options,
            pool,
            plan,
            breadcrumbs,
            remaining,
            report: ExecutorReport::default(),
        })
    }

    fn run(mut self) -> Result<ExecutorReport> {
        if let Err(reason) = self.options.fork_gate.permits_fork() {
            warn!(%reason, "cannot fork; running the whole plan serially");
            match self.run_serial() {
                Ok(()) => return Ok(self.finish()),
                Err(err) => {
                    self.report_fatal(&err);
                    return Err(err);
                }
            }
        }

        match self.run_parallel() {
            Ok(()) => Ok(self.finish()),
            Err(err) => {
                self.report_fatal(&err);
                Err(err)
            }
        }
    }

    /// Main loop: saturation branch reaps, dispatch branch classifies and
    /// launches. Foreground actions run to completion before the next pop.
    fn run_parallel(&mut self) -> Result<()> {
        while self.plan.has_ready() || !self.pool.is_empty() {
            if self.pool.at_capacity() || !self.plan.has_ready() {
                for completion in self.pool.reap()? {
                    self.finish_worker(completion)?;
                }
                continue;
            }
            if let Some(key) = self.plan.pop_ready() {
                self.dispatch(key)?;
            }
        }
        debug_assert!(self.plan.graph.is_empty());
        Ok(())
    }

    fn dispatch(&mut self, key: ActionKey) -> Result<()> {
        let meta = self.plan.meta(&key);
        let desc = self
            .performer
            .operation_description(key.op, &key.component);
        let background = meta.background_ok && self.options.fork_gate.permits_fork().is_ok();

        println!(
            "Will {} {} in {}",
            if meta.already_done { "skip" } else { "try" },
            desc,
            if background { "background" } else { "foreground" },
        );

        if meta.already_done {
            // Build state says the work already happened; release
            // dependents without performing again.
            return self.complete(key, &desc, CompletionKind::Skipped);
        }

        self.plan.set_status(&key, ActionStatus::Running);

        if background {
            let result_file = result_file_path(&self.options.output_dir, &key);
            let performer = self.performer;
            let op = key.op;
            let component = key.component.clone();
            match self
                .pool
                .fork_worker(key.clone(), result_file, move || {
                    performer.perform(op, &component)
                }) {
                Ok(_pid) => return Ok(()),
                Err(ForkdagError::ForkUnsafe(reason)) => {
                    // The gate flipped between classification and fork;
                    // degrade this action to foreground.
                    warn!(%reason, action = %key, "fork refused; performing in foreground");
                }
                Err(err) => return Err(err),
            }
        }

        match self.performer.perform(key.op, &key.component) {
            Ok(_result) => self.complete(key, &desc, CompletionKind::Performed),
            Err(cause) => {
                let error = ForkdagError::ActionFailed {
                    description: desc.clone(),
                    cause,
                };
                self.retry_then_complete(key, &desc, error)
            }
        }
    }

    fn finish_worker(&mut self, completion: Completion) -> Result<()> {
        let Completion { worker, outcome } = completion;
        let desc = self
            .performer
            .operation_description(worker.key.op, &worker.key.component);
        let _ = fs::remove_file(&worker.result_file);

        match outcome {
            WorkOutcome::Success { result } => {
                debug!(action = %worker.key, ?result, "worker succeeded");
                self.complete(worker.key, &desc, CompletionKind::Performed)
            }
            WorkOutcome::Failed { error } => self.retry_then_complete(worker.key, &desc, error),
        }
    }

    /// Cleanup policy for a failed action: warn, then retry synchronously
    /// in the coordinator. Only a second failure propagates.
    fn retry_then_complete(
        &mut self,
        key: ActionKey,
        desc: &str,
        error: ForkdagError,
    ) -> Result<()> {
        warn!(action = %key, %error, "action failed; retrying in foreground");
        match self.performer.perform_with_restarts(key.op, &key.component) {
            Ok(_result) => self.complete(key, desc, CompletionKind::Performed),
            Err(cause) => {
                self.plan.set_status(&key, ActionStatus::Failed);
                Err(ForkdagError::ActionFailed {
                    description: desc.to_string(),
                    cause,
                })
            }
        }
    }

    /// Mark an action done: persist build state, breadcrumb, release
    /// dependents, emit the progress line.
    fn complete(&mut self, key: ActionKey, desc: &str, kind: CompletionKind) -> Result<()> {
        if kind == CompletionKind::Performed {
            self.report.performed += 1;
            self.performer
                .mark_operation_done(key.op, &key.component)
                .map_err(|err| {
                    ForkdagError::Other(err.context("recording operation in build state"))
                })?;
            if let Some(crumbs) = &mut self.breadcrumbs {
                crumbs.record(&key)?;
            }
        } else {
            self.report.skipped += 1;
        }

        let released = self.plan.complete(&key, ActionStatus::Done);
        for orphan in &released.orphaned_children {
            debug!(action = %orphan, "child action no longer waited on");
        }

        self.remaining = self.remaining.saturating_sub(1);
        println!("[{} to go] Done {desc}", self.remaining);
        Ok(())
    }

    /// Serial fallback: one pass over the discovery log, which is already
    /// in dependency-safe order. Same observable result, lower throughput.
    fn run_serial(&mut self) -> Result<()> {
        let actions: Vec<ActionKey> = self.plan.all_actions().to_vec();
        for key in actions {
            if !self.plan.graph_contains(&key) {
                continue;
            }
            let desc = self
                .performer
                .operation_description(key.op, &key.component);

            if self.plan.meta(&key).already_done {
                println!("Will skip {desc} in foreground");
                self.complete(key, &desc, CompletionKind::Skipped)?;
                continue;
            }

            println!("Will try {desc} in foreground");
            self.plan.set_status(&key, ActionStatus::Running);
            match self.performer.perform_with_restarts(key.op, &key.component) {
                Ok(_result) => self.complete(key, &desc, CompletionKind::Performed)?,
                Err(cause) => {
                    self.plan.set_status(&key, ActionStatus::Failed);
                    return Err(ForkdagError::ActionFailed {
                        description: desc,
                        cause,
                    });
                }
            }
        }

        // The pass above completed every action directly, but `complete`
        // still fed the ready queue; drain the stale entries so the plan
        // ends fully empty.
        while let Some(_key) = self.plan.pop_ready() {
            debug_assert_eq!(self.plan.status(&_key), Some(ActionStatus::Done));
        }
        Ok(())
    }

    /// Fatal-error report: the failing error plus the in-flight plan state.
    fn report_fatal(&self, err: &ForkdagError) {
        eprintln!("forkdag: build aborted: {err}");
        eprintln!("ready queue: {}", self.plan.ready_summary());
        let remaining = self.plan.remaining_summary();
        if !remaining.is_empty() {
            eprintln!("unresolved prerequisites:\n{remaining}");
        }
    }

    fn finish(self) -> ExecutorReport {
        let mut report = self.report;
        report.forks_spawned = self.pool.forks_spawned();
        report.max_live_forks = self.pool.max_live();
        info!(
            performed = report.performed,
            skipped = report.skipped,
            forks = report.forks_spawned,
            "plan executed"
        );
        report
    }
}

/// `<output_dir>/<component-path>.<kind>.process-result`, with the path
/// segments joined so names stay distinct per action.
pub fn result_file_path(output_dir: &Path, key: &ActionKey) -> PathBuf {
    output_dir.join(format!(
        "{}.{}.process-result",
        key.component.file_stem(),
        key.op.tag()
    ))
}
