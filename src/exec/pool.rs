// src/exec/pool.rs

//! Fork/wait worker pool.
//!
//! The coordinator forks one child process per background action. A child
//! detaches into its own process group, runs the perform callback inside a
//! panic trap, writes its outcome to a per-action result file, and exits 0
//! unconditionally — the coordinator classifies success by the record's
//! contents, not the exit code (though a nonzero exit is always a failure).
//!
//! All communication is one-way, child → coordinator, through the result
//! file; nothing is shared after the fork.

use std::collections::HashMap;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{wait, WaitStatus};
use nix::unistd::{fork, setsid, ForkResult, Pid};
use tracing::{debug, warn};

use crate::action::ActionKey;
use crate::errors::{ForkdagError, Result};
use crate::exec::result_file::{self, OutcomeRecord, ReadError};

/// Policy for deciding whether forking is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForkGate {
    /// Fork only while the coordinator is single-threaded, checked against
    /// the live thread list.
    #[default]
    CheckThreads,
    /// Fork unconditionally. For callers that already guarantee a
    /// single-threaded process.
    Always,
    /// Never fork; every action runs in the coordinator.
    Never,
}

impl ForkGate {
    /// Whether forking is currently permitted, with a reason when not.
    pub fn permits_fork(self) -> std::result::Result<(), String> {
        match self {
            ForkGate::Always => Ok(()),
            ForkGate::Never => Err("forking disabled by configuration".to_string()),
            ForkGate::CheckThreads => match live_thread_count() {
                Some(1) => Ok(()),
                Some(n) => Err(format!(
                    "{n} threads are live; fork requires a single-threaded coordinator"
                )),
                // No thread list on this platform; trust the caller.
                None => Ok(()),
            },
        }
    }
}

/// Number of live threads in this process, where the platform exposes it.
fn live_thread_count() -> Option<usize> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_dir("/proc/self/task")
            .ok()
            .map(|entries| entries.count())
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// One forked worker the coordinator is waiting on.
#[derive(Debug)]
pub struct Worker {
    pub pid: Pid,
    pub key: ActionKey,
    pub result_file: PathBuf,
}

/// Outcome of one worker, as classified by the coordinator.
#[derive(Debug)]
pub enum WorkOutcome {
    /// Worker exited zero and its result file reported no condition.
    Success { result: Option<String> },
    /// Worker crashed, reported a condition, or left no usable result file.
    Failed { error: ForkdagError },
}

/// A reaped worker together with its classified outcome.
#[derive(Debug)]
pub struct Completion {
    pub worker: Worker,
    pub outcome: WorkOutcome,
}

/// Tracks forked workers by PID and reaps their outcomes.
pub struct WorkerPool {
    workers: HashMap<Pid, Worker>,
    max_forks: usize,
    gate: ForkGate,
    forks_spawned: usize,
    max_live: usize,
}

impl WorkerPool {
    pub fn new(max_forks: usize, gate: ForkGate) -> Self {
        Self {
            workers: HashMap::new(),
            max_forks: max_forks.max(1),
            gate,
            forks_spawned: 0,
            max_live: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn at_capacity(&self) -> bool {
        self.workers.len() >= self.max_forks
    }

    /// Workers forked over the pool's lifetime.
    pub fn forks_spawned(&self) -> usize {
        self.forks_spawned
    }

    /// High-water mark of simultaneously live workers.
    pub fn max_live(&self) -> usize {
        self.max_live
    }

    /// Fork a worker that runs `work` and reports through `result_file`.
    ///
    /// The child never returns from this call. The parent records the
    /// worker and returns its PID.
    pub fn fork_worker<F>(&mut self, key: ActionKey, result_file: PathBuf, work: F) -> Result<Pid>
    where
        F: FnOnce() -> anyhow::Result<Option<String>>,
    {
        self.gate.permits_fork().map_err(ForkdagError::ForkUnsafe)?;
        prepare_for_fork()?;

        // Gate verified above; the child continues alone in its own copy of
        // the address space.
        match unsafe { fork() }.context("fork failed")? {
            ForkResult::Parent { child } => {
                debug!(pid = %child, action = %key, "forked worker");
                self.workers.insert(
                    child,
                    Worker {
                        pid: child,
                        key,
                        result_file,
                    },
                );
                self.forks_spawned += 1;
                self.max_live = self.max_live.max(self.workers.len());
                Ok(child)
            }
            ForkResult::Child => worker_child(&result_file, work),
        }
    }

    /// Block until at least one worker exits and classify its outcome.
    ///
    /// Normally returns a single completion. When `wait` reports no child
    /// despite outstanding workers (dropped SIGCHLD on some platforms),
    /// every outstanding worker is returned as failed with no status so the
    /// scheduler can retry them inline.
    pub fn reap(&mut self) -> Result<Vec<Completion>> {
        debug_assert!(!self.workers.is_empty(), "reap with no outstanding workers");
        loop {
            let status = match wait() {
                Ok(status) => status,
                Err(Errno::ECHILD) => {
                    warn!(
                        outstanding = self.workers.len(),
                        "no child process to wait for; treating outstanding workers as failed"
                    );
                    let lost: Vec<Completion> = self
                        .workers
                        .drain()
                        .map(|(_, worker)| Completion {
                            outcome: WorkOutcome::Failed {
                                error: ForkdagError::WorkerCrashed {
                                    description: worker.key.to_string(),
                                    exit_status: "no status (worker lost)".to_string(),
                                },
                            },
                            worker,
                        })
                        .collect();
                    return Ok(lost);
                }
                Err(err) => {
                    return Err(anyhow::Error::from(err)
                        .context("waiting for a worker")
                        .into())
                }
            };

            let (pid, exit) = match status {
                WaitStatus::Exited(pid, code) => (pid, Exit::Code(code)),
                WaitStatus::Signaled(pid, sig, _) => (pid, Exit::Signal(sig)),
                other => {
                    debug!(status = ?other, "ignoring non-exit wait status");
                    continue;
                }
            };

            let Some(worker) = self.workers.remove(&pid) else {
                warn!(pid = %pid, "reaped a process that is not a tracked worker");
                continue;
            };

            let outcome = classify(&worker, exit);
            return Ok(vec![Completion { worker, outcome }]);
        }
    }
}

enum Exit {
    Code(i32),
    Signal(Signal),
}

fn classify(worker: &Worker, exit: Exit) -> WorkOutcome {
    let description = worker.key.to_string();
    match exit {
        Exit::Code(0) => match result_file::read_outcome(&worker.result_file) {
            Ok(OutcomeRecord {
                condition: Some(condition),
                ..
            }) => WorkOutcome::Failed {
                error: ForkdagError::ActionFailed {
                    description,
                    cause: anyhow::anyhow!(condition),
                },
            },
            Ok(OutcomeRecord { result, .. }) => WorkOutcome::Success { result },
            Err(ReadError::Unreadable(err)) => WorkOutcome::Failed {
                error: ForkdagError::ActionFailed {
                    description,
                    cause: anyhow::Error::from(err).context("could not read result file"),
                },
            },
            Err(ReadError::Malformed(detail)) => WorkOutcome::Failed {
                error: ForkdagError::ActionFailed {
                    description,
                    cause: anyhow::anyhow!("invalid result file: {detail}"),
                },
            },
        },
        Exit::Code(code) => WorkOutcome::Failed {
            error: ForkdagError::WorkerCrashed {
                description,
                exit_status: format!("exit status {code}"),
            },
        },
        Exit::Signal(sig) => WorkOutcome::Failed {
            error: ForkdagError::WorkerCrashed {
                description,
                exit_status: format!("killed by {sig}"),
            },
        },
    }
}

/// Pre-fork hygiene: flush buffered output so nothing is emitted twice, and
/// restore the default SIGCHLD disposition (subprocess wrappers are known
/// to change it, which breaks `wait`).
fn prepare_for_fork() -> Result<()> {
    std::io::stdout().flush()?;
    std::io::stderr().flush()?;
    // Restoring a handler is process-global but the coordinator is
    // single-threaded here.
    unsafe { signal::signal(Signal::SIGCHLD, SigHandler::SigDfl) }
        .context("resetting SIGCHLD disposition")?;
    Ok(())
}

/// Post-fork child: detach, run the work, report, exit 0.
fn worker_child<F>(result_file: &Path, work: F) -> !
where
    F: FnOnce() -> anyhow::Result<Option<String>>,
{
    // Own process group: interactive signals aimed at the coordinator must
    // not reach workers.
    let _ = setsid();

    let record = match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(result)) => OutcomeRecord {
            result,
            condition: None,
        },
        Ok(Err(err)) => OutcomeRecord {
            result: None,
            condition: Some(format!("{err:#}")),
        },
        Err(payload) => OutcomeRecord {
            result: None,
            condition: Some(panic_message(payload.as_ref())),
        },
    };

    if let Err(err) = result_file::write_outcome(result_file, &record) {
        // The missing file reads as a failure on the coordinator side.
        eprintln!("forkdag worker: could not write result file: {err}");
    }

    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
    process::exit(0);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}
