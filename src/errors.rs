// src/errors.rs

//! Crate-wide error types.
//!
//! Collaborator traits ([`crate::oracle::DependencyOracle`],
//! [`crate::perform::Performer`]) speak `anyhow::Result`; their errors are
//! folded into [`ForkdagError`] at the plan-builder and executor boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForkdagError {
    /// The action graph contains at least one cycle. Fatal, detected before
    /// execution begins; the payload lists each action's unresolved
    /// prerequisites.
    #[error("cycle detected in action graph:\n{0}")]
    CycleDetected(String),

    /// Forking is not permitted in the current process state.
    #[error("forking is unsafe: {0}")]
    ForkUnsafe(String),

    /// A worker exited abnormally without a usable result.
    #[error("worker for {description} crashed: {exit_status}")]
    WorkerCrashed {
        description: String,
        exit_status: String,
    },

    /// An action failed in the coordinator (after the foreground retry, or
    /// as reported through a worker's result file).
    #[error("{description} failed: {cause:#}")]
    ActionFailed {
        description: String,
        cause: anyhow::Error,
    },

    /// The dependency oracle raised while the plan was being built.
    #[error("dependency oracle error: {0:#}")]
    Oracle(anyhow::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ForkdagError>;
