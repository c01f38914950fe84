// src/oracle.rs

//! Dependency oracle: the collaborator that knows what each action
//! requires and what the persistent build state already says is done.

use anyhow::Result;

use crate::action::{ActionKey, ComponentPath, OperationKind};

/// Answers prerequisite and build-state questions during plan construction.
///
/// `prerequisites` is queried once per action (the plan builder memoizes
/// visits), so implementations may be pure or cached.
pub trait DependencyOracle {
    /// Actions that must complete before `(op, component)` may start.
    fn prerequisites(
        &self,
        op: OperationKind,
        component: &ComponentPath,
    ) -> Result<Vec<ActionKey>>;

    /// Whether the operation's effects must persist in the coordinator
    /// process. Defaults to the operation kind's static answer; override
    /// for per-component refinements.
    fn needed_in_image(&self, op: OperationKind, _component: &ComponentPath) -> bool {
        op.needed_in_image()
    }

    /// Whether persistent build state (e.g. output timestamps) says this
    /// action has already been performed.
    fn already_done(&self, _op: OperationKind, _component: &ComponentPath) -> bool {
        false
    }
}
