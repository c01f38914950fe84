// src/perform.rs

//! Performer: the collaborator that does the real work of one action.

use anyhow::Result;

use crate::action::{ComponentPath, OperationKind};

/// Executes actions and maintains the persistent build-state store.
///
/// `perform` runs in forked workers as well as in the coordinator, so
/// implementations must not rely on in-memory mutations being visible to
/// the coordinator afterwards. Anything that must persist belongs in
/// `mark_operation_done`, which the coordinator calls after a successful
/// completion.
pub trait Performer {
    /// Do the action's real work. The returned string, if any, is an opaque
    /// payload carried back through the worker's result file; the executor
    /// never inspects it.
    fn perform(&self, op: OperationKind, component: &ComponentPath) -> Result<Option<String>>;

    /// Coordinator-only variant used for the synchronous retry of a failed
    /// background action. Implementations may present user-facing restart
    /// options here; the default just performs again.
    fn perform_with_restarts(
        &self,
        op: OperationKind,
        component: &ComponentPath,
    ) -> Result<Option<String>> {
        self.perform(op, component)
    }

    /// Record in the persistent build-state store that the operation
    /// completed on the component.
    fn mark_operation_done(&self, op: OperationKind, component: &ComponentPath) -> Result<()>;

    /// Human-readable label used in progress lines and diagnostics.
    fn operation_description(&self, op: OperationKind, component: &ComponentPath) -> String {
        format!("{op} {component}")
    }
}
