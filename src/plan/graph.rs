// src/plan/graph.rs

//! Bidirectional dependency bookkeeping over action keys.

use std::collections::{HashMap, HashSet};

use crate::action::ActionKey;

/// Result of retiring one action from the graph.
#[derive(Debug, Default)]
pub struct MarkDone {
    /// Actions whose last outstanding prerequisite was the retired action.
    pub newly_ready: Vec<ActionKey>,
    /// Prerequisites the retired action was still waiting on that now have
    /// no other waiters. Informational; this only happens when an action is
    /// retired before its prerequisites resolved, which the executor never
    /// does for actions it dispatched itself.
    pub orphaned_children: Vec<ActionKey>,
}

/// Dependency graph: who waits on whom.
///
/// Two maps are kept in lockstep:
/// - `children[parent]`: prerequisites `parent` still waits on
/// - `parents[child]`: actions waiting on `child`
///
/// Invariants, after every public operation:
/// 1. `child ∈ children[parent]` iff `parent ∈ parents[child]`
/// 2. an action is *ready* iff it has no `children` entry
/// 3. an action has entries iff it has not been retired via [`mark_done`]
///
/// Acyclicity is checked once, at plan-construction time, via
/// [`check_acyclic`]; the executor may then assume that repeatedly retiring
/// ready actions drains the graph.
///
/// [`mark_done`]: DepGraph::mark_done
/// [`check_acyclic`]: DepGraph::check_acyclic
#[derive(Debug, Clone, Default)]
pub struct DepGraph {
    children: HashMap<ActionKey, HashSet<ActionKey>>,
    parents: HashMap<ActionKey, HashSet<ActionKey>>,
}

impl DepGraph {
    /// Register `child`, and when `parent` is given add the symmetric edge
    /// "`parent` waits on `child`". Idempotent.
    pub fn record_edge(&mut self, parent: Option<&ActionKey>, child: &ActionKey) {
        self.parents.entry(child.clone()).or_default();
        if let Some(parent) = parent {
            self.parents.entry(parent.clone()).or_default();
            self.children
                .entry(parent.clone())
                .or_default()
                .insert(child.clone());
            self.parents
                .entry(child.clone())
                .or_default()
                .insert(parent.clone());
        }
    }

    /// Retire `key`: release every waiter, drop edges to any unresolved
    /// prerequisites, and erase the key's own entries.
    pub fn mark_done(&mut self, key: &ActionKey) -> MarkDone {
        let mut out = MarkDone::default();

        if let Some(waiters) = self.parents.remove(key) {
            for parent in waiters {
                if let Some(outstanding) = self.children.get_mut(&parent) {
                    outstanding.remove(key);
                    if outstanding.is_empty() {
                        self.children.remove(&parent);
                        out.newly_ready.push(parent);
                    }
                }
            }
        }

        if let Some(unresolved) = self.children.remove(key) {
            for child in unresolved {
                if let Some(waiters) = self.parents.get_mut(&child) {
                    waiters.remove(key);
                    if waiters.is_empty() {
                        self.parents.remove(&child);
                        out.orphaned_children.push(child);
                    }
                }
            }
        }

        out
    }

    /// True when every action has been retired.
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty() && self.children.is_empty()
    }

    /// True when `key` has no outstanding prerequisites.
    pub fn is_ready(&self, key: &ActionKey) -> bool {
        !self.children.contains_key(key)
    }

    /// True when `key` is still live in the graph.
    pub fn contains(&self, key: &ActionKey) -> bool {
        self.parents.contains_key(key) || self.children.contains_key(key)
    }

    /// Verify the graph drains: on a clone, repeatedly retire every ready
    /// action; if the clone gets stuck with edges remaining, there is a
    /// cycle and the returned summary names each blocked action and its
    /// unresolved prerequisites.
    pub fn check_acyclic(&self) -> Result<(), String> {
        let mut sim = self.clone();
        loop {
            if sim.is_empty() {
                return Ok(());
            }
            // Every registered key has a `parents` entry, so scanning that
            // map covers the whole graph.
            let ready: Vec<ActionKey> = sim
                .parents
                .keys()
                .filter(|key| !sim.children.contains_key(*key))
                .cloned()
                .collect();
            if ready.is_empty() {
                return Err(sim.remaining_summary());
            }
            for key in ready {
                sim.mark_done(&key);
            }
        }
    }

    /// One line per blocked action listing its unresolved prerequisites.
    /// Sorted, for stable diagnostics.
    pub fn remaining_summary(&self) -> String {
        let mut lines: Vec<String> = self
            .children
            .iter()
            .map(|(parent, unresolved)| {
                let mut names: Vec<String> =
                    unresolved.iter().map(ActionKey::to_string).collect();
                names.sort();
                format!("  {parent} still waits on: {}", names.join(", "))
            })
            .collect();
        lines.sort();
        lines.join("\n")
    }
}
