// src/plan/builder.rs

//! Plan construction: traverse root requests through the dependency oracle
//! into a [`Plan`] the executor can drain.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::action::ActionKey;
use crate::errors::{ForkdagError, Result};
use crate::oracle::DependencyOracle;
use crate::plan::graph::{DepGraph, MarkDone};

/// Lifecycle state of one action within a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    /// Known to the plan, waiting on prerequisites.
    Pending,
    /// All prerequisites done; queued for dispatch.
    Ready,
    /// Dispatched (inline or to a worker).
    Running,
    Done,
    Failed,
}

/// Classification cached when the action is first discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionMeta {
    /// Safe to perform in a forked worker.
    pub background_ok: bool,
    /// Effects must persist in the coordinator process.
    pub needed_in_image: bool,
    /// Persistent build state already records this action as done.
    pub already_done: bool,
}

/// A finite acyclic set of actions plus the bookkeeping the executor needs:
/// the dependency graph, the FIFO ready queue, the discovery log, and
/// per-action classification and status.
#[derive(Debug)]
pub struct Plan {
    pub(crate) graph: DepGraph,
    ready: VecDeque<ActionKey>,
    all_actions: Vec<ActionKey>,
    meta: HashMap<ActionKey, ActionMeta>,
    statuses: HashMap<ActionKey, ActionStatus>,
}

impl Plan {
    fn new() -> Self {
        Self {
            graph: DepGraph::default(),
            ready: VecDeque::new(),
            all_actions: Vec::new(),
            meta: HashMap::new(),
            statuses: HashMap::new(),
        }
    }

    /// Synthetic plan that performs `actions` in exactly the given order:
    /// each action's sole prerequisite is its predecessor. Duplicates keep
    /// their first occurrence. Used by breadcrumb replay.
    pub(crate) fn from_sequence(actions: &[ActionKey]) -> Self {
        let mut plan = Self::new();
        let mut prev: Option<ActionKey> = None;
        for key in actions {
            if plan.meta.contains_key(key) {
                continue;
            }
            plan.graph.record_edge(None, key);
            if let Some(prev) = &prev {
                plan.graph.record_edge(Some(key), prev);
            }
            plan.meta.insert(
                key.clone(),
                ActionMeta {
                    background_ok: key.op.can_run_in_background() && !key.op.needed_in_image(),
                    needed_in_image: key.op.needed_in_image(),
                    already_done: false,
                },
            );
            plan.all_actions.push(key.clone());
            if prev.is_none() {
                plan.enqueue_ready(key.clone());
            } else {
                plan.statuses.insert(key.clone(), ActionStatus::Pending);
            }
            prev = Some(key.clone());
        }
        plan
    }

    /// Number of actions in the plan.
    pub fn action_count(&self) -> usize {
        self.all_actions.len()
    }

    /// Every action, in the order the plan builder discovered it
    /// (prerequisites before dependents).
    pub fn all_actions(&self) -> &[ActionKey] {
        &self.all_actions
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Dequeue the next ready action.
    pub fn pop_ready(&mut self) -> Option<ActionKey> {
        self.ready.pop_front()
    }

    /// Cached classification for `key`.
    pub fn meta(&self, key: &ActionKey) -> ActionMeta {
        self.meta.get(key).copied().unwrap_or(ActionMeta {
            background_ok: false,
            needed_in_image: true,
            already_done: false,
        })
    }

    pub fn status(&self, key: &ActionKey) -> Option<ActionStatus> {
        self.statuses.get(key).copied()
    }

    pub fn set_status(&mut self, key: &ActionKey, status: ActionStatus) {
        self.statuses.insert(key.clone(), status);
    }

    /// True while `key` still has live graph entries.
    pub fn graph_contains(&self, key: &ActionKey) -> bool {
        self.graph.contains(key)
    }

    /// Retire `key` with the given terminal status, enqueueing any actions
    /// it was the last prerequisite of.
    pub fn complete(&mut self, key: &ActionKey, status: ActionStatus) -> MarkDone {
        self.statuses.insert(key.clone(), status);
        let released = self.graph.mark_done(key);
        for ready in &released.newly_ready {
            self.enqueue_ready(ready.clone());
        }
        released
    }

    /// Two-tier FIFO insertion: actions whose effects are needed in the
    /// image (and not already done) join the tail; everything else (cheap
    /// to discharge: background forks, already-done skips) cuts to the
    /// front so successors reopen sooner.
    pub(crate) fn enqueue_ready(&mut self, key: ActionKey) {
        self.statuses.insert(key.clone(), ActionStatus::Ready);
        let meta = self.meta(&key);
        if meta.needed_in_image && !meta.already_done {
            self.ready.push_back(key);
        } else {
            self.ready.push_front(key);
        }
    }

    /// Current ready-queue contents, for fatal-error reports.
    pub fn ready_summary(&self) -> String {
        if self.ready.is_empty() {
            return "(empty)".to_string();
        }
        self.ready
            .iter()
            .map(ActionKey::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Remaining unresolved prerequisites, for fatal-error reports.
    pub fn remaining_summary(&self) -> String {
        self.graph.remaining_summary()
    }
}

/// Depth-first plan construction with memoization.
///
/// Prerequisites are traversed before their dependents, so `all_actions`
/// ends up in dependency-safe order and the serial fallback can simply walk
/// it front to back.
pub struct PlanBuilder<'a, O: DependencyOracle + ?Sized> {
    oracle: &'a O,
    visited: HashSet<ActionKey>,
    plan: Plan,
}

impl<'a, O: DependencyOracle + ?Sized> PlanBuilder<'a, O> {
    /// Build the plan for a single root request.
    pub fn build(oracle: &'a O, root: &ActionKey) -> Result<Plan> {
        Self::build_many(oracle, std::slice::from_ref(root))
    }

    /// Build one plan covering all `roots`, sharing discovered actions.
    ///
    /// Runs the acyclicity check once, after the whole traversal; the plan
    /// handed to the executor is guaranteed to drain.
    pub fn build_many(oracle: &'a O, roots: &[ActionKey]) -> Result<Plan> {
        let mut builder = Self {
            oracle,
            visited: HashSet::new(),
            plan: Plan::new(),
        };
        for root in roots {
            builder.visit(root)?;
        }
        builder
            .plan
            .graph
            .check_acyclic()
            .map_err(ForkdagError::CycleDetected)?;
        debug!(
            actions = builder.plan.action_count(),
            roots = roots.len(),
            "plan built"
        );
        Ok(builder.plan)
    }

    fn visit(&mut self, key: &ActionKey) -> Result<()> {
        if !self.visited.insert(key.clone()) {
            return Ok(());
        }

        let prereqs = self
            .oracle
            .prerequisites(key.op, &key.component)
            .map_err(ForkdagError::Oracle)?;
        for pre in &prereqs {
            self.visit(pre)?;
        }

        self.plan.graph.record_edge(None, key);
        for pre in &prereqs {
            self.plan.graph.record_edge(Some(key), pre);
        }

        let needed = self.oracle.needed_in_image(key.op, &key.component);
        let done = self.oracle.already_done(key.op, &key.component);
        self.plan.meta.insert(
            key.clone(),
            ActionMeta {
                background_ok: key.op.can_run_in_background() && !needed && !done,
                needed_in_image: needed,
                already_done: done,
            },
        );
        self.plan.all_actions.push(key.clone());

        if self.plan.graph.is_ready(key) {
            self.plan.enqueue_ready(key.clone());
        } else {
            self.plan.statuses.insert(key.clone(), ActionStatus::Pending);
        }

        debug!(action = %key, prerequisites = prereqs.len(), "planned action");
        Ok(())
    }
}
