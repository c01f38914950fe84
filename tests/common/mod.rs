#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, Once};

use anyhow::{bail, Result};
use tracing_subscriber::{fmt, EnvFilter};

use forkdag::action::{ActionKey, ComponentPath, OperationKind};
use forkdag::oracle::DependencyOracle;
use forkdag::perform::Performer;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Uses `with_test_writer()`, so logs are captured per-test and only
/// printed for failing tests (unless `-- --nocapture`). Enable levels with
/// e.g. `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// `compile` action on a unit of the test system.
pub fn compile(name: &str) -> ActionKey {
    ActionKey::new(OperationKind::Compile, ComponentPath::new("test", [name]))
}

/// `load` action on a unit of the test system.
pub fn load(name: &str) -> ActionKey {
    ActionKey::new(OperationKind::Load, ComponentPath::new("test", [name]))
}

/// Scripted dependency oracle: prerequisites from a fixed table, with
/// optional already-done and everything-in-image overrides.
pub struct FakeOracle {
    prereqs: HashMap<ActionKey, Vec<ActionKey>>,
    done: HashSet<ActionKey>,
    all_in_image: bool,
    queries: Mutex<Vec<ActionKey>>,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self {
            prereqs: HashMap::new(),
            done: HashSet::new(),
            all_in_image: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Report every action as needed-in-image, so nothing classifies as
    /// background regardless of the fork gate. Keeps executor tests inside
    /// the test process.
    pub fn all_in_image(mut self) -> Self {
        self.all_in_image = true;
        self
    }

    pub fn with_prereqs(mut self, key: ActionKey, prereqs: Vec<ActionKey>) -> Self {
        self.prereqs.insert(key, prereqs);
        self
    }

    pub fn with_done(mut self, key: ActionKey) -> Self {
        self.done.insert(key);
        self
    }

    /// Every key `prerequisites` was asked about, in order.
    pub fn queries(&self) -> Vec<ActionKey> {
        self.queries.lock().unwrap().clone()
    }
}

impl DependencyOracle for FakeOracle {
    fn prerequisites(
        &self,
        op: OperationKind,
        component: &ComponentPath,
    ) -> Result<Vec<ActionKey>> {
        let key = ActionKey::new(op, component.clone());
        self.queries.lock().unwrap().push(key.clone());
        Ok(self.prereqs.get(&key).cloned().unwrap_or_default())
    }

    fn needed_in_image(&self, op: OperationKind, _component: &ComponentPath) -> bool {
        self.all_in_image || op.needed_in_image()
    }

    fn already_done(&self, op: OperationKind, component: &ComponentPath) -> bool {
        self.done.contains(&ActionKey::new(op, component.clone()))
    }
}

/// Recording performer with scripted failures.
///
/// `perform` failures are per-key and unconditional; `perform_with_restarts`
/// succeeds unless the key is also in the retry-failure set. Both record
/// their calls, so tests can assert call order and at-most-once execution.
pub struct FakePerformer {
    fail_perform: HashSet<ActionKey>,
    fail_retry: HashSet<ActionKey>,
    performed: Mutex<Vec<ActionKey>>,
    retried: Mutex<Vec<ActionKey>>,
    marked: Mutex<Vec<ActionKey>>,
}

impl FakePerformer {
    pub fn new() -> Self {
        Self {
            fail_perform: HashSet::new(),
            fail_retry: HashSet::new(),
            performed: Mutex::new(Vec::new()),
            retried: Mutex::new(Vec::new()),
            marked: Mutex::new(Vec::new()),
        }
    }

    /// Make `perform` fail for this key. The foreground retry still
    /// succeeds unless [`failing_retry`](Self::failing_retry) is also set.
    pub fn failing(mut self, key: ActionKey) -> Self {
        self.fail_perform.insert(key);
        self
    }

    /// Make `perform_with_restarts` fail for this key too.
    pub fn failing_retry(mut self, key: ActionKey) -> Self {
        self.fail_retry.insert(key);
        self
    }

    pub fn performed(&self) -> Vec<ActionKey> {
        self.performed.lock().unwrap().clone()
    }

    pub fn retried(&self) -> Vec<ActionKey> {
        self.retried.lock().unwrap().clone()
    }

    pub fn marked_done(&self) -> Vec<ActionKey> {
        self.marked.lock().unwrap().clone()
    }
}

impl Performer for FakePerformer {
    fn perform(&self, op: OperationKind, component: &ComponentPath) -> Result<Option<String>> {
        let key = ActionKey::new(op, component.clone());
        self.performed.lock().unwrap().push(key.clone());
        if self.fail_perform.contains(&key) {
            bail!("injected failure for {key}");
        }
        Ok(None)
    }

    fn perform_with_restarts(
        &self,
        op: OperationKind,
        component: &ComponentPath,
    ) -> Result<Option<String>> {
        let key = ActionKey::new(op, component.clone());
        self.retried.lock().unwrap().push(key.clone());
        if self.fail_retry.contains(&key) {
            bail!("injected retry failure for {key}");
        }
        Ok(None)
    }

    fn mark_operation_done(&self, op: OperationKind, component: &ComponentPath) -> Result<()> {
        self.marked
            .lock()
            .unwrap()
            .push(ActionKey::new(op, component.clone()));
        Ok(())
    }
}

/// Assert that `order` performs every dependency before its dependent.
pub fn assert_topological(order: &[ActionKey], edges: &[(ActionKey, ActionKey)]) {
    let position: HashMap<&ActionKey, usize> =
        order.iter().enumerate().map(|(i, k)| (k, i)).collect();
    for (dependent, prerequisite) in edges {
        let (Some(&dep_pos), Some(&pre_pos)) =
            (position.get(dependent), position.get(prerequisite))
        else {
            panic!("edge endpoints missing from order: {dependent} / {prerequisite}");
        };
        assert!(
            pre_pos < dep_pos,
            "{prerequisite} must complete before {dependent} (order: {order:?})"
        );
    }
}
