// src/exec/command.rs

//! Shell-command collaborators over the plan file: a dependency oracle
//! derived from the `[unit]` graph and a performer that runs each unit's
//! compile/load command through the shell.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

use crate::action::{ActionKey, ComponentPath, OperationKind};
use crate::config::model::{ConfigFile, UnitConfig};
use crate::oracle::DependencyOracle;
use crate::perform::Performer;

/// Dependency oracle over the `[unit]` graph.
///
/// - `load X` requires `compile X`, plus the goal action of every `after`
///   dependency.
/// - `compile X` requires the goal action of every `after` dependency.
///
/// A unit's *goal action* is `load` when it has a load command, otherwise
/// `compile`; dependents of a compile-only unit wait on its compile.
pub struct ConfigOracle {
    cfg: ConfigFile,
}

impl ConfigOracle {
    pub fn new(cfg: ConfigFile) -> Self {
        Self { cfg }
    }

    /// Root requests for the given targets, or for every unit nothing
    /// depends on when `targets` is empty.
    pub fn root_requests(&self, targets: &[String]) -> Result<Vec<ActionKey>> {
        if !targets.is_empty() {
            return targets
                .iter()
                .map(|name| {
                    self.unit(name)
                        .map(|unit| self.goal_action(name, unit))
                        .ok_or_else(|| anyhow!("unknown target unit '{name}'"))
                })
                .collect();
        }

        let depended_on: std::collections::HashSet<&str> = self
            .cfg
            .unit
            .values()
            .flat_map(|unit| unit.after.iter().map(String::as_str))
            .collect();

        Ok(self
            .cfg
            .unit
            .iter()
            .filter(|(name, _)| !depended_on.contains(name.as_str()))
            .map(|(name, unit)| self.goal_action(name, unit))
            .collect())
    }

    fn unit(&self, name: &str) -> Option<&UnitConfig> {
        self.cfg.unit.get(name)
    }

    fn component(&self, name: &str) -> ComponentPath {
        ComponentPath::new(self.cfg.build.system.as_str(), [name])
    }

    fn goal_action(&self, name: &str, unit: &UnitConfig) -> ActionKey {
        let op = if unit.load.is_some() {
            OperationKind::Load
        } else {
            OperationKind::Compile
        };
        ActionKey::new(op, self.component(name))
    }
}

impl DependencyOracle for ConfigOracle {
    fn prerequisites(
        &self,
        op: OperationKind,
        component: &ComponentPath,
    ) -> Result<Vec<ActionKey>> {
        let name = component.leaf();
        let unit = self
            .unit(name)
            .ok_or_else(|| anyhow!("unknown unit '{name}'"))?;

        let mut prereqs = Vec::new();
        if op == OperationKind::Load {
            prereqs.push(ActionKey::new(OperationKind::Compile, component.clone()));
        }
        for dep in &unit.after {
            let dep_unit = self
                .unit(dep)
                .ok_or_else(|| anyhow!("unit '{name}' depends on unknown unit '{dep}'"))?;
            prereqs.push(self.goal_action(dep, dep_unit));
        }
        Ok(prereqs)
    }
}

/// Runs unit commands through the platform shell and keeps the build-state
/// log under the output directory.
pub struct CommandPerformer {
    cfg: ConfigFile,
    state_log: PathBuf,
}

impl CommandPerformer {
    pub fn new(cfg: ConfigFile, output_dir: &Path) -> Self {
        Self {
            state_log: output_dir.join("state.log"),
            cfg,
        }
    }

    fn command_for(&self, op: OperationKind, component: &ComponentPath) -> Result<&str> {
        let name = component.leaf();
        let unit = self
            .cfg
            .unit
            .get(name)
            .ok_or_else(|| anyhow!("unknown unit '{name}'"))?;
        match op {
            OperationKind::Compile => Ok(unit.compile.as_str()),
            OperationKind::Load => unit
                .load
                .as_deref()
                .ok_or_else(|| anyhow!("unit '{name}' has no load command")),
        }
    }
}

impl Performer for CommandPerformer {
    fn perform(&self, op: OperationKind, component: &ComponentPath) -> Result<Option<String>> {
        let cmd = self.command_for(op, component)?;
        debug!(action = %op, component = %component, cmd, "running shell command");

        let output = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("spawning `{cmd}`"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("`{cmd}` exited with {}: {}", output.status, stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let trimmed = stdout.trim();
        Ok(if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        })
    }

    fn mark_operation_done(&self, op: OperationKind, component: &ComponentPath) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.state_log)
            .with_context(|| format!("opening build-state log {}", self.state_log.display()))?;
        writeln!(file, "{} {} done at {}", op.tag(), component, unix_now())
            .context("appending to build-state log")?;
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
