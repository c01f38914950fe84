// src/breadcrumb.rs

//! Append-only record of performed actions, and the replay driver.
//!
//! Format: a leading comment line `;; Breadcrumbs`, then one record per
//! line, `(<kind-tag> <system-name> <path-component>*)`. UTF-8, trailing
//! newline. The file lets a build whose parallel schedule was
//! non-deterministic be re-executed deterministically.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::action::ActionKey;
use crate::errors::{ForkdagError, Result};
use crate::plan::Plan;

/// Writes breadcrumb records as actions complete, flushing each one so the
/// trail survives a crashed coordinator.
pub struct BreadcrumbWriter {
    file: File,
}

impl BreadcrumbWriter {
    /// Open `path` (truncating any previous trail) and write the header.
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = File::create(path)
            .with_context(|| format!("opening breadcrumb file {}", path.display()))?;
        writeln!(file, ";; Breadcrumbs").context("writing breadcrumb header")?;
        file.flush().context("flushing breadcrumb header")?;
        Ok(Self { file })
    }

    /// Append one record and flush.
    pub fn record(&mut self, key: &ActionKey) -> Result<()> {
        let (tag, segments) = key.reify();
        let mut line = String::from(tag);
        for segment in segments {
            line.push(' ');
            line.push_str(segment);
        }
        writeln!(self.file, "({line})").context("writing breadcrumb record")?;
        self.file.flush().context("flushing breadcrumb record")?;
        Ok(())
    }
}

/// Read a breadcrumb file back into the recorded action sequence.
/// Comment lines (leading `;`) and blank lines are skipped.
pub fn read_breadcrumbs(path: &Path) -> Result<Vec<ActionKey>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading breadcrumbs from {}", path.display()))?;

    let mut actions = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        let action = parse_record(line).ok_or_else(|| {
            ForkdagError::Config(format!(
                "{}:{}: invalid breadcrumb record: {raw}",
                path.display(),
                lineno + 1
            ))
        })?;
        actions.push(action);
    }
    Ok(actions)
}

fn parse_record(line: &str) -> Option<ActionKey> {
    let inner = line.strip_prefix('(')?.strip_suffix(')')?;
    let mut words = inner.split_whitespace();
    let tag = words.next()?;
    let segments: Vec<&str> = words.collect();
    ActionKey::from_reified(tag, &segments)
}

/// Build the synthetic replay plan: file order becomes the execution order.
///
/// Each action's sole prerequisite is its predecessor, so the executor
/// performs the sequence exactly as recorded without consulting any
/// dependency oracle.
pub fn replay_plan(actions: &[ActionKey]) -> Plan {
    info!(actions = actions.len(), "building replay plan from breadcrumbs");
    Plan::from_sequence(actions)
}
