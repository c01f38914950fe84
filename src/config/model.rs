// src/config/model.rs

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

/// Top-level plan file as read from TOML.
///
/// ```toml
/// [build]
/// system = "app"
/// max_forks = 8
///
/// [unit.base]
/// compile = "cc -c base.c -o out/base.o"
/// load = "cp out/base.o image/"
///
/// [unit.core]
/// compile = "cc -c core.c -o out/core.o"
/// load = "cp out/core.o image/"
/// after = ["base"]
/// ```
///
/// All `[build]` keys are optional and have defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    /// Global settings from `[build]`.
    #[serde(default)]
    pub build: BuildSection,

    /// All units from `[unit.<name>]`, keyed by unit name.
    #[serde(default)]
    pub unit: BTreeMap<String, UnitConfig>,
}

impl FromStr for ConfigFile {
    type Err = toml::de::Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        toml::from_str(text)
    }
}

impl ConfigFile {
    /// Read `path`, parse it, and run semantic validation — the one entry
    /// point the rest of the crate uses.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let cfg: Self = std::fs::read_to_string(path)
            .with_context(|| format!("reading plan file {}", path.display()))?
            .parse()
            .with_context(|| format!("parsing plan file {}", path.display()))?;
        cfg.validate()
            .with_context(|| format!("invalid plan file {}", path.display()))?;
        Ok(cfg)
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    /// System name: the first segment of every component path.
    #[serde(default = "default_system")]
    pub system: String,

    /// Upper bound on simultaneous workers.
    #[serde(default = "default_max_forks")]
    pub max_forks: usize,

    /// Directory for result files and the build-state log.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Path to record breadcrumbs to; recording disabled when unset.
    #[serde(default)]
    pub breadcrumbs_to: Option<String>,

    /// Path to replay breadcrumbs from; replay disabled when unset.
    #[serde(default)]
    pub using_breadcrumbs_from: Option<String>,
}

fn default_system() -> String {
    "main".to_string()
}

fn default_max_forks() -> usize {
    16
}

fn default_output_dir() -> String {
    ".forkdag".to_string()
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            system: default_system(),
            max_forks: default_max_forks(),
            output_dir: default_output_dir(),
            breadcrumbs_to: None,
            using_breadcrumbs_from: None,
        }
    }
}

/// `[unit.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitConfig {
    /// Shell command that compiles the unit. Runs in a forked worker.
    pub compile: String,

    /// Shell command that loads the compiled unit into the image. Runs in
    /// the coordinator. A unit without one is compile-only.
    #[serde(default)]
    pub load: Option<String>,

    /// Units that must reach their goal state before this one compiles.
    #[serde(default)]
    pub after: Vec<String>,
}
