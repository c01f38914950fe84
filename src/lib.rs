// src/lib.rs

pub mod action;
pub mod breadcrumb;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod oracle;
pub mod perform;
pub mod plan;

use std::path::PathBuf;

use tracing::info;

use crate::cli::CliArgs;
use crate::config::ConfigFile;
use crate::errors::Result;
use crate::exec::{execute, CommandPerformer, ConfigOracle, ExecutorOptions, ForkGate};
use crate::perform::Performer;
use crate::plan::{Plan, PlanBuilder};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - plan-file loading and validation
/// - plan construction (or breadcrumb replay)
/// - the executor
pub fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = ConfigFile::load(&config_path)?;

    let output_dir = PathBuf::from(&cfg.build.output_dir);
    let max_forks = args.max_forks.unwrap_or(cfg.build.max_forks);
    let fork_gate = if args.serial {
        ForkGate::Never
    } else {
        ForkGate::CheckThreads
    };
    let breadcrumbs_to = args
        .breadcrumbs_to
        .clone()
        .or_else(|| cfg.build.breadcrumbs_to.clone())
        .map(PathBuf::from);
    let replay_from = args
        .replay
        .clone()
        .or_else(|| cfg.build.using_breadcrumbs_from.clone())
        .map(PathBuf::from);

    let oracle = ConfigOracle::new(cfg.clone());
    let performer = CommandPerformer::new(cfg, &output_dir);

    let plan = match replay_from {
        Some(path) => {
            let actions = breadcrumb::read_breadcrumbs(&path)?;
            breadcrumb::replay_plan(&actions)
        }
        None => {
            let roots = oracle.root_requests(&args.targets)?;
            PlanBuilder::build_many(&oracle, &roots)?
        }
    };

    if args.dry_run {
        print_dry_run(&plan, &performer);
        return Ok(());
    }

    let options = ExecutorOptions {
        max_forks,
        fork_gate,
        output_dir,
        breadcrumbs_to,
    };
    let report = execute(plan, &performer, options)?;
    info!(
        performed = report.performed,
        skipped = report.skipped,
        forks = report.forks_spawned,
        "build finished"
    );
    Ok(())
}

/// Dry-run output: the plan's actions in dependency-safe order.
fn print_dry_run(plan: &Plan, performer: &CommandPerformer) {
    println!("forkdag dry-run");
    println!("actions ({}):", plan.action_count());
    for key in plan.all_actions() {
        println!(
            "  - {}",
            performer.operation_description(key.op, &key.component)
        );
    }
}
