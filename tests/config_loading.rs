// tests/config_loading.rs

use std::error::Error;

use forkdag::action::OperationKind;
use forkdag::config::ConfigFile;
use forkdag::exec::{CommandPerformer, ConfigOracle};
use forkdag::oracle::DependencyOracle;
use forkdag::perform::Performer;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

fn write_plan(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("Forkdag.toml");
    std::fs::write(&path, contents).expect("writing plan file");
    path
}

const SAMPLE: &str = r#"
[build]
system = "app"
max_forks = 3

[unit.base]
compile = "echo compile base"
load = "echo load base"

[unit.core]
compile = "echo compile core"
load = "echo load core"
after = ["base"]

[unit.tools]
compile = "echo compile tools"
after = ["base"]
"#;

#[test]
fn sample_plan_loads_with_defaults_applied() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_plan(&dir, SAMPLE);

    let cfg = ConfigFile::load(&path)?;
    assert_eq!(cfg.build.system, "app");
    assert_eq!(cfg.build.max_forks, 3);
    assert_eq!(cfg.build.output_dir, ".forkdag");
    assert_eq!(cfg.unit.len(), 3);
    assert_eq!(cfg.unit["core"].after, vec!["base"]);
    assert!(cfg.unit["tools"].load.is_none());
    Ok(())
}

#[test]
fn missing_build_section_falls_back_to_defaults() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_plan(&dir, "[unit.solo]\ncompile = \"true\"\n");

    let cfg = ConfigFile::load(&path)?;
    assert_eq!(cfg.build.system, "main");
    assert_eq!(cfg.build.max_forks, 16);
    Ok(())
}

#[test]
fn empty_plan_is_rejected() -> TestResult {
    let err = ConfigFile::default().validate().unwrap_err();
    assert!(err.to_string().contains("at least one [unit"));
    Ok(())
}

#[test]
fn unknown_dependency_is_rejected() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_plan(
        &dir,
        "[unit.a]\ncompile = \"true\"\nafter = [\"ghost\"]\n",
    );
    let err = ConfigFile::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("unknown unit 'ghost'"));
    Ok(())
}

#[test]
fn self_dependency_is_rejected() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_plan(&dir, "[unit.a]\ncompile = \"true\"\nafter = [\"a\"]\n");
    let err = ConfigFile::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("unit 'a' lists itself"));
    Ok(())
}

#[test]
fn dependency_cycle_is_rejected() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_plan(
        &dir,
        "[unit.a]\ncompile = \"true\"\nafter = [\"b\"]\n\n[unit.b]\ncompile = \"true\"\nafter = [\"a\"]\n",
    );
    let err = ConfigFile::load(&path).unwrap_err();
    let message = format!("{err:#}");
    // Every unit on the cycle is named, not just one of them.
    assert!(message.contains("cycle"), "message: {message}");
    assert!(message.contains("a -> b"), "message: {message}");
    Ok(())
}

#[test]
fn names_unfit_for_breadcrumbs_are_rejected() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_plan(&dir, "[unit.\"has space\"]\ncompile = \"true\"\n");
    let err = ConfigFile::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("invalid unit name"));
    Ok(())
}

#[test]
fn zero_max_forks_is_rejected() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_plan(&dir, "[build]\nmax_forks = 0\n\n[unit.a]\ncompile = \"true\"\n");
    let err = ConfigFile::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("max_forks"));
    Ok(())
}

#[test]
fn oracle_derives_load_and_compile_prerequisites() -> TestResult {
    let dir = TempDir::new()?;
    let cfg = ConfigFile::load(write_plan(&dir, SAMPLE))?;
    let oracle = ConfigOracle::new(cfg);

    let roots = oracle.root_requests(&[])?;
    // `core` and `tools` are the units nothing depends on.
    let mut root_names: Vec<String> = roots.iter().map(|k| k.to_string()).collect();
    root_names.sort();
    assert_eq!(root_names, vec!["compile app/tools", "load app/core"]);

    let load_core = roots
        .iter()
        .find(|k| k.op == OperationKind::Load)
        .expect("load root");
    let prereqs = oracle.prerequisites(load_core.op, &load_core.component)?;
    let names: Vec<String> = prereqs.iter().map(|k| k.to_string()).collect();
    assert_eq!(names, vec!["compile app/core", "load app/base"]);
    Ok(())
}

#[test]
fn oracle_rejects_unknown_targets() -> TestResult {
    let dir = TempDir::new()?;
    let cfg = ConfigFile::load(write_plan(&dir, SAMPLE))?;
    let oracle = ConfigOracle::new(cfg);

    let err = oracle.root_requests(&["ghost".to_string()]).unwrap_err();
    assert!(err.to_string().contains("unknown target unit 'ghost'"));
    Ok(())
}

#[test]
fn command_performer_runs_the_shell_and_captures_output() -> TestResult {
    let dir = TempDir::new()?;
    let cfg = ConfigFile::load(write_plan(&dir, SAMPLE))?;
    let oracle = ConfigOracle::new(cfg.clone());
    let performer = CommandPerformer::new(cfg, dir.path());

    let roots = oracle.root_requests(&["base".to_string()])?;
    let result = performer.perform(OperationKind::Compile, &roots[0].component)?;
    assert_eq!(result.as_deref(), Some("compile base"));

    performer.mark_operation_done(OperationKind::Compile, &roots[0].component)?;
    let log = std::fs::read_to_string(dir.path().join("state.log"))?;
    assert!(log.contains("compile app/base done at"), "log: {log}");
    Ok(())
}

#[test]
fn command_performer_reports_nonzero_exits() -> TestResult {
    let dir = TempDir::new()?;
    let cfg = ConfigFile::load(write_plan(
        &dir,
        "[unit.bad]\ncompile = \"echo oops >&2; exit 7\"\n",
    ))?;
    let oracle = ConfigOracle::new(cfg.clone());
    let performer = CommandPerformer::new(cfg, dir.path());

    let roots = oracle.root_requests(&[])?;
    let err = performer
        .perform(OperationKind::Compile, &roots[0].component)
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("oops"), "message: {message}");
    Ok(())
}

#[test]
fn parsing_alone_skips_semantic_checks() -> TestResult {
    // Cyclic, but syntactically fine: `FromStr` accepts it and `validate`
    // is what rejects it.
    let cfg: ConfigFile =
        "[unit.a]\ncompile = \"true\"\nafter = [\"b\"]\n\n[unit.b]\ncompile = \"true\"\nafter = [\"a\"]\n"
            .parse()?;
    assert!(cfg.validate().is_err());
    Ok(())
}
