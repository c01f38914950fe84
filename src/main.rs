// src/main.rs

use forkdag::{cli, logging, run};

fn main() {
    if let Err(err) = run_main() {
        eprintln!("forkdag error: {err}");
        std::process::exit(1);
    }
}

fn run_main() -> forkdag::errors::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args)
}
