// src/exec/mod.rs

pub mod command;
pub mod executor;
pub mod pool;
pub mod result_file;

pub use command::{CommandPerformer, ConfigOracle};
pub use executor::{execute, result_file_path, ExecutorOptions, ExecutorReport};
pub use pool::{Completion, ForkGate, WorkOutcome, Worker, WorkerPool};
