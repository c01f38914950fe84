// src/plan/mod.rs

pub mod builder;
pub mod graph;

pub use builder::{ActionMeta, ActionStatus, Plan, PlanBuilder};
pub use graph::{DepGraph, MarkDone};
