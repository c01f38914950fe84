// src/config/mod.rs

pub mod model;
mod validate;

pub use model::{BuildSection, ConfigFile, UnitConfig};
