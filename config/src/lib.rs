//! Configuration for the MySQL loader.
//!
//! Holds the resolved [`shared::TargetConfig`] handed to the engine, its validation rules and
//! the loader that merges a configuration file with environment variable overrides.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config};
