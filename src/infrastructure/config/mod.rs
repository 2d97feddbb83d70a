//! Configuration management
//!
//! Hierarchical configuration using figment: defaults, project YAML files,
//! then `FIELDFLOW_` environment overrides, validated after extraction.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, ENV_PREFIX};
