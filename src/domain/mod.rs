//! Domain layer for the fieldflow automation engine
//!
//! Models, invariants and the port traits adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
