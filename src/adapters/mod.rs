//! Infrastructure adapters: SQLite persistence, integration executors and
//! the HTTP surface.

pub mod http;
pub mod integrations;
pub mod sqlite;
