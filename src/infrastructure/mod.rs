//! Infrastructure concerns shared by the binary and the server: layered
//! configuration loading and logging setup.

pub mod config;
pub mod logging;
