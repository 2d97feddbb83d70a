//! HTTP surface: the periodic invocation endpoint plus event ingestion and
//! worker drain for producers that cannot link the engine directly.

mod auth;
mod error;
mod server;

pub use error::{ApiError, ErrorResponse};
pub use server::{build_router, AutomationHttpServer};
