//! Structured logging using tracing and tracing-subscriber, with optional
//! rolling JSON files via tracing-appender.

mod logger;

pub use logger::LoggerImpl;
