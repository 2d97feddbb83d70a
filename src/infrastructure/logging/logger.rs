use anyhow::{Context, Result};
use std::io;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::domain::models::LoggingConfig;

const LOG_FILE_PREFIX: &str = "fieldflow.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installed global subscriber; keep it alive for the life of the process
/// so buffered file output is flushed on drop.
pub struct LoggerImpl {
    _guard: Option<WorkerGuard>,
}

impl LoggerImpl {
    /// Install the global subscriber described by `config`.
    ///
    /// Console output goes to stderr so `--json` command output on stdout
    /// stays machine-readable. File output is always JSON.
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let level = parse_log_level(&config.level)?;
        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if let Some(log_dir) = &config.log_dir {
            let appender = match config.rotation.as_str() {
                "hourly" => rolling::hourly(log_dir, LOG_FILE_PREFIX),
                "never" => rolling::never(log_dir, LOG_FILE_PREFIX),
                _ => rolling::daily(log_dir, LOG_FILE_PREFIX),
            };
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            guard = Some(file_guard);

            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_current_span(true)
                    .with_target(true)
                    .with_filter(env_filter(level))
                    .boxed(),
            );
        }

        if config.enable_stdout || config.log_dir.is_none() {
            let layer = if config.format == "pretty" {
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_filter(env_filter(level))
                    .boxed()
            } else {
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_current_span(true)
                    .with_target(true)
                    .with_filter(env_filter(level))
                    .boxed()
            };
            layers.push(layer);
        }

        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .context("Failed to install tracing subscriber")?;

        tracing::info!(
            level = %config.level,
            format = %config.format,
            file_output = config.log_dir.is_some(),
            "logger initialized"
        );

        Ok(Self { _guard: guard })
    }
}

/// `RUST_LOG` wins over the configured level when set.
fn env_filter(default_level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
}

/// Parse log level string to Level
fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("Invalid log level: {level}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("trace"), Ok(Level::TRACE)));
        assert!(matches!(parse_log_level("WARN"), Ok(Level::WARN)));
        assert!(matches!(parse_log_level("error"), Ok(Level::ERROR)));
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_logger_init_with_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
            log_dir: Some(dir.path().display().to_string()),
            enable_stdout: false,
            rotation: "never".to_string(),
        };

        // The global subscriber can only be installed once per process.
        let logger = LoggerImpl::init(&config).unwrap();
        assert!(logger._guard.is_some());
        assert!(LoggerImpl::init(&config).is_err());
    }
}
