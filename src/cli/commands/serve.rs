//! `fieldflow serve`: HTTP endpoints, optionally with an in-process worker.

use anyhow::{anyhow, Result};
use clap::Args;

use super::{shutdown_channel, wait_for_shutdown};
use crate::adapters::http::AutomationHttpServer;
use crate::services::Engine;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Also run the queue worker loop in this process
    #[arg(long)]
    pub worker: bool,

    /// Override server.port
    #[arg(long)]
    pub port: Option<u16>,
}

pub async fn execute(args: ServeArgs, engine: &Engine) -> Result<()> {
    let mut engine = engine.clone();
    if let Some(port) = args.port {
        engine.config.server.port = port;
    }

    let shutdown = shutdown_channel();

    let worker_handle = args.worker.then(|| {
        let worker = engine.worker.clone();
        let rx = shutdown.clone();
        tokio::spawn(async move { worker.run(rx).await })
    });

    let server = AutomationHttpServer::new(&engine);
    let result = server
        .serve_with_shutdown(wait_for_shutdown(shutdown))
        .await
        .map_err(|e| anyhow!("HTTP server failed: {e}"));

    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }

    result
}
