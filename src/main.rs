//! fieldflow CLI entry point.

use anyhow::Context;
use clap::Parser;

use fieldflow::cli::commands;
use fieldflow::cli::{handle_error, Cli, Commands};
use fieldflow::infrastructure::config::ConfigLoader;
use fieldflow::infrastructure::logging::LoggerImpl;
use fieldflow::services::Engine;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        handle_error(err, json);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ConfigLoader::load_optional(cli.config.as_deref())?;
    let _logger = LoggerImpl::init(&config.logging)?;

    if matches!(cli.command, Commands::Migrate) {
        return commands::migrate::execute(&config, cli.json).await;
    }

    let engine = Engine::open(config).await.context("Failed to open automation engine")?;

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::execute(args, &engine).await,
        Commands::Sweep => commands::sweep::execute(&engine, cli.json).await,
        Commands::Worker(args) => commands::worker::execute(args, &engine, cli.json).await,
        Commands::Ingest(args) => commands::ingest::execute(args, &engine, cli.json).await,
        Commands::Rules(args) => commands::rules::execute(args, &engine, cli.json).await,
        Commands::Queue(args) => commands::queue::execute(args, &engine, cli.json).await,
        Commands::Migrate => Ok(()),
    };

    engine.pool.close().await;
    result
}
