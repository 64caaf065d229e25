//! dockloop CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use dockloop::cli::{commands, handle_error, Cli, Commands};
use dockloop::infrastructure::config::ConfigLoader;
use dockloop::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match ConfigLoader::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => return handle_error(&err, cli.json),
    };

    let _logger = match LoggerImpl::init(&LogConfig::from_settings(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => return handle_error(&err, cli.json),
    };

    let result = match cli.command {
        Commands::Run {
            ref subject,
            max_rounds,
        } => commands::run::execute(subject, max_rounds, config, cli.json).await,
        Commands::Resume => commands::resume::execute(config, cli.json).await,
        Commands::Status { top } => commands::status::execute(top, &config, cli.json).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => handle_error(&err, cli.json),
    }
}
