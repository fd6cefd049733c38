//! Chain archiver CLI.

mod commands;
mod operator_client;

use clap::{Parser, Subcommand};
use fca_service::init_tracing;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "fca")]
#[command(about = "Chain archive snapshot tooling")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a chain export snapshot
    Create(commands::create::CreateArgs),
    /// Print the default worker configuration
    DefaultConfig,
    /// Commands for the nodelocker service
    Nodelocker {
        #[command(subcommand)]
        command: commands::locker::NodelockerCommands,
    },
    /// Commands for the index resolver service
    IndexResolver {
        #[command(subcommand)]
        command: commands::index::IndexCommands,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let logs = Arc::new(init_tracing("info"));

    let result = match cli.command {
        Commands::Create(args) => commands::create::run(args).await,
        Commands::DefaultConfig => commands::print_worker_default_config(),
        Commands::Nodelocker { command } => commands::locker::run(command, logs).await,
        Commands::IndexResolver { command } => commands::index::run(command, logs).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "command failed");
            ExitCode::FAILURE
        }
    }
}
