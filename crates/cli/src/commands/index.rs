//! `index-resolver` subcommands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use fca_core::IndexServiceConfig;
use fca_service::{run_dual_listener, DualListenerConfig, IndexService, LogRegistry};
use figment::providers::{Format, Toml};
use figment::Figment;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Subcommand)]
pub enum IndexCommands {
    /// Start the service
    Run(RunArgs),
    /// Print the default configuration
    DefaultConfig,
}

#[derive(Args)]
pub struct RunArgs {
    /// Host and port the service listener binds
    #[arg(
        long,
        default_value = "localhost:5200",
        env = "FCA_INDEX_RESOLVER_SERVICE_LISTEN"
    )]
    pub service_listen: String,

    /// Host and port the operator listener binds
    #[arg(
        long,
        default_value = "localhost:5201",
        env = "FCA_INDEX_RESOLVER_OPERATOR_LISTEN"
    )]
    pub operator_listen: String,

    /// Path to the configuration file
    #[arg(
        long,
        default_value = "./config.toml",
        env = "FCA_INDEX_RESOLVER_CONFIG_PATH"
    )]
    pub config_path: String,
}

pub async fn run(command: IndexCommands, logs: Arc<LogRegistry>) -> Result<()> {
    match command {
        IndexCommands::Run(args) => run_service(args, logs).await,
        IndexCommands::DefaultConfig => {
            let config = IndexServiceConfig::default();
            print!("{}", super::config_comment(&config)?);
            Ok(())
        }
    }
}

async fn run_service(args: RunArgs, logs: Arc<LogRegistry>) -> Result<()> {
    let config = load_index_config(&args.config_path)?;
    let service = IndexService::from_config(&config, logs).await?;
    let service_router = service.setup_service();
    let operator_router = service.setup_operator();

    run_dual_listener(
        DualListenerConfig {
            service_listen: args.service_listen,
            operator_listen: args.operator_listen,
        },
        service_router,
        operator_router,
        service.readiness(),
        CancellationToken::new(),
    )
    .await?;

    Ok(())
}

fn load_index_config(path: &str) -> Result<IndexServiceConfig> {
    if !Path::new(path).exists() {
        return Ok(IndexServiceConfig::default());
    }

    Figment::new()
        .merge(Toml::file(path))
        .extract()
        .with_context(|| format!("failed to load configuration from {path}"))
}
