//! `nodelocker` subcommands: run the service, talk to a running one.

use crate::operator_client::OperatorClient;
use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use fca_service::{run_dual_listener, DualListenerConfig, LockerService, LogRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Subcommand)]
pub enum NodelockerCommands {
    /// Start the service
    Run(RunArgs),
    /// Interact with a running service through the operator JSON-RPC api
    Operator {
        #[command(flatten)]
        api: OperatorApiArgs,
        #[command(subcommand)]
        command: OperatorCommands,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Host and port the service listener binds
    #[arg(
        long,
        default_value = "localhost:5100",
        env = "FCA_NODELOCKER_SERVICE_LISTEN"
    )]
    pub service_listen: String,

    /// Host and port the operator listener binds
    #[arg(
        long,
        default_value = "localhost:5101",
        env = "FCA_NODELOCKER_OPERATOR_LISTEN"
    )]
    pub operator_listen: String,
}

#[derive(Args)]
pub struct OperatorApiArgs {
    /// Host and port of the operator api
    #[arg(
        long,
        default_value = "http://localhost:5101",
        env = "FCA_NODELOCKER_OPERATOR_API"
    )]
    pub operator_api: String,
}

#[derive(Subcommand)]
pub enum OperatorCommands {
    /// List current locks
    List,
    /// Acquire or renew a lock directly
    Lock {
        peer_id: String,
        secret: String,
    },
    /// Print local and remote version
    Version,
    /// List available log subsystems
    LogList,
    /// Set the log level, optionally limited to specific subsystems
    LogSetLevel {
        /// Limit to a log subsystem; may be given multiple times
        #[arg(long = "logger")]
        loggers: Vec<String>,
        level: String,
    },
}

pub async fn run(command: NodelockerCommands, logs: Arc<LogRegistry>) -> Result<()> {
    match command {
        NodelockerCommands::Run(args) => run_service(args, logs).await,
        NodelockerCommands::Operator { api, command } => {
            let client = OperatorClient::new(&api.operator_api)?;
            run_operator(&client, command).await
        }
    }
}

async fn run_service(args: RunArgs, logs: Arc<LogRegistry>) -> Result<()> {
    let service = LockerService::new(logs);
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

async fn run_operator(client: &OperatorClient, command: OperatorCommands) -> Result<()> {
    match command {
        OperatorCommands::List => {
            for (i, lock) in client.fetch_locks().await?.iter().enumerate() {
                println!("{i}\t{}\t{}", lock.peer_id, lock.expiry);
            }
        }
        OperatorCommands::Lock { peer_id, secret } => {
            let lock = client.lock(&peer_id, &secret).await?;
            println!("{}\t{}\t{}", lock.peer_id, lock.acquired, lock.expiry);
        }
        OperatorCommands::Version => {
            println!("local:  {}", env!("CARGO_PKG_VERSION"));
            println!("remote: {}", client.version().await?);
        }
        OperatorCommands::LogList => {
            for subsystem in client.log_list().await? {
                println!("{subsystem}");
            }
        }
        OperatorCommands::LogSetLevel { loggers, level } => {
            if level.is_empty() {
                bail!("level is required");
            }

            let loggers = if loggers.is_empty() {
                client.log_list().await?
            } else {
                loggers
            };

            for logger in loggers {
                client.log_set_level(&logger, &level).await?;
            }
        }
    }

    Ok(())
}
