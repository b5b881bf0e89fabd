//! msgchain daemon: entry point for running a msgchain node.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use msgchain_node::{init_logging, load_key_file, ChainNode, LogFormat, NodeConfig};
use msgchain_rpc::RpcServer;

#[derive(Parser)]
#[command(name = "msgchain-daemon", about = "msgchain message chain node daemon")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "MSGCHAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Address the RPC server binds to.
    #[arg(long, env = "MSGCHAIN_RPC_BIND")]
    rpc_bind: Option<String>,

    /// RPC server port.
    #[arg(long, env = "MSGCHAIN_RPC_PORT")]
    rpc_port: Option<u16>,

    /// JSON file holding `{"encryption_key": "..."}`.
    #[arg(long, env = "MSGCHAIN_KEY_FILE")]
    key_file: Option<PathBuf>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "MSGCHAIN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "MSGCHAIN_LOG_FORMAT")]
    log_format: Option<String>,

    /// Enable the Prometheus `/metrics` route.
    #[arg(long, env = "MSGCHAIN_ENABLE_METRICS")]
    metrics: bool,

    /// Subcommand.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Start the node.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Print the effective configuration as TOML and exit.
    #[command(name = "config")]
    Config,
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node.
    Run,
}

impl Cli {
    /// File settings (or defaults) with CLI flags and env vars applied on top.
    fn resolve_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_toml_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => NodeConfig::default(),
        };

        if let Some(bind) = &self.rpc_bind {
            config.rpc_bind = bind.clone();
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if let Some(key_file) = &self.key_file {
            config.key_file = key_file.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        if self.metrics {
            config.enable_metrics = true;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml_string()?);
        }
        Command::Node { action } => match action {
            NodeAction::Run => run(config).await?,
        },
    }

    Ok(())
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let format: LogFormat = config.log_format.parse()?;
    init_logging(format, &config.log_level)?;

    tracing::info!(key_file = %config.key_file.display(), "loading encryption key");
    let key = load_key_file(&config.key_file)
        .with_context(|| format!("loading key file {}", config.key_file.display()))?;

    tracing::info!(
        rpc = %format!("{}:{}", config.rpc_bind, config.rpc_port),
        metrics = config.enable_metrics,
        "msgchain daemon starting"
    );

    let rpc = RpcServer::new(config.rpc_bind.clone(), config.rpc_port);
    let node = Arc::new(ChainNode::new(config, key)?);
    node.start()?;

    let rpc_node = Arc::clone(&node);
    let rpc_shutdown = node.shutdown.subscribe();
    let rpc_handle = tokio::spawn(async move {
        if let Err(e) = rpc.start(rpc_node, rpc_shutdown).await {
            tracing::error!(error = %e, "RPC server failed");
        }
    });

    node.shutdown.wait_for_signal().await;
    tracing::info!("shutdown signal received, stopping node");
    node.stop().await?;
    let _ = rpc_handle.await;

    tracing::info!("msgchain daemon exited cleanly");
    Ok(())
}
