//! RTE Monitor
//!
//! Connects to a controller's primary interface and prints every public
//! message as JSON on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use urd_rte::{Config, ConsoleSink, FaultPolicy, MessageSink, RteClient};

#[derive(Parser)]
#[command(name = "rte_monitor")]
#[command(about = "Universal Robots realtime monitor - decoded primary interface messages as JSON")]
#[command(version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Controller host, overrides the configuration
    #[arg(long)]
    host: Option<String>,

    /// Controller port, overrides the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Also print cartesian info and raw global variable messages
    #[arg(long)]
    include_internal: bool,

    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,

    /// Exit with an error on the first fault-level message
    #[arg(long)]
    fail_on_fault: bool,
}

impl Args {
    fn load_config(&self) -> Result<Config> {
        let mut config = match (&self.config, &self.host) {
            (Some(path), _) => Config::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path))?,
            (None, Some(host)) => Config::for_host(host),
            (None, None) => {
                let path = std::env::var("DEFAULT_CONFIG_PATH")
                    .unwrap_or_else(|_| "config/default_config.yaml".to_string());
                Config::load_from_path(&path)
                    .with_context(|| format!("Failed to load config from {}", path))?
            }
        };

        if let Some(host) = &self.host {
            config.controller.host = host.clone();
        }
        if let Some(port) = self.port {
            config.controller.port = Some(port);
        }
        if self.include_internal {
            config.monitor.include_internal = Some(true);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let config = args.load_config()?;
    let faults = FaultPolicy::from_config(&config.monitor).context("Invalid ignored fault pattern")?;
    let sink = if args.pretty { ConsoleSink::pretty() } else { ConsoleSink::new() };

    info!("Universal Robots RTE Monitor");
    info!("{}", "=".repeat(50));
    info!(
        "Controller: {}:{}",
        config.controller.host,
        config.controller.port()
    );

    let mut client = RteClient::from_config(&config);
    let mut messages = client.connect().await.context("Failed to start client")?;

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break Ok(());
            }
            message = messages.next() => {
                let Some(message) = message else {
                    break Ok(());
                };

                sink.publish(&message).await?;

                if let Some(fault) = faults.check(&message) {
                    sink.publish_fault(&fault).await?;
                    if args.fail_on_fault {
                        error!("{}", fault);
                        break Err(fault);
                    }
                }
            }
        }
    };

    client.disconnect().await.context("Failed during shutdown")?;
    info!("Shutdown complete");

    outcome?;
    Ok(())
}
