mod config;
mod monitor;
mod node;
mod probe;
mod rpc;
mod source;
#[cfg(test)]
mod testing;

use self::{
    config::Config,
    monitor::{PeerMonitor, State},
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, time::Duration};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(about = "Keeps the peer set of a local Ethereum node topped up")]
struct Arguments {
    /// Path to a TOML configuration file.
    #[clap(short, long, env = "PEER_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// The node endpoint: an IPC socket path, or an HTTP or WebSocket URL.
    #[clap(long = "eth.url", global = true)]
    eth_url: Option<String>,

    /// The peer count at or below which peers are added.
    #[clap(long = "peercount.min", global = true)]
    min_peer_count: Option<usize>,

    /// The peer count to top the peer set up to.
    #[clap(long = "peercount.max", global = true)]
    max_peer_count: Option<usize>,

    /// The interval between checks, for example "1h" or "30m".
    #[clap(long = "monitor.duration", global = true, value_parser = humantime::parse_duration)]
    monitor_duration: Option<Duration>,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor the peer set until interrupted. This is the default.
    Run,
    /// Check the peer set once and exit.
    Once,
}

impl Arguments {
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(eth_url) = &self.eth_url {
            config.eth_url = eth_url.clone();
        }
        if let Some(min_peer_count) = self.min_peer_count {
            config.min_peer_count = min_peer_count;
        }
        if let Some(max_peer_count) = self.max_peer_count {
            config.max_peer_count = max_peer_count;
        }
        if let Some(monitor_duration) = self.monitor_duration {
            config.monitor_duration = monitor_duration;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Arguments::parse();
    let config = args.config()?;
    tracing::info!("{config:#?}");

    let monitor = PeerMonitor::from_config(&config)?;
    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let (stop, quit) = monitor::shutdown();
            let state = monitor.state();
            let signal = shutdown_signal()?;
            tokio::spawn(async move {
                signal.await;
                if *state.borrow() == State::Ticking {
                    tracing::info!("shutting down after the check in progress");
                } else {
                    tracing::info!("shutting down");
                }
                stop.stop();
            });
            monitor.run(quit).await;
        }
        Command::Once => monitor.run_once().await?,
    }

    Ok(())
}

/// Installs the interrupt and terminate handlers, returning a future that
/// resolves on the first signal received.
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(async move {
        #[cfg(unix)]
        let terminate = terminate.recv();
        #[cfg(not(unix))]
        let terminate = std::future::pending::<Option<()>>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    tracing::error!(?err, "failed to listen for interrupt");
                }
            }
            _ = terminate => {}
        }
    })
}
