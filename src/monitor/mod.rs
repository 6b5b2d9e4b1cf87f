//! Peer set monitor for a local Ethereum node.
//!
//! The monitor periodically checks the node's peer count and, when it falls
//! to the configured minimum, tops the peer set back up with candidates from
//! the peer sources.

mod aggregator;
#[cfg(test)]
mod testing;

pub use self::aggregator::Aggregator;
use crate::{
    config::Config,
    probe::TcpProber,
    rpc::{self, Admin, Connect, Dialer},
    source::{self, Directory, Whitelist},
};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    time::{self, Instant},
};

/// An error checking the peer set.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to dial node: {0}")]
    Dial(rpc::Error),
    #[error("failed to fetch current peers: {0}")]
    Peers(rpc::Error),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("empty candidate list")]
    EmptyCandidateList,
}

/// The monitor run configuration.
#[derive(Clone, Copy, Debug)]
pub struct Run {
    /// The peer count at or below which peers are added.
    pub min_peer_count: usize,
    /// The peer count to top the peer set up to.
    pub max_peer_count: usize,
    /// The interval between checks.
    pub monitor_duration: Duration,
    /// The interval until the next check after a failed one.
    pub retry_duration: Duration,
    /// The time bound of each call to the node.
    pub rpc_timeout: Duration,
}

/// The control loop state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    /// Waiting for the next check.
    Idle,
    /// Checking the peer set.
    Ticking,
    /// Shutdown was requested.
    Stopping,
    /// The control loop has returned.
    Stopped,
}

/// Requests a running monitor to stop.
#[derive(Debug)]
pub struct Stop(watch::Sender<()>);

impl Stop {
    pub fn stop(self) {
        drop(self.0);
    }
}

/// Signals a running monitor that it should stop.
#[derive(Debug)]
pub struct Quit(watch::Receiver<()>);

impl Quit {
    /// Resolves once the corresponding [`Stop`] was used or dropped.
    async fn signalled(&mut self) {
        while self.0.changed().await.is_ok() {}
    }
}

/// Creates a connected shutdown pair.
pub fn shutdown() -> (Stop, Quit) {
    let (stop, quit) = watch::channel(());
    (Stop(stop), Quit(quit))
}

pub struct PeerMonitor<C> {
    node: C,
    aggregator: Aggregator,
    run: Run,
    state: watch::Sender<State>,
}

impl PeerMonitor<Dialer> {
    /// Creates a monitor for the node and sources in the configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = source::http_client(config.http_timeout)?;
        let aggregator = Aggregator::new(
            Arc::new(Whitelist::new(http.clone(), config.whitelist_url.clone())),
            Arc::new(Directory::new(
                http,
                config.directory_url.clone(),
                config.fetch_count,
            )),
            Arc::new(TcpProber::new(config.dial_timeout)),
            config.fetch_rounds,
        );

        Ok(Self::new(
            Dialer::new(config.eth_url.clone()),
            aggregator,
            config.run(),
        ))
    }
}

impl<C> PeerMonitor<C>
where
    C: Connect,
{
    pub fn new(node: C, aggregator: Aggregator, run: Run) -> Self {
        Self {
            node,
            aggregator,
            run,
            state: watch::channel(State::Idle).0,
        }
    }

    /// Returns a receiver for observing the control loop state.
    pub fn state(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    fn transition(&self, state: State) {
        tracing::trace!(?state, "monitor state");
        self.state.send_replace(state);
    }

    /// Runs the monitor until `quit` is signalled. The first check happens
    /// immediately. A check in progress when `quit` is signalled is completed
    /// before returning.
    pub async fn run(&self, mut quit: Quit) {
        let timer = time::sleep(Duration::ZERO);
        tokio::pin!(timer);

        self.transition(State::Idle);
        loop {
            tokio::select! {
                biased;
                _ = quit.signalled() => break,
                _ = &mut timer => {
                    self.transition(State::Ticking);
                    let delay = self.tick().await;
                    timer.as_mut().reset(Instant::now() + delay);
                    self.transition(State::Idle);
                }
            }
        }

        self.transition(State::Stopping);
        tracing::info!("peer monitor stopped");
        self.transition(State::Stopped);
    }

    /// Checks the peer set once, returning the delay until the next check.
    pub async fn tick(&self) -> Duration {
        tracing::info!("checking peer set");
        match self.run_once().await {
            Ok(()) => self.run.monitor_duration,
            Err(err) => {
                tracing::error!(%err, "failed to check peer set, retrying");
                self.run.retry_duration
            }
        }
    }

    /// Checks the peer set, adding peers to the node if it has too few.
    pub async fn run_once(&self) -> Result<(), Error> {
        let mut client = bounded(self.run.rpc_timeout, "dial", self.node.connect())
            .await?
            .map_err(Error::Dial)?;
        let result = self.top_up(&mut client).await;
        client.close().await;
        result
    }

    async fn top_up(&self, client: &mut C::Client) -> Result<(), Error> {
        let peers = bounded(self.run.rpc_timeout, "fetching peers", client.peers())
            .await?
            .map_err(Error::Peers)?;

        tracing::info!(count = peers.len(), "current peers");
        for peer in &peers {
            tracing::debug!(id = %peer.node_id(), name = ?peer.name, "peer");
        }
        if peers.len() > self.run.min_peer_count {
            tracing::info!(min_peer_count = self.run.min_peer_count, "no action needed");
            return Ok(());
        }

        let desired = self.run.max_peer_count.saturating_sub(peers.len());
        let urls = self.aggregator.aggregate(&peers, desired).await;
        if urls.is_empty() {
            return Err(Error::EmptyCandidateList);
        }

        tracing::debug!(count = urls.len(), "adding peers");
        match bounded(self.run.rpc_timeout, "adding peers", client.batch_add_peer(&urls)).await {
            Ok(Ok(())) => tracing::info!(count = urls.len(), "added peers"),
            Ok(Err(err)) => tracing::error!(%err, "failed to batch add peers"),
            Err(err) => tracing::error!(%err, "failed to batch add peers"),
        }
        Ok(())
    }
}

/// Bounds a call to the node in time.
async fn bounded<F>(timeout: Duration, phase: &'static str, call: F) -> Result<F::Output, Error>
where
    F: Future,
{
    time::timeout(timeout, call)
        .await
        .map_err(|_| Error::Timeout(phase))
}
