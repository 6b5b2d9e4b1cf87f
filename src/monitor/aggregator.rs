//! Candidate aggregation. This module is responsible for composing the peer
//! sources in priority order into a deduplicated, bounded list of enode URLs.

use crate::{
    node::Node,
    probe::Prober,
    rpc::PeerInfo,
    source::{LiveFilter, Source},
};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Aggregator {
    whitelist: Arc<dyn Source>,
    directory: Arc<dyn Source>,
    prober: Arc<dyn Prober>,
    rounds: usize,
}

/// The candidates accepted so far in a tick.
struct Accepted {
    filter: LiveFilter,
    urls: Vec<String>,
}

impl Accepted {
    fn push(&mut self, node: Node) {
        if self.filter.insert(node.id.clone()) {
            self.urls.push(node.url());
        }
    }
}

impl Aggregator {
    /// Creates an aggregator consulting the whitelist first and then up to
    /// `rounds` pages of the directory.
    pub fn new(
        whitelist: Arc<dyn Source>,
        directory: Arc<dyn Source>,
        prober: Arc<dyn Prober>,
        rounds: usize,
    ) -> Self {
        Self {
            whitelist,
            directory,
            prober,
            rounds,
        }
    }

    /// Collects at most `desired` enode URLs of nodes that are not already
    /// peers. Fewer URLs are returned when the sources run dry.
    ///
    /// Whitelisted nodes are trusted as-is, while directory nodes are only
    /// accepted once they have been reached over TCP.
    pub async fn aggregate(&self, peers: &[PeerInfo], desired: usize) -> Vec<String> {
        if desired == 0 {
            return Vec::new();
        }

        let mut accepted = Accepted {
            filter: peers.iter().map(PeerInfo::node_id).collect(),
            urls: Vec::new(),
        };

        let whitelisted = self.whitelist.fetch(0, &accepted.filter).await;
        for node in whitelisted.into_iter().flatten() {
            accepted.push(node);
        }
        tracing::debug!(accepted = accepted.urls.len(), "consulted whitelist");
        if accepted.urls.len() >= desired {
            accepted.urls.truncate(desired);
            return accepted.urls;
        }

        for round in 0..self.rounds {
            let candidates = self.directory.fetch(round, &accepted.filter).await;
            for node in self.probe_round(candidates).await {
                accepted.push(node);
            }
            tracing::debug!(
                round, accepted = accepted.urls.len(), filtered = accepted.filter.len(),
                "consulted directory"
            );
            if accepted.urls.len() >= desired {
                accepted.urls.truncate(desired);
                break;
            }
        }

        accepted.urls
    }

    /// Probes a round of candidates in parallel, one task per candidate. The
    /// round completes once every task has reported, and the surviving nodes
    /// are returned in the order their probes completed.
    async fn probe_round(&self, candidates: Vec<Option<Node>>) -> Vec<Node> {
        if candidates.is_empty() {
            return Vec::new();
        }

        // Every slot reports exactly once, so sends never wait on capacity.
        let (reports, mut received) = mpsc::channel(candidates.len());
        for candidate in candidates {
            let reports = reports.clone();
            match candidate {
                Some(node) => {
                    let prober = self.prober.clone();
                    tokio::spawn(async move {
                        let _ = reports.send(prober.probe(node).await).await;
                    });
                }
                None => {
                    let _ = reports.send(None).await;
                }
            }
        }
        drop(reports);

        let mut survivors = Vec::new();
        while let Some(report) = received.recv().await {
            survivors.extend(report);
        }
        survivors
    }
}
