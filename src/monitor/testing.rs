//! In-memory stand-ins for the node, the peer sources and the prober.

use crate::{
    node::{Node, NodeId},
    probe::Prober,
    rpc::{self, Admin, Connect, PeerInfo},
    source::{LiveFilter, Source},
};
use alloy::rpc::json_rpc::ErrorPayload;
use async_trait::async_trait;
use std::{
    collections::HashSet,
    net::{IpAddr, Ipv4Addr},
    sync::{Arc, Mutex},
    time::Duration,
};

/// Returns a candidate with the given identifier.
pub fn candidate(id: &str) -> Node {
    Node::new(id, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 30303)
}

pub fn peers(ids: &[&str]) -> Vec<PeerInfo> {
    ids.iter().copied().map(peer).collect()
}

fn peer(id: &str) -> PeerInfo {
    PeerInfo {
        id: NodeId::from(id),
        enode: None,
        name: None,
    }
}

/// A record of the order in which sources were consulted.
#[derive(Clone, Debug, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// A source serving fixed rounds of candidates. Like the real sources, it
/// reports filtered candidates as empty slots.
pub struct FakeSource {
    name: &'static str,
    log: Log,
    rounds: Vec<Vec<Node>>,
}

impl FakeSource {
    pub fn whitelist(log: &Log, nodes: Vec<Node>) -> Arc<Self> {
        Arc::new(Self {
            name: "whitelist",
            log: log.clone(),
            rounds: vec![nodes],
        })
    }

    pub fn directory(log: &Log, rounds: Vec<Vec<Node>>) -> Arc<Self> {
        Arc::new(Self {
            name: "directory",
            log: log.clone(),
            rounds,
        })
    }
}

#[async_trait]
impl Source for FakeSource {
    async fn fetch(&self, round: usize, filter: &LiveFilter) -> Vec<Option<Node>> {
        let round = match self.name {
            "whitelist" => {
                self.log.push(self.name.to_owned());
                0
            }
            _ => {
                self.log.push(format!("{} {round}", self.name));
                round
            }
        };

        self.rounds
            .get(round)
            .into_iter()
            .flatten()
            .map(|node| (!filter.contains(&node.id)).then(|| node.clone()))
            .collect()
    }
}

/// A prober that reaches a fixed set of nodes.
pub struct FakeProber {
    reachable: HashSet<NodeId>,
    delay: bool,
}

impl FakeProber {
    pub fn reachable(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            reachable: ids.iter().copied().map(NodeId::from).collect(),
            delay: false,
        })
    }

    /// Makes probes take varying amounts of time, so they complete out of
    /// order.
    pub fn with_delay(self: Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            reachable: self.reachable.clone(),
            delay: true,
        })
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, node: Node) -> Option<Node> {
        if self.delay {
            let millis = node.id.as_str().bytes().map(u64::from).sum::<u64>() % 7;
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
        self.reachable.contains(&node.id).then_some(node)
    }
}

#[derive(Debug, Default)]
struct NodeState {
    peers: Vec<PeerInfo>,
    batches: Vec<Vec<String>>,
    connects: usize,
    answered: usize,
    delay: Option<Duration>,
    unreachable: bool,
    rejecting: bool,
}

/// A node that accepts every peer it is asked to add.
#[derive(Clone, Debug, Default)]
pub struct FakeNode(Arc<Mutex<NodeState>>);

impl FakeNode {
    pub fn with_peers(ids: &[&str]) -> Self {
        Self(Arc::new(Mutex::new(NodeState {
            peers: peers(ids),
            ..Default::default()
        })))
    }

    pub fn unreachable() -> Self {
        Self(Arc::new(Mutex::new(NodeState {
            unreachable: true,
            ..Default::default()
        })))
    }

    /// Makes the node report an error for every added peer after recording
    /// the batch.
    pub fn rejecting_batches(self) -> Self {
        self.0.lock().unwrap().rejecting = true;
        self
    }

    /// Makes the node take `delay` to answer each peers query.
    pub fn slow(self, delay: Duration) -> Self {
        self.0.lock().unwrap().delay = Some(delay);
        self
    }

    /// Returns the number of peers queries the node finished answering.
    pub fn answered(&self) -> usize {
        self.0.lock().unwrap().answered
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.0.lock().unwrap().batches.clone()
    }

    pub fn connects(&self) -> usize {
        self.0.lock().unwrap().connects
    }

    pub fn peer_count(&self) -> usize {
        self.0.lock().unwrap().peers.len()
    }
}

#[async_trait]
impl Connect for FakeNode {
    type Client = FakeNode;

    async fn connect(&self) -> Result<FakeNode, rpc::Error> {
        let mut state = self.0.lock().unwrap();
        state.connects += 1;
        if state.unreachable {
            return Err(rpc::Error::Closed);
        }
        Ok(self.clone())
    }
}

#[async_trait]
impl Admin for FakeNode {
    async fn peers(&mut self) -> Result<Vec<PeerInfo>, rpc::Error> {
        let delay = self.0.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.0.lock().unwrap();
        state.answered += 1;
        Ok(state.peers.clone())
    }

    async fn batch_add_peer(&mut self, urls: &[String]) -> Result<(), rpc::Error> {
        let mut state = self.0.lock().unwrap();
        state.batches.push(urls.to_vec());
        if state.rejecting {
            return Err(rpc::Error::Batch {
                failed: urls.len(),
                total: urls.len(),
                first: ErrorPayload {
                    code: -32000,
                    message: "too many peers".into(),
                    data: None,
                },
            });
        }
        for url in urls {
            if let Ok(node) = url.parse::<Node>() {
                state.peers.push(peer(node.id.as_str()));
            }
        }
        Ok(())
    }

    async fn close(&mut self) {}
}
