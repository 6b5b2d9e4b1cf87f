//! Liveness probing of peer candidates.

use crate::node::{Node, DEFAULT_P2P_PORT};
use async_trait::async_trait;
use std::time::Duration;
use tokio::{net::TcpStream, time};

/// Checks whether a candidate is reachable.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probes the candidate, returning it with the port it was reached on, or
    /// `None` if it is unreachable.
    async fn probe(&self, node: Node) -> Option<Node>;
}

/// Probes candidates by completing a TCP handshake with them. Directories
/// often advertise a port other than the P2P port, so the default P2P port
/// is tried as well when the advertised one is unreachable.
#[derive(Clone, Copy, Debug)]
pub struct TcpProber {
    timeout: Duration,
    fallback_port: u16,
}

impl TcpProber {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            fallback_port: DEFAULT_P2P_PORT,
        }
    }

    #[cfg(test)]
    fn with_fallback_port(self, fallback_port: u16) -> Self {
        Self {
            fallback_port,
            ..self
        }
    }

    async fn dial(&self, node: &Node, port: u16) -> bool {
        match time::timeout(self.timeout, TcpStream::connect((node.host, port))).await {
            Ok(Ok(_)) => true,
            Ok(Err(err)) => {
                tracing::trace!(id = %node.id, host = %node.host, port, %err, "dial failed");
                false
            }
            Err(_) => {
                tracing::trace!(id = %node.id, host = %node.host, port, "dial timed out");
                false
            }
        }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, mut node: Node) -> Option<Node> {
        let mut ports = vec![node.port];
        if node.port != self.fallback_port {
            ports.push(self.fallback_port);
        }

        for port in ports {
            if self.dial(&node, port).await {
                node.port = port;
                tracing::trace!(
                    url = %node, client = ?node.client, client_id = ?node.client_id,
                    last_update = ?node.last_update, "candidate is reachable"
                );
                return Some(node);
            }
        }
        None
    }
}
