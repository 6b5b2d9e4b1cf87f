//! Typed client for the admin API of a local Ethereum node.

use crate::node::{Node, NodeId};
use alloy::{
    rpc::{
        client::{ClientBuilder, RpcClient, Waiter},
        json_rpc::ErrorPayload,
    },
    transports::{RpcError, TransportError},
};
use async_trait::async_trait;
use futures::future;
use serde::Deserialize;

/// An error communicating with the node.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("connection closed")]
    Closed,
    #[error("{failed} of {total} batch calls failed, first error: {first}")]
    Batch {
        failed: usize,
        total: usize,
        first: ErrorPayload,
    },
}

/// A summary of a peer currently connected to the node.
#[derive(Clone, Debug, Deserialize)]
pub struct PeerInfo {
    pub id: NodeId,
    #[serde(default)]
    pub enode: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl PeerInfo {
    /// Returns the identifier of the peer in the same form sources use.
    ///
    /// Newer nodes report a hash of the public key as the `id`, while the
    /// `enode` URL always contains the public key itself, so the latter is
    /// preferred when present.
    pub fn node_id(&self) -> NodeId {
        self.enode
            .as_deref()
            .and_then(|enode| enode.parse::<Node>().ok())
            .map(|node| node.id)
            .unwrap_or_else(|| self.id.clone())
    }
}

/// The node admin API used for peer management.
#[async_trait]
pub trait Admin: Send {
    /// Lists the peers the node is currently connected to.
    async fn peers(&mut self) -> Result<Vec<PeerInfo>, Error>;

    /// Requests the node to connect to each of the enode URLs.
    ///
    /// An empty list succeeds without contacting the node. If the node
    /// rejects some of the URLs, the accepted ones are not rolled back and
    /// [`Error::Batch`] is returned.
    async fn batch_add_peer(&mut self, urls: &[String]) -> Result<(), Error>;

    /// Releases the connection.
    async fn close(&mut self);
}

/// Establishes admin API connections to a node.
#[async_trait]
pub trait Connect: Send + Sync {
    type Client: Admin;

    async fn connect(&self) -> Result<Self::Client, Error>;
}

/// A JSON-RPC client for a node.
pub struct Client {
    inner: Option<RpcClient>,
}

impl Client {
    /// Dials the node at the endpoint, which is either an HTTP or WebSocket
    /// URL or the path of an IPC socket.
    pub async fn dial(endpoint: &str) -> Result<Self, Error> {
        Ok(Self {
            inner: Some(ClientBuilder::default().connect(endpoint).await?),
        })
    }

    fn inner(&self) -> Result<&RpcClient, Error> {
        self.inner.as_ref().ok_or(Error::Closed)
    }
}

#[async_trait]
impl Admin for Client {
    async fn peers(&mut self) -> Result<Vec<PeerInfo>, Error> {
        Ok(self.inner()?.request_noparams("admin_peers").await?)
    }

    async fn batch_add_peer(&mut self, urls: &[String]) -> Result<(), Error> {
        if urls.is_empty() {
            return Ok(());
        }

        let mut batch = self.inner()?.new_batch();
        let waiters = urls
            .iter()
            .map(|url| -> Result<Waiter<bool>, Error> {
                Ok(batch.add_call("admin_addPeer", &(url.clone(),))?)
            })
            .collect::<Result<Vec<_>, _>>()?;
        batch.send().await?;

        let total = waiters.len();
        let mut failed = 0;
        let mut first = None;
        for result in future::join_all(waiters).await {
            match result {
                Ok(_) => {}
                Err(RpcError::ErrorResp(payload)) => {
                    failed += 1;
                    first.get_or_insert(payload);
                }
                Err(err) => return Err(err.into()),
            }
        }

        match first {
            Some(first) => Err(Error::Batch {
                failed,
                total,
                first,
            }),
            None => Ok(()),
        }
    }

    async fn close(&mut self) {
        // Dropping the client shuts down its connection.
        self.inner = None;
    }
}

/// Dials a fresh [`Client`] for every connection.
#[derive(Clone, Debug)]
pub struct Dialer {
    endpoint: String,
}

impl Dialer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Connect for Dialer {
    type Client = Client;

    async fn connect(&self) -> Result<Client, Error> {
        Client::dial(&self.endpoint).await
    }
}
