//! Ethereum node addressing. This module is responsible for the `enode://`
//! URL format: parsing it, rendering it, and scanning free-form text for it.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::{
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
    net::{IpAddr, SocketAddr},
    str::FromStr,
    sync::OnceLock,
};
use url::Url;

/// The default Ethereum mainnet P2P port.
pub const DEFAULT_P2P_PORT: u16 = 30303;

/// Pattern for enode URLs with a literal IPv4 host, as found in peer lists.
const ENODE_PATTERN: &str = r"enode://[A-Za-z0-9]+@([0-9]+\.){3}[0-9]+:[0-9]+";

/// A node identifier. This is the hex encoded public key of a node, without
/// a `0x` prefix. Identifiers keep the text they were read with, but compare
/// and hash case-insensitively so that sources disagreeing on case still
/// refer to the same node.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(from = "String")]
pub struct NodeId(String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for NodeId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for NodeId {}

impl Hash for NodeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        state.write_u8(0xff);
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client implementations that are accepted as peers.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ClientFamily {
    Geth,
    Parity,
}

impl ClientFamily {
    /// Returns the client family for a name as reported by a node directory.
    /// Only exact matches are recognized.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Geth" => Some(Self::Geth),
            "Parity" => Some(Self::Parity),
            _ => None,
        }
    }
}

/// A peer candidate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub host: IpAddr,
    pub port: u16,
    pub client: Option<ClientFamily>,
    pub client_id: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
}

impl Node {
    /// Creates a node without any directory metadata.
    pub fn new(id: impl Into<NodeId>, host: IpAddr, port: u16) -> Self {
        Self {
            id: id.into(),
            host,
            port,
            client: None,
            client_id: None,
            last_update: None,
        }
    }

    /// Returns the TCP endpoint of the node's advertised P2P port.
    pub fn endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Returns the canonical `enode://` URL of the node.
    pub fn url(&self) -> String {
        self.to_string()
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        // `SocketAddr` brackets IPv6 hosts, which is what enode URLs expect.
        write!(f, "enode://{}@{}", self.id, self.endpoint())
    }
}

/// An error parsing an enode URL.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unexpected scheme {0:?}")]
    Scheme(String),
    #[error("missing node id")]
    MissingId,
    #[error("host {0:?} is not an IP address")]
    Host(String),
    #[error("missing port")]
    MissingPort,
}

impl FromStr for Node {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s)?;
        if url.scheme() != "enode" {
            return Err(ParseError::Scheme(url.scheme().to_owned()));
        }
        if url.username().is_empty() {
            return Err(ParseError::MissingId);
        }

        let host = url.host_str().unwrap_or_default();
        let host = host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map_err(|_| ParseError::Host(host.to_owned()))?;
        let port = url.port().ok_or(ParseError::MissingPort)?;

        Ok(Self::new(url.username(), host, port))
    }
}

/// Finds every enode URL in a chunk of text, in order of appearance. Matches
/// that fail to parse are yielded as errors so callers can report them.
pub fn scan(text: &str) -> impl Iterator<Item = Result<Node, ParseError>> + '_ {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(ENODE_PATTERN).expect("enode pattern is valid"))
        .find_iter(text)
        .map(|m| m.as_str().parse())
}
