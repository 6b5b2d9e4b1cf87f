//! Candidate peer sources.
//!
//! Sources never fail: download and decoding errors are logged and reported
//! as an empty result so that the remaining sources can still be consulted.

mod directory;
mod whitelist;

pub use self::{
    directory::{query_url, Directory},
    whitelist::Whitelist,
};
use crate::node::{Node, NodeId};
use async_trait::async_trait;
use std::{collections::HashSet, time::Duration};

/// The default whitelist of mainnet peers.
pub const WHITELIST_URL: &str =
    "https://gist.githubusercontent.com/rfikki/a2ccdc1a31ff24884106da7b9e6a7453/raw/mainnet-peers-latest.txt";

/// The default node directory query. The `{draw}`, `{length}` and `{client}`
/// placeholders are substituted per request.
pub const DIRECTORY_URL: &str = concat!(
    "https://www.ethernodes.org/network/1/data?draw={draw}",
    "&columns%5B0%5D%5Bdata%5D=id&columns%5B0%5D%5Bname%5D=&columns%5B0%5D%5Bsearchable%5D=true&columns%5B0%5D%5Borderable%5D=true&columns%5B0%5D%5Bsearch%5D%5Bvalue%5D=&columns%5B0%5D%5Bsearch%5D%5Bregex%5D=false",
    "&columns%5B1%5D%5Bdata%5D=host&columns%5B1%5D%5Bname%5D=&columns%5B1%5D%5Bsearchable%5D=true&columns%5B1%5D%5Borderable%5D=true&columns%5B1%5D%5Bsearch%5D%5Bvalue%5D=&columns%5B1%5D%5Bsearch%5D%5Bregex%5D=false",
    "&columns%5B2%5D%5Bdata%5D=port&columns%5B2%5D%5Bname%5D=&columns%5B2%5D%5Bsearchable%5D=true&columns%5B2%5D%5Borderable%5D=true&columns%5B2%5D%5Bsearch%5D%5Bvalue%5D=&columns%5B2%5D%5Bsearch%5D%5Bregex%5D=false",
    "&columns%5B3%5D%5Bdata%5D=country&columns%5B3%5D%5Bname%5D=&columns%5B3%5D%5Bsearchable%5D=true&columns%5B3%5D%5Borderable%5D=true&columns%5B3%5D%5Bsearch%5D%5Bvalue%5D=&columns%5B3%5D%5Bsearch%5D%5Bregex%5D=false",
    "&columns%5B4%5D%5Bdata%5D=clientId&columns%5B4%5D%5Bname%5D=&columns%5B4%5D%5Bsearchable%5D=true&columns%5B4%5D%5Borderable%5D=true&columns%5B4%5D%5Bsearch%5D%5Bvalue%5D=&columns%5B4%5D%5Bsearch%5D%5Bregex%5D=false",
    "&columns%5B5%5D%5Bdata%5D=client&columns%5B5%5D%5Bname%5D=&columns%5B5%5D%5Bsearchable%5D=true&columns%5B5%5D%5Borderable%5D=true&columns%5B5%5D%5Bsearch%5D%5Bvalue%5D=&columns%5B5%5D%5Bsearch%5D%5Bregex%5D=false",
    "&columns%5B6%5D%5Bdata%5D=clientVersion&columns%5B6%5D%5Bname%5D=&columns%5B6%5D%5Bsearchable%5D=true&columns%5B6%5D%5Borderable%5D=true&columns%5B6%5D%5Bsearch%5D%5Bvalue%5D=&columns%5B6%5D%5Bsearch%5D%5Bregex%5D=false",
    "&columns%5B7%5D%5Bdata%5D=os&columns%5B7%5D%5Bname%5D=&columns%5B7%5D%5Bsearchable%5D=true&columns%5B7%5D%5Borderable%5D=true&columns%5B7%5D%5Bsearch%5D%5Bvalue%5D=&columns%5B7%5D%5Bsearch%5D%5Bregex%5D=false",
    "&columns%5B8%5D%5Bdata%5D=lastUpdate&columns%5B8%5D%5Bname%5D=&columns%5B8%5D%5Bsearchable%5D=true&columns%5B8%5D%5Borderable%5D=true&columns%5B8%5D%5Bsearch%5D%5Bvalue%5D=&columns%5B8%5D%5Bsearch%5D%5Bregex%5D=false",
    "&order%5B0%5D%5Bcolumn%5D=8&order%5B0%5D%5Bdir%5D=desc&start=0&length={length}",
    "&search%5Bvalue%5D={client}&search%5Bregex%5D=false",
);

/// The set of node identifiers that sources must not emit.
#[derive(Clone, Debug, Default)]
pub struct LiveFilter(HashSet<NodeId>);

impl LiveFilter {
    pub fn contains(&self, id: &NodeId) -> bool {
        self.0.contains(id)
    }

    /// Adds an identifier to the filter. Returns `false` if it was already
    /// filtered.
    pub fn insert(&mut self, id: NodeId) -> bool {
        self.0.insert(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<NodeId> for LiveFilter {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A supplier of peer candidates.
#[async_trait]
pub trait Source: Send + Sync {
    /// Fetches the candidates for a round. Candidates that are filtered or
    /// otherwise unusable may be reported as `None` slots so that the size of
    /// the result matches what the source returned.
    async fn fetch(&self, round: usize, filter: &LiveFilter) -> Vec<Option<Node>>;
}

/// Builds the HTTP client shared by the sources. Every request is bounded by
/// `timeout`, covering connecting and reading the full response.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}
