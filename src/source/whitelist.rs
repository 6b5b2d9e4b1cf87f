//! A plain text list of enode URLs, such as a curated peer list.

use super::{LiveFilter, Source};
use crate::node::{self, Node};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use url::Url;

pub struct Whitelist {
    client: reqwest::Client,
    url: Url,
}

impl Whitelist {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    /// Downloads the list, scanning it line by line as the body streams in.
    async fn download(&self, filter: &LiveFilter) -> Result<Vec<Node>> {
        let mut response = self
            .client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?;

        let mut nodes = Vec::new();
        let mut seen = HashSet::new();
        let mut scan_line = |line: &[u8]| {
            for result in node::scan(&String::from_utf8_lossy(line)) {
                match result {
                    Ok(node) => {
                        if !filter.contains(&node.id) && seen.insert(node.id.clone()) {
                            nodes.push(node);
                        }
                    }
                    Err(err) => tracing::debug!(%err, "skipping malformed enode"),
                }
            }
        };

        let mut buffer = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            buffer.extend_from_slice(&chunk);
            while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                let line = buffer.drain(..=end).collect::<Vec<_>>();
                scan_line(&line);
            }
        }
        scan_line(&buffer);

        Ok(nodes)
    }
}

#[async_trait]
impl Source for Whitelist {
    async fn fetch(&self, _: usize, filter: &LiveFilter) -> Vec<Option<Node>> {
        match self.download(filter).await {
            Ok(nodes) => {
                tracing::debug!(url = %self.url, count = nodes.len(), "fetched whitelist");
                nodes.into_iter().map(Some).collect()
            }
            Err(err) => {
                tracing::warn!(url = %self.url, ?err, "failed to fetch whitelist");
                Vec::new()
            }
        }
    }
}
