//! A paginated directory of mainnet nodes, queried one page per round.

use super::{LiveFilter, Source};
use crate::node::{ClientFamily, Node, NodeId};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::net::IpAddr;

pub struct Directory {
    client: reqwest::Client,
    template: String,
    length: usize,
    client_filter: String,
}

/// A page of directory entries. Entries are decoded individually so that a
/// malformed entry only costs its own slot.
#[derive(Debug, Deserialize)]
struct Page {
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Entry {
    id: Option<NodeId>,
    host: Option<String>,
    port: Option<u16>,
    #[serde(default)]
    client: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    last_update: Option<String>,
}

impl Directory {
    /// Creates a directory source from a query template. Each request fetches
    /// a page of `length` nodes.
    pub fn new(client: reqwest::Client, template: String, length: usize) -> Self {
        Self {
            client,
            template,
            length,
            client_filter: String::new(),
        }
    }

    /// Returns the query URL for a round.
    pub fn url(&self, round: usize) -> String {
        query_url(&self.template, round + 1, self.length, &self.client_filter)
    }

    async fn page(&self, url: &str) -> Result<Page> {
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Substitutes the placeholders of a directory query template.
pub fn query_url(template: &str, draw: usize, length: usize, client: &str) -> String {
    template
        .replace("{draw}", &draw.to_string())
        .replace("{length}", &length.to_string())
        .replace("{client}", client)
}

/// Converts a directory entry into a candidate, if it is one.
fn validate(entry: Value, filter: &LiveFilter) -> Option<Node> {
    let entry = match serde_json::from_value::<Entry>(entry) {
        Ok(entry) => entry,
        Err(err) => {
            tracing::trace!(%err, "skipping malformed directory entry");
            return None;
        }
    };

    let id = entry.id.filter(|id| !id.as_str().is_empty())?;
    if filter.contains(&id) {
        return None;
    }
    // Hosts that would need to be resolved are not considered.
    let host = entry.host?.parse::<IpAddr>().ok()?;
    let port = entry.port.filter(|port| *port != 0)?;
    let client = ClientFamily::from_name(entry.client.as_deref()?)?;

    Some(Node {
        client: Some(client),
        client_id: entry.client_id,
        last_update: entry
            .last_update
            .as_deref()
            .and_then(|timestamp| DateTime::parse_from_rfc3339(timestamp).ok())
            .map(|timestamp| timestamp.with_timezone(&Utc)),
        ..Node::new(id, host, port)
    })
}

#[async_trait]
impl Source for Directory {
    async fn fetch(&self, round: usize, filter: &LiveFilter) -> Vec<Option<Node>> {
        let url = self.url(round);
        match self.page(&url).await {
            Ok(page) => {
                let slots = page
                    .data
                    .into_iter()
                    .map(|entry| validate(entry, filter))
                    .collect::<Vec<_>>();
                tracing::debug!(
                    round, entries = slots.len(),
                    valid = slots.iter().flatten().count(),
                    "fetched directory page"
                );
                slots
            }
            Err(err) => {
                tracing::warn!(%url, ?err, "failed to fetch directory page");
                Vec::new()
            }
        }
    }
}
