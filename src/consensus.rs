//! Longest-valid-chain consensus over a flat set of registered peers.
//!
//! Peers serve `GET /chain` as `{"chain": [...], "length": n}`. Fetches run
//! concurrently and each failure stays local to its peer; only the final
//! adoption goes through the ledger lock.

use std::collections::BTreeSet;
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::chain::{valid_chain, Block, Ledger};

/// Wire shape of `GET /chain`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    pub length: usize,
}

impl ChainResponse {
    pub fn new(chain: Vec<Block>) -> Self {
        let length = chain.len();
        Self { chain, length }
    }
}

#[derive(Debug, Error)]
#[error("invalid node address: {0:?}")]
pub struct InvalidNodeAddress(pub String);

#[derive(Debug, Error)]
enum PeerError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("peer answered {0}")]
    Status(reqwest::StatusCode),
    #[error("declared length {declared} but sent {actual} blocks")]
    LengthMismatch { declared: usize, actual: usize },
}

/// Reduce a URL-like address to its `host[:port]` network location.
///
/// `http://10.0.0.5:5000/` and the bare `10.0.0.5:5000` both yield
/// `10.0.0.5:5000`.
pub fn parse_node_address(address: &str) -> Result<String, InvalidNodeAddress> {
    let invalid = || InvalidNodeAddress(address.to_string());
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }
    let parsed = if trimmed.contains("://") {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("http://{trimmed}"))
    };
    let url = parsed.map_err(|_| invalid())?;
    let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Registered peers plus the HTTP client used to query them.
pub struct Resolver {
    nodes: RwLock<BTreeSet<String>>,
    client: reqwest::Client,
}

impl Resolver {
    /// `timeout` bounds each peer request end to end.
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            nodes: RwLock::new(BTreeSet::new()),
            client,
        })
    }

    /// Add a peer. Returns the stored network location.
    pub fn register_node(&self, address: &str) -> Result<String, InvalidNodeAddress> {
        let node = parse_node_address(address)?;
        let added = self
            .nodes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(node.clone());
        if added {
            info!(node = %node, "peer registered");
        }
        Ok(node)
    }

    pub fn nodes(&self) -> Vec<String> {
        self.nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    async fn fetch_chain(client: reqwest::Client, node: String) -> Result<ChainResponse, PeerError> {
        let resp = client.get(format!("http://{node}/chain")).send().await?;
        if !resp.status().is_success() {
            return Err(PeerError::Status(resp.status()));
        }
        let body: ChainResponse = resp.json().await?;
        if body.length != body.chain.len() {
            return Err(PeerError::LengthMismatch {
                declared: body.length,
                actual: body.chain.len(),
            });
        }
        Ok(body)
    }

    /// Re-hash a peer chain on the blocking pool; `None` when it is invalid.
    async fn check_chain(chain: Vec<Block>, difficulty: usize) -> Option<Vec<Block>> {
        let checked = tokio::task::spawn_blocking(move || valid_chain(&chain, difficulty).then_some(chain)).await;
        match checked {
            Ok(chain) => chain,
            Err(e) => {
                warn!(error = %e, "chain validation task failed");
                None
            }
        }
    }

    /// Query every peer and adopt the longest valid chain that beats the
    /// local one. Returns whether the local chain was replaced.
    pub async fn resolve_conflicts(&self, ledger: &Ledger) -> bool {
        let mut fetches = JoinSet::new();
        for node in self.nodes() {
            let client = self.client.clone();
            fetches.spawn(async move {
                let result = Self::fetch_chain(client, node.clone()).await;
                (node, result)
            });
        }

        let difficulty = ledger.pow_params().difficulty;
        let mut best: Option<Vec<Block>> = None;
        let mut max_length = ledger.len();
        while let Some(joined) = fetches.join_next().await {
            let (node, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "peer fetch task failed");
                    continue;
                }
            };
            match result {
                Ok(resp) if resp.length > max_length => {
                    let length = resp.length;
                    match Self::check_chain(resp.chain, difficulty).await {
                        Some(chain) => {
                            debug!(node = %node, length, "longer valid chain found");
                            max_length = length;
                            best = Some(chain);
                        }
                        None => warn!(node = %node, length, "peer chain failed validation"),
                    }
                }
                Ok(resp) => debug!(node = %node, length = resp.length, "peer chain not longer"),
                Err(e) => warn!(node = %node, error = %e, "peer chain fetch failed"),
            }
        }

        match best {
            Some(chain) => ledger.replace_chain(chain),
            None => false,
        }
    }
}
