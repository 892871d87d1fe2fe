//! Node wiring: one ledger, one token ledger and one peer resolver per
//! process, shared with request handlers through cheap `Arc` clones.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::chain::Ledger;
use crate::config::NodeConfig;
use crate::consensus::Resolver;
use crate::token::TokenLedger;

#[derive(Clone)]
pub struct Node {
    pub ledger: Arc<Ledger>,
    pub tokens: Arc<TokenLedger>,
    pub resolver: Arc<Resolver>,
}

impl Node {
    pub fn new(ledger: Ledger, tokens: TokenLedger, resolver: Resolver) -> Self {
        Self {
            ledger: Arc::new(ledger),
            tokens: Arc::new(tokens),
            resolver: Arc::new(resolver),
        }
    }

    /// Build a node from `config`, registering its bootstrap peers.
    pub fn from_config(config: &NodeConfig) -> anyhow::Result<Self> {
        let mut ledger = Ledger::new(config.chain_pow());
        if let Some(limit) = config.mining_timeout() {
            ledger = ledger.with_mining_timeout(limit);
        }
        let tokens = TokenLedger::new(config.token_config());
        let resolver = Resolver::new(config.peer_timeout()).context("building peer HTTP client")?;
        for peer in &config.bootstrap_peers {
            resolver
                .register_node(peer)
                .with_context(|| format!("bootstrap peer {peer:?}"))?;
        }
        info!(
            difficulty = config.chain_difficulty,
            peers = config.bootstrap_peers.len(),
            "node initialised with genesis block"
        );
        Ok(Self::new(ledger, tokens, resolver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_registers_bootstrap_peers() {
        let cfg = NodeConfig {
            bootstrap_peers: vec!["http://a:1".into(), "b:2".into()],
            ..NodeConfig::default()
        };
        let node = Node::from_config(&cfg).unwrap();
        assert_eq!(node.resolver.nodes(), vec!["a:1".to_string(), "b:2".to_string()]);
        assert_eq!(node.ledger.len(), 1);
    }

    #[test]
    fn test_from_config_rejects_bad_peer() {
        let cfg = NodeConfig {
            bootstrap_peers: vec!["".into()],
            ..NodeConfig::default()
        };
        assert!(Node::from_config(&cfg).is_err());
    }
}
