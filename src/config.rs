//! Node configuration: defaults, optional JSON file, CLI overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::pow::{PowParams, CHAIN_DIFFICULTY, TOKEN_DIFFICULTY};
use crate::token::TokenConfig;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub listen_addr: String,
    /// Leading zero hex digits for block proofs
    pub chain_difficulty: usize,
    /// Leading zero hex digits for the transfer throttle
    pub token_difficulty: usize,
    pub max_pow_iterations: u64,
    /// 0 disables the mining timeout
    pub mining_timeout_secs: u64,
    /// 0 disables the transfer throttle timeout
    pub transfer_timeout_secs: u64,
    pub peer_timeout_ms: u64,
    pub recipient_lock_secs: u64,
    pub enforce_recipient_lock: bool,
    pub bootstrap_peers: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5000".into(),
            chain_difficulty: CHAIN_DIFFICULTY,
            token_difficulty: TOKEN_DIFFICULTY,
            max_pow_iterations: PowParams::default().max_iterations,
            mining_timeout_secs: 0,
            transfer_timeout_secs: 30,
            peer_timeout_ms: 5_000,
            recipient_lock_secs: 5,
            enforce_recipient_lock: false,
            bootstrap_peers: vec![],
        }
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl NodeConfig {
    /// Read a JSON config file; missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let buf = std::fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
        let cfg = serde_json::from_slice(&buf).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn chain_pow(&self) -> PowParams {
        PowParams {
            difficulty: self.chain_difficulty,
            max_iterations: self.max_pow_iterations,
        }
    }

    pub fn mining_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.mining_timeout_secs)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            pow: PowParams {
                difficulty: self.token_difficulty,
                max_iterations: self.max_pow_iterations,
            },
            pow_timeout: non_zero_secs(self.transfer_timeout_secs),
            lock_window: Duration::from_secs(self.recipient_lock_secs),
            enforce_recipient_lock: self.enforce_recipient_lock,
        }
    }
}
