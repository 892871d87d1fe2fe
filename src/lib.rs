//! RecycleChain: e-waste custody ledger
//!
//! Participants (collectors, dismantlers, recyclers) record custody
//! hand-overs of waste items on an append-only proof-of-work chain and earn
//! rewards for the materials they recover.
//!
//! Modules:
//! - core: SHA-256 hex digests, timestamps, canonical JSON
//! - ewaste: items, component tags, lifecycle status
//! - impact: reward and environmental-impact calculator
//! - pow: deterministic, bounded, cancellable nonce search
//! - chain: blocks, pending pool, validation, history, mining
//! - consensus: peer registry and longest-valid-chain resolution
//! - token: point-transfer ledger with PoW throttle
//! - config / node / api: process wiring and the HTTP surface

pub mod api;
pub mod chain;
pub mod config;
pub mod consensus;
pub mod core;
pub mod ewaste;
pub mod impact;
pub mod node;
pub mod pow;
pub mod token;

// Re-export main types for convenience
pub use chain::{block_hash, valid_chain, Block, HistoryEvent, Ledger, LedgerError, Transaction};
pub use config::NodeConfig;
pub use consensus::{parse_node_address, ChainResponse, InvalidNodeAddress, Resolver};
pub use ewaste::{Component, EWasteItem, EWasteStatus};
pub use impact::{calculate_rewards, compute_environmental_impact, ImpactReport};
pub use node::Node;
pub use pow::{proof_of_work, valid_proof, PowError, PowParams};
pub use token::{TokenConfig, TokenError, TokenLedger, TokenTransaction};
