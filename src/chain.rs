#![forbid(unsafe_code)]

//! Append-only custody ledger: blocks, the pending pool, hashing,
//! validation, item history and mining.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::{canonical_json, now_ts, sha256_hex};
use crate::ewaste::{EWasteItem, EWasteStatus};
use crate::impact::{calculate_rewards, compute_environmental_impact, ImpactReport};
use crate::pow::{self, block_digest, PowError, PowParams};

pub const GENESIS_PROOF: u64 = 100;
pub const GENESIS_PREVIOUS_HASH: &str = "1";

/// Sender recorded on mining reward transactions.
pub const REWARD_SENDER: &str = "0";
pub const MINING_REWARD_TYPE: &str = "mining_reward";

/// Times `mine_block` re-solves after the tip moved underneath it.
const MAX_MINING_ATTEMPTS: u32 = 8;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: EWasteStatus,
    pub ewaste_items: Vec<EWasteItem>,
    pub environmental_impact: ImpactReport,
    pub reward: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

/// One custody event for an item, oldest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub timestamp: f64,
    pub status: EWasteStatus,
    pub handler: String,
    pub facility: String,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("chain tip kept moving; gave up after {0} mining attempts")]
    TipContention(u32),
    #[error(transparent)]
    Pow(#[from] PowError),
}

/// SHA-256 of the block's canonical JSON encoding.
///
/// Panics if the block cannot be encoded: every field is plain data, so a
/// failure means the in-memory state is corrupt.
pub fn block_hash(block: &Block) -> String {
    let encoded = canonical_json(block).expect("block -> canonical json");
    sha256_hex(encoded.as_bytes())
}

/// Pairwise link and proof check over `chain`.
pub fn valid_chain(chain: &[Block], difficulty: usize) -> bool {
    if chain.is_empty() {
        return false;
    }
    chain.windows(2).all(|pair| {
        let (prev, block) = (&pair[0], &pair[1]);
        let prev_hash = block_hash(prev);
        if block.previous_hash != prev_hash {
            debug!(index = block.index, "previous_hash does not link");
            return false;
        }
        if !pow::valid_proof(prev.proof, block.proof, &prev_hash, difficulty) {
            debug!(index = block.index, "proof does not satisfy difficulty");
            return false;
        }
        true
    })
}

#[derive(Debug)]
struct LedgerState {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
}

impl LedgerState {
    fn tip(&self) -> Option<&Block> {
        self.chain.last()
    }

    fn push_block(&mut self, proof: u64, previous_hash: Option<String>) -> Block {
        let previous_hash = previous_hash
            .or_else(|| self.tip().map(block_hash))
            .unwrap_or_else(|| GENESIS_PREVIOUS_HASH.to_string());
        let block = Block {
            index: self.chain.len() as u64 + 1,
            timestamp: now_ts(),
            transactions: std::mem::take(&mut self.pending),
            proof,
            previous_hash,
        };
        self.chain.push(block.clone());
        block
    }
}

/// The e-waste ledger. One instance per process, shared by `Arc`.
///
/// A single mutex covers the pending pool and the block sequence, so
/// admission, block commit and consensus replacement never interleave.
#[derive(Debug)]
pub struct Ledger {
    state: Mutex<LedgerState>,
    pow: PowParams,
    mining_timeout: Option<Duration>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(PowParams::default())
    }
}

impl Ledger {
    /// New ledger holding only the genesis block.
    pub fn new(pow: PowParams) -> Self {
        let mut state = LedgerState {
            chain: Vec::new(),
            pending: Vec::new(),
        };
        state.push_block(GENESIS_PROOF, Some(GENESIS_PREVIOUS_HASH.to_string()));
        Self {
            state: Mutex::new(state),
            pow,
            mining_timeout: None,
        }
    }

    /// Abort a mining search after `timeout`.
    pub fn with_mining_timeout(mut self, timeout: Duration) -> Self {
        self.mining_timeout = Some(timeout);
        self
    }

    pub fn pow_params(&self) -> PowParams {
        self.pow
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit a custody transaction into the pending pool. Returns the index
    /// of the block it will land in.
    pub fn add_transaction(
        &self,
        sender: &str,
        recipient: &str,
        items: Vec<EWasteItem>,
        kind: &str,
        status: EWasteStatus,
    ) -> u64 {
        let tx = Transaction {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            timestamp: now_ts(),
            kind: kind.to_string(),
            status,
            environmental_impact: compute_environmental_impact(&items),
            reward: calculate_rewards(&items),
            ewaste_items: items,
        };
        let mut state = self.lock();
        state.pending.push(tx);
        debug!(pending = state.pending.len(), sender, recipient, "transaction admitted");
        state.tip().map_or(1, |b| b.index) + 1
    }

    /// Commit the pending pool as a new block. `previous_hash` defaults to
    /// the hash of the current tip.
    pub fn new_block(&self, proof: u64, previous_hash: Option<String>) -> Block {
        let block = self.lock().push_block(proof, previous_hash);
        info!(index = block.index, txs = block.transactions.len(), "block appended");
        block
    }

    pub fn last_block(&self) -> Option<Block> {
        self.lock().tip().cloned()
    }

    pub fn chain(&self) -> Vec<Block> {
        self.lock().chain.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().chain.is_empty()
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.lock().pending.clone()
    }

    /// Validate `chain` against this ledger's difficulty.
    pub fn valid_chain(&self, chain: &[Block]) -> bool {
        valid_chain(chain, self.pow.difficulty)
    }

    /// Validate the local chain.
    pub fn is_valid(&self) -> bool {
        let chain = self.chain();
        self.valid_chain(&chain)
    }

    /// Every committed custody event that mentions `item_id`, oldest first.
    pub fn get_ewaste_history(&self, item_id: &str) -> Vec<HistoryEvent> {
        let state = self.lock();
        state
            .chain
            .iter()
            .flat_map(|block| block.transactions.iter())
            .flat_map(|tx| {
                tx.ewaste_items
                    .iter()
                    .filter(|item| item.item_id == item_id)
                    .map(move |_| HistoryEvent {
                        timestamp: tx.timestamp,
                        status: tx.status,
                        handler: tx.sender.clone(),
                        facility: tx.recipient.clone(),
                    })
            })
            .collect()
    }

    /// Adopt `candidate` wholesale if it is strictly longer than the local
    /// chain and valid. The pending pool is left untouched.
    pub fn replace_chain(&self, candidate: Vec<Block>) -> bool {
        let mut state = self.lock();
        if candidate.len() <= state.chain.len() {
            return false;
        }
        if !valid_chain(&candidate, self.pow.difficulty) {
            warn!(length = candidate.len(), "rejected invalid replacement chain");
            return false;
        }
        info!(from = state.chain.len(), to = candidate.len(), "local chain replaced");
        state.chain = candidate;
        true
    }

    /// Solve the proof for the current tip off-thread, then commit the pool
    /// plus a reward transaction for `miner_address`.
    ///
    /// If the tip changed while solving (another block was mined or the
    /// chain was replaced), the search restarts against the new tip.
    pub async fn mine_block(&self, miner_address: &str) -> Result<Block, LedgerError> {
        for attempt in 1..=MAX_MINING_ATTEMPTS {
            let (last_proof, last_hash) = {
                let state = self.lock();
                let tip = state.tip().expect("ledger always holds genesis");
                (tip.proof, block_hash(tip))
            };

            let solved = pow::solve(self.pow, self.mining_timeout, block_digest(last_proof, last_hash.clone())).await?;

            let committed = {
                let mut state = self.lock();
                let current = state.tip().map(block_hash);
                if current.as_deref() == Some(last_hash.as_str()) {
                    state.pending.push(Transaction {
                        sender: REWARD_SENDER.to_string(),
                        recipient: miner_address.to_string(),
                        timestamp: now_ts(),
                        kind: MINING_REWARD_TYPE.to_string(),
                        status: EWasteStatus::Processed,
                        ewaste_items: Vec::new(),
                        environmental_impact: ImpactReport::default(),
                        reward: 0.0,
                    });
                    Some(state.push_block(solved.nonce, Some(last_hash)))
                } else {
                    None
                }
            };

            match committed {
                Some(block) => {
                    info!(
                        index = block.index,
                        proof = block.proof,
                        iterations = solved.iterations,
                        miner = miner_address,
                        "block mined"
                    );
                    return Ok(block);
                }
                None => warn!(attempt, "tip moved while mining; retrying"),
            }
        }
        Err(LedgerError::TipContention(MAX_MINING_ATTEMPTS))
    }
}
