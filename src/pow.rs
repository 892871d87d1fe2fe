//! Proof-of-work engine.
//!
//! One nonce search shared by block mining and the token throttle: scan
//! nonces upward from zero until the SHA-256 hex digest carries the required
//! run of leading zeros. The first satisfying nonce is a pure function of the
//! inputs, which is what chain validation relies on.
//!
//! Searches are CPU-bound. [`solve`] moves them onto tokio's blocking pool,
//! bounds them by `max_iterations` and an optional timeout, and stops them
//! when the awaiting future is dropped.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{has_leading_zeros, sha256_hex};

/// Leading zero hex digits required of block proofs.
pub const CHAIN_DIFFICULTY: usize = 4;

/// Leading zero hex digits required by the token transfer throttle.
pub const TOKEN_DIFFICULTY: usize = 5;

/// How often the search loop polls its cancel flag.
const CANCEL_POLL_INTERVAL: u64 = 4096;

/// Search configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowParams {
    /// Required leading '0' hex characters
    pub difficulty: usize,

    /// Nonces tried before giving up
    pub max_iterations: u64,
}

impl PowParams {
    pub fn with_difficulty(difficulty: usize) -> Self {
        Self { difficulty, ..Self::default() }
    }
}

impl Default for PowParams {
    fn default() -> Self {
        Self {
            difficulty: CHAIN_DIFFICULTY,
            max_iterations: 1 << 32,
        }
    }
}

/// Successful search result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowProof {
    pub nonce: u64,
    pub digest: String,
    pub iterations: u64,
}

#[derive(Debug, Error)]
pub enum PowError {
    #[error("no valid nonce within {0} iterations")]
    Exhausted(u64),
    #[error("proof-of-work search cancelled")]
    Cancelled,
    #[error("proof-of-work worker failed: {0}")]
    Worker(String),
}

/// Block proof predicate: `sha256("{last_proof}{proof}{last_hash}")` has
/// `difficulty` leading zeros.
pub fn valid_proof(last_proof: u64, proof: u64, last_hash: &str, difficulty: usize) -> bool {
    let guess = format!("{last_proof}{proof}{last_hash}");
    has_leading_zeros(&sha256_hex(guess.as_bytes()), difficulty)
}

/// Scan nonces `0..max_iterations` for the first digest meeting the target.
pub fn search_nonce<F>(params: &PowParams, cancel: &AtomicBool, digest: F) -> Result<PowProof, PowError>
where
    F: Fn(u64) -> String,
{
    for nonce in 0..params.max_iterations {
        if nonce % CANCEL_POLL_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return Err(PowError::Cancelled);
        }
        let d = digest(nonce);
        if has_leading_zeros(&d, params.difficulty) {
            return Ok(PowProof {
                nonce,
                digest: d,
                iterations: nonce + 1,
            });
        }
    }
    Err(PowError::Exhausted(params.max_iterations))
}

/// Digest closure for block proofs chained on `(last_proof, last_hash)`.
pub fn block_digest(last_proof: u64, last_hash: String) -> impl Fn(u64) -> String + Send + 'static {
    move |nonce| sha256_hex(format!("{last_proof}{nonce}{last_hash}").as_bytes())
}

/// Blocking block-proof search.
pub fn proof_of_work(last_proof: u64, last_hash: &str, params: &PowParams) -> Result<u64, PowError> {
    let never = AtomicBool::new(false);
    search_nonce(params, &never, block_digest(last_proof, last_hash.to_string())).map(|p| p.nonce)
}

/// Trips the shared flag when the awaiting side goes away.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Run [`search_nonce`] on the blocking pool.
///
/// With a `timeout`, the search is cancelled once it elapses and
/// `PowError::Cancelled` is returned. Dropping the returned future also
/// cancels the worker.
pub async fn solve<F>(params: PowParams, timeout: Option<Duration>, digest: F) -> Result<PowProof, PowError>
where
    F: Fn(u64) -> String + Send + 'static,
{
    let cancel = Arc::new(AtomicBool::new(false));
    let guard = CancelOnDrop(Arc::clone(&cancel));
    let flag = Arc::clone(&cancel);
    let mut handle = tokio::task::spawn_blocking(move || search_nonce(&params, &flag, digest));

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                // Let the worker observe the flag before reporting.
                let _ = handle.await;
                return Err(PowError::Cancelled);
            }
        },
        None => handle.await,
    };
    drop(guard);
    joined.map_err(|e| PowError::Worker(e.to_string()))?
}
