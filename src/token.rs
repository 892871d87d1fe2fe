//! Point-transfer ledger, independent of the custody chain.
//!
//! Balances are created lazily. Every transfer pays a proof-of-work
//! throttle before it commits, and transfers from the same sender are
//! serialized so the balance check and the debit cannot race.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::sha256_hex;
use crate::pow::{self, PowError, PowParams, TOKEN_DIFFICULTY};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenTransaction {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub transaction_hash: String,
    pub memo: Option<String>,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("sender account {0} does not exist")]
    UnknownSender(String),
    #[error("sender {sender} has insufficient funds (balance {balance}, requested {amount})")]
    InsufficientFunds { sender: String, balance: f64, amount: f64 },
    #[error("transfer amount must be positive, got {0}")]
    InvalidAmount(f64),
    #[error("account {address} is locked until {until}")]
    AccountLocked { address: String, until: DateTime<Utc> },
    #[error(transparent)]
    Pow(#[from] PowError),
}

impl TokenError {
    /// Caller-facing validation failures, as opposed to throttle faults.
    pub fn is_domain_error(&self) -> bool {
        !matches!(self, TokenError::Pow(_))
    }
}

#[derive(Clone, Debug)]
pub struct TokenConfig {
    /// Throttle search parameters
    pub pow: PowParams,
    /// Give up on the throttle after this long
    pub pow_timeout: Option<Duration>,
    /// Window recorded on a recipient after it receives funds
    pub lock_window: Duration,
    /// Reject transfers out of an account whose window is still open
    pub enforce_recipient_lock: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            pow: PowParams::with_difficulty(TOKEN_DIFFICULTY),
            pow_timeout: Some(Duration::from_secs(30)),
            lock_window: Duration::from_secs(5),
            enforce_recipient_lock: false,
        }
    }
}

#[derive(Default)]
struct TokenState {
    balances: HashMap<String, f64>,
    transactions: Vec<TokenTransaction>,
    account_locks: HashMap<String, DateTime<Utc>>,
}

/// Amounts render like `10.0` / `2.5` in hashed strings.
fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 && amount.abs() < 1e16 {
        format!("{amount:.1}")
    } else {
        format!("{amount}")
    }
}

/// Throttle digest for `(sender, amount)`: `sha256("{sender}{amount}{nonce}")`.
pub fn throttle_digest(sender: &str, amount: f64) -> impl Fn(u64) -> String + Send + 'static {
    let prefix = format!("{sender}{}", format_amount(amount));
    move |nonce| sha256_hex(format!("{prefix}{nonce}").as_bytes())
}

/// Per-sender serialization slot. The map entry goes away with the last
/// holder so idle senders cost nothing.
struct SenderGate<'a> {
    ledger: &'a TokenLedger,
    sender: &'a str,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for SenderGate<'_> {
    fn drop(&mut self) {
        let mut gates = self.ledger.gates();
        // map copy + ours; clones only happen under the map lock
        if Arc::strong_count(&self.gate) == 2 {
            gates.remove(self.sender);
        }
    }
}

pub struct TokenLedger {
    state: Mutex<TokenState>,
    sender_gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    config: TokenConfig,
}

impl Default for TokenLedger {
    fn default() -> Self {
        Self::new(TokenConfig::default())
    }
}

impl TokenLedger {
    pub fn new(config: TokenConfig) -> Self {
        Self {
            state: Mutex::new(TokenState::default()),
            sender_gates: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn gates(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.sender_gates.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn gate<'a>(&'a self, sender: &'a str) -> SenderGate<'a> {
        let gate = Arc::clone(self.gates().entry(sender.to_string()).or_default());
        SenderGate { ledger: self, sender, gate }
    }

    /// Open an account with a zero balance; existing accounts are untouched.
    pub fn create_account(&self, address: &str) {
        self.lock().balances.entry(address.to_string()).or_insert(0.0);
    }

    /// Mint `amount` into `address`. Returns the new balance.
    pub fn credit(&self, address: &str, amount: f64) -> Result<f64, TokenError> {
        if !(amount > 0.0 && amount.is_finite()) {
            return Err(TokenError::InvalidAmount(amount));
        }
        let mut state = self.lock();
        let balance = state.balances.entry(address.to_string()).or_insert(0.0);
        *balance += amount;
        Ok(*balance)
    }

    pub fn balance(&self, address: &str) -> Option<f64> {
        self.lock().balances.get(address).copied()
    }

    /// First `limit` logged transfers that involve `address`.
    pub fn transactions_for(&self, address: &str, limit: usize) -> Vec<TokenTransaction> {
        self.lock()
            .transactions
            .iter()
            .filter(|tx| tx.sender == address || tx.recipient == address)
            .take(limit)
            .cloned()
            .collect()
    }

    /// End of the lock window on `address`, if one is still open.
    pub fn locked_until(&self, address: &str) -> Option<DateTime<Utc>> {
        let until = *self.lock().account_locks.get(address)?;
        (until > Utc::now()).then_some(until)
    }

    fn validate(&self, state: &TokenState, sender: &str, amount: f64) -> Result<(), TokenError> {
        let balance = *state
            .balances
            .get(sender)
            .ok_or_else(|| TokenError::UnknownSender(sender.to_string()))?;
        if balance < amount {
            return Err(TokenError::InsufficientFunds {
                sender: sender.to_string(),
                balance,
                amount,
            });
        }
        if !(amount > 0.0 && amount.is_finite()) {
            return Err(TokenError::InvalidAmount(amount));
        }
        if self.config.enforce_recipient_lock {
            if let Some(until) = state.account_locks.get(sender) {
                if *until > Utc::now() {
                    return Err(TokenError::AccountLocked {
                        address: sender.to_string(),
                        until: *until,
                    });
                }
            }
        }
        Ok(())
    }

    /// Move `amount` from `sender` to `recipient` after the throttle.
    pub async fn transfer(
        &self,
        sender: &str,
        recipient: &str,
        amount: f64,
        memo: Option<String>,
    ) -> Result<TokenTransaction, TokenError> {
        if !self.lock().balances.contains_key(sender) {
            return Err(TokenError::UnknownSender(sender.to_string()));
        }
        let gate = self.gate(sender);
        let _turn = gate.gate.lock().await;

        {
            let state = self.lock();
            self.validate(&state, sender, amount)?;
        }

        let proof = pow::solve(self.config.pow, self.config.pow_timeout, throttle_digest(sender, amount)).await?;
        debug!(sender, nonce = proof.nonce, digest = %proof.digest, "transfer throttle solved");

        let mut state = self.lock();
        // Only this gated task debits `sender`; re-check anyway since the
        // lock window may have been opened by an incoming transfer.
        self.validate(&state, sender, amount)?;

        if let Some(balance) = state.balances.get_mut(sender) {
            *balance -= amount;
        }
        *state.balances.entry(recipient.to_string()).or_insert(0.0) += amount;

        let timestamp = Utc::now();
        let window = chrono::Duration::from_std(self.config.lock_window).unwrap_or_else(|_| chrono::Duration::zero());
        state.account_locks.insert(recipient.to_string(), timestamp + window);

        let transaction_hash = sha256_hex(
            format!("{sender}{recipient}{}{}", format_amount(amount), timestamp.to_rfc3339()).as_bytes(),
        );
        let tx = TokenTransaction {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount,
            timestamp,
            transaction_hash,
            memo,
        };
        state.transactions.push(tx.clone());
        info!(sender, recipient, amount, hash = %tx.transaction_hash, "tokens transferred");
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> TokenConfig {
        TokenConfig {
            pow: PowParams::with_difficulty(2),
            ..TokenConfig::default()
        }
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(10.0), "10.0");
        assert_eq!(format_amount(2.5), "2.5");
        assert_eq!(format_amount(0.1), "0.1");
    }

    #[test]
    fn test_throttle_digest_shape() {
        let d = throttle_digest("alice", 10.0);
        assert_eq!(d(7), sha256_hex(b"alice10.07"));
    }

    #[tokio::test]
    async fn test_rejections_leave_balances_untouched() {
        let tokens = TokenLedger::new(quick());
        tokens.credit("alice", 50.0).unwrap();

        let err = tokens.transfer("alice", "bob", 0.0, None).await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidAmount(_)));
        let err = tokens.transfer("ghost", "bob", 10.0, None).await.unwrap_err();
        assert!(matches!(err, TokenError::UnknownSender(_)));
        let err = tokens.transfer("alice", "bob", 60.0, None).await.unwrap_err();
        assert!(matches!(err, TokenError::InsufficientFunds { .. }));
        let err = tokens.transfer("alice", "bob", f64::NAN, None).await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidAmount(_)));

        assert!(err.is_domain_error());
        assert_eq!(tokens.balance("alice"), Some(50.0));
        assert_eq!(tokens.balance("bob"), None);
        assert!(tokens.transactions_for("alice", 10).is_empty());
    }

    #[tokio::test]
    async fn test_sender_gates_do_not_accumulate() {
        let tokens = Arc::new(TokenLedger::new(quick()));
        for i in 0..50 {
            let err = tokens.transfer(&format!("ghost-{i}"), "bob", 1.0, None).await.unwrap_err();
            assert!(matches!(err, TokenError::UnknownSender(_)));
        }
        assert!(tokens.gates().is_empty());

        tokens.credit("alice", 100.0).unwrap();
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let tokens = Arc::clone(&tokens);
            tasks.push(tokio::spawn(async move { tokens.transfer("alice", "bob", 5.0, None).await }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        tokens.transfer("alice", "carol", 500.0, None).await.unwrap_err();

        assert_eq!(tokens.balance("alice"), Some(60.0));
        assert!(tokens.gates().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_moves_funds_and_records() {
        let tokens = TokenLedger::new(quick());
        tokens.credit("alice", 50.0).unwrap();
        let tx = tokens
            .transfer("alice", "bob", 20.0, Some("thanks".into()))
            .await
            .unwrap();

        assert_eq!(tokens.balance("alice"), Some(30.0));
        assert_eq!(tokens.balance("bob"), Some(20.0));
        assert_eq!(tx.memo.as_deref(), Some("thanks"));
        let expected = sha256_hex(format!("alicebob20.0{}", tx.timestamp.to_rfc3339()).as_bytes());
        assert_eq!(tx.transaction_hash, expected);
        assert!(tokens.locked_until("bob").is_some());
        assert!(tokens.locked_until("alice").is_none());
        assert_eq!(tokens.transactions_for("bob", 10), vec![tx]);
    }

    #[tokio::test]
    async fn test_concurrent_transfers_never_overdraw() {
        let tokens = Arc::new(TokenLedger::new(quick()));
        tokens.credit("alice", 100.0).unwrap();
        let mut tasks = Vec::new();
        for i in 0..10 {
            let tokens = Arc::clone(&tokens);
            tasks.push(tokio::spawn(async move {
                tokens.transfer("alice", &format!("r{i}"), 15.0, None).await
            }));
        }
        let mut ok = 0;
        for t in tasks {
            match t.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert!(matches!(e, TokenError::InsufficientFunds { .. })),
            }
        }
        assert_eq!(ok, 6);
        assert_eq!(tokens.balance("alice"), Some(10.0));
    }

    #[tokio::test]
    async fn test_enforced_lock_blocks_onward_transfer() {
        let tokens = TokenLedger::new(TokenConfig {
            enforce_recipient_lock: true,
            ..quick()
        });
        tokens.credit("alice", 10.0).unwrap();
        tokens.transfer("alice", "bob", 5.0, None).await.unwrap();
        let err = tokens.transfer("bob", "carol", 1.0, None).await.unwrap_err();
        assert!(matches!(err, TokenError::AccountLocked { .. }));
        assert_eq!(tokens.balance("bob"), Some(5.0));
    }

    #[tokio::test]
    async fn test_lock_not_enforced_by_default() {
        let tokens = TokenLedger::new(quick());
        tokens.credit("alice", 10.0).unwrap();
        tokens.transfer("alice", "bob", 5.0, None).await.unwrap();
        tokens.transfer("bob", "carol", 1.0, None).await.unwrap();
        assert_eq!(tokens.balance("carol"), Some(1.0));
    }

    #[test]
    fn test_credit_and_accounts() {
        let tokens = TokenLedger::default();
        tokens.create_account("x");
        assert_eq!(tokens.balance("x"), Some(0.0));
        assert!(tokens.credit("x", -1.0).is_err());
        assert_eq!(tokens.credit("x", 2.5).unwrap(), 2.5);
        tokens.create_account("x");
        assert_eq!(tokens.balance("x"), Some(2.5));
    }
}
