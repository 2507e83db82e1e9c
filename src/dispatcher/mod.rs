//! Transaction dispatcher
//!
//! One dispatcher per destination chain. It owns the chain's nonce
//! sequencer and drives every execution transaction through
//!
//! ```text
//! PENDING -> SUBMITTED -> CONFIRMED | FAILED
//! FAILED -> SUBMITTED                      (retry, bounded, escalating fee)
//! SUBMITTED -> REPLACED -> CONFIRMED | FAILED   (speed-up, same nonce)
//! SUBMITTED -> REPLACED -> CANCELLED            (cancel, same nonce)
//! ```
//!
//! Before broadcasting, the destination bridge is asked whether the message
//! was already executed (or marked failed); if so the call short-circuits
//! with `already_processed` and nothing is sent.
//!
//! A message has at most one in-flight transaction. Submitting a message
//! whose transaction is still unconfirmed resumes that transaction (same
//! nonce, higher bid) instead of spending another nonce.

use alloy::primitives::{B256, U256};
use chrono::Utc;
use eyre::{eyre, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::chain::{DestinationChain, TxRequest};
use crate::config::{DispatcherConfig, FeeConfig};
use crate::error::RelayError;
use crate::metrics;
use crate::nonce::{NonceCursor, NonceSequencer};
use crate::types::{
    ChainId, ExecutionCall, FeeBid, MessageKey, PendingTransaction, ProofBundle, RelayMessage,
    TxResult, TxStatus,
};

pub mod gas;
pub mod retry;

pub use gas::GasPolicy;
pub use retry::{classify_error, ErrorClass, RetryAction, RetryConfig, RetryContext};

/// Gas for a zero-value self transfer
const CANCEL_GAS_LIMIT: u64 = 21_000;

/// Finished transactions kept for inspection
const HISTORY_LIMIT: usize = 1_000;

/// Circuit breaker configuration for a dispatcher
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before pausing
    pub threshold: u32,
    /// How long to pause when circuit breaker trips
    pub pause_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            pause_duration: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Point-in-time view of a dispatcher
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherHealth {
    pub chain_id: ChainId,
    pub signer: String,
    pub available: bool,
    pub consecutive_failures: u32,
    pub tx_submitted: u64,
    pub tx_confirmed: u64,
    pub tx_failed: u64,
    pub pending: usize,
    pub next_nonce: u64,
    pub nonces_in_flight: usize,
}

pub struct TransactionDispatcher {
    chain: Arc<dyn DestinationChain>,
    nonces: NonceSequencer,
    gas: GasPolicy,
    retry: RetryConfig,
    config: DispatcherConfig,
    circuit_breaker: CircuitBreakerConfig,
    transactions: Mutex<BTreeMap<u64, PendingTransaction>>,
    next_tx_id: AtomicU64,
    consecutive_failures: AtomicU32,
    paused_until: Mutex<Option<Instant>>,
    tx_submitted: AtomicU64,
    tx_confirmed: AtomicU64,
    tx_failed: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TransactionDispatcher {
    pub fn new(
        chain: Arc<dyn DestinationChain>,
        fees: &FeeConfig,
        config: DispatcherConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            nonces: NonceSequencer::new(chain.clone()),
            chain,
            gas: GasPolicy::from(fees),
            retry,
            config,
            circuit_breaker: CircuitBreakerConfig::default(),
            transactions: Mutex::new(BTreeMap::new()),
            next_tx_id: AtomicU64::new(1),
            consecutive_failures: AtomicU32::new(0),
            paused_until: Mutex::new(None),
            tx_submitted: AtomicU64::new(0),
            tx_confirmed: AtomicU64::new(0),
            tx_failed: AtomicU64::new(0),
        }
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    /// Sync the nonce cursor and report the signer's balance
    pub async fn initialize(&self) -> Result<()> {
        let next_nonce = self.nonces.sync().await?;
        let balance = self.chain.balance().await?;
        if balance.is_zero() {
            warn!(
                chain_id = self.chain_id(),
                signer = %self.chain.signer_address(),
                "Relayer signer has zero balance on destination chain"
            );
        }
        info!(
            chain_id = self.chain_id(),
            signer = %self.chain.signer_address(),
            next_nonce,
            balance = %balance,
            "Transaction dispatcher initialized"
        );
        Ok(())
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain.chain_id()
    }

    /// Execute with a Merkle proof anchored at `anchor_block`
    pub async fn submit_with_proof(
        &self,
        message: &RelayMessage,
        proof: &ProofBundle,
        anchor_block: u64,
    ) -> Result<TxResult> {
        self.submit(ExecutionCall::WithProof {
            message: message.clone(),
            proof: proof.proof.clone(),
            anchor_block,
        })
        .await
    }

    /// Execute on the relayer's authority alone
    pub async fn submit_trusted(&self, message: &RelayMessage) -> Result<TxResult> {
        self.submit(ExecutionCall::Trusted {
            message: message.clone(),
        })
        .await
    }

    async fn submit(&self, call: ExecutionCall) -> Result<TxResult> {
        let message = call
            .message()
            .ok_or_else(|| eyre!("submission requires a message"))?;
        let key = message.key();

        if let Some(tx) = self.in_flight_for(key) {
            debug!(
                chain_id = self.chain_id(),
                tx_id = tx.tx_id,
                message = %key,
                "Message already has an in-flight transaction, resuming it"
            );
            return self.resume(tx.tx_id).await;
        }

        if self.already_processed(key).await? {
            info!(
                chain_id = self.chain_id(),
                message = %key,
                "Message already processed on destination, skipping submission"
            );
            return Ok(TxResult::already_processed());
        }

        let tx_id = self.register(call, key);
        self.broadcast_and_confirm(tx_id).await
    }

    /// Re-send a failed transaction with a fresh nonce and a higher bid
    pub async fn retry(&self, tx_id: u64) -> Result<TxResult> {
        let tx = self.snapshot(tx_id)?;
        if tx.status != TxStatus::Failed {
            return Err(RelayError::InvalidState {
                tx_id,
                status: tx.status.to_string(),
                action: "retry",
            }
            .into());
        }
        if !self.retry.should_retry(tx.retries) {
            return Err(RelayError::RetriesExhausted {
                tx_id,
                retries: tx.retries,
            }
            .into());
        }

        let backoff = self.retry.backoff_for_attempt(tx.retries);
        debug!(tx_id, ?backoff, retries = tx.retries, "Retrying transaction after backoff");
        tokio::time::sleep(backoff).await;

        if let Some(key) = tx.related_message {
            if self.already_processed(key).await? {
                self.update(tx_id, |tx| {
                    tx.status = TxStatus::Confirmed;
                    tx.last_error = None;
                });
                return Ok(TxResult {
                    tx_id: Some(tx_id),
                    ..TxResult::already_processed()
                });
            }
        }

        self.update(tx_id, |tx| {
            tx.retries += 1;
            tx.status = TxStatus::Pending;
            tx.hash = None;
            tx.nonce = None;
        });
        self.broadcast_and_confirm(tx_id).await
    }

    /// Replace an in-flight transaction with the same nonce and a higher bid
    pub async fn speed_up(&self, tx_id: u64) -> Result<TxResult> {
        let (tx, nonce, previous) = self.in_flight(tx_id, "speed up")?;
        let fees = self
            .gas
            .speed_up(previous)
            .ok_or_else(|| eyre!("transaction {} is already bidding the fee ceiling", tx_id))?;

        let request = TxRequest {
            gas_limit: self.gas_limit_for(&tx.call),
            call: tx.call.clone(),
            nonce,
            fees,
        };
        self.replace(tx_id, &tx, request, TxStatus::Confirmed).await
    }

    /// Push an unconfirmed transaction through: a same-nonce replacement at
    /// a higher bid, or another receipt wait once the bid is at the ceiling
    pub async fn resume(&self, tx_id: u64) -> Result<TxResult> {
        let (tx, nonce, previous) = self.in_flight(tx_id, "resume")?;
        if tx.cancel_sent {
            return self.cancel(tx_id).await;
        }
        if self.gas.speed_up(previous).is_some() {
            return self.speed_up(tx_id).await;
        }
        self.rewait(tx_id, &tx, nonce).await
    }

    /// Free the nonce of an in-flight transaction with a zero-value self
    /// transfer. At the fee ceiling no replacement can outbid the current
    /// one, so this waits on the current broadcast instead.
    pub async fn cancel(&self, tx_id: u64) -> Result<TxResult> {
        let (tx, nonce, previous) = self.in_flight(tx_id, "cancel")?;
        let Some(fees) = self.gas.speed_up(previous) else {
            return self.rewait(tx_id, &tx, nonce).await;
        };

        let request = TxRequest {
            call: ExecutionCall::Cancel,
            nonce,
            gas_limit: CANCEL_GAS_LIMIT,
            fees,
        };
        self.replace(tx_id, &tx, request, TxStatus::Cancelled).await
    }

    /// The unconfirmed transaction carrying a message, if any
    pub fn in_flight_for(&self, key: MessageKey) -> Option<PendingTransaction> {
        lock(&self.transactions)
            .values()
            .rev()
            .find(|tx| tx.related_message == Some(key) && tx.status.is_in_flight())
            .cloned()
    }

    /// Transactions not yet confirmed or cancelled, oldest first
    pub fn pending_transactions(&self) -> Vec<PendingTransaction> {
        lock(&self.transactions)
            .values()
            .filter(|tx| !tx.status.is_terminal())
            .cloned()
            .collect()
    }

    pub fn transaction(&self, tx_id: u64) -> Option<PendingTransaction> {
        lock(&self.transactions).get(&tx_id).cloned()
    }

    pub async fn balance(&self) -> Result<U256> {
        self.chain.balance().await
    }

    pub async fn nonce_cursor(&self) -> NonceCursor {
        self.nonces.cursor().await
    }

    /// False while the circuit breaker is open
    pub fn is_available(&self) -> bool {
        let mut paused = lock(&self.paused_until);
        match *paused {
            Some(until) if Instant::now() < until => false,
            Some(_) => {
                info!(chain_id = self.chain_id(), "Circuit breaker reset, resuming submissions");
                *paused = None;
                self.consecutive_failures.store(0, Ordering::Relaxed);
                metrics::set_consecutive_failures(self.chain_id(), 0);
                true
            }
            None => true,
        }
    }

    pub async fn health(&self) -> DispatcherHealth {
        let cursor = self.nonces.cursor().await;
        DispatcherHealth {
            chain_id: self.chain_id(),
            signer: self.chain.signer_address().to_string(),
            available: self.is_available(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            tx_submitted: self.tx_submitted.load(Ordering::Relaxed),
            tx_confirmed: self.tx_confirmed.load(Ordering::Relaxed),
            tx_failed: self.tx_failed.load(Ordering::Relaxed),
            pending: self.pending_transactions().len(),
            next_nonce: cursor.next,
            nonces_in_flight: cursor.in_flight.len(),
        }
    }

    async fn already_processed(&self, key: MessageKey) -> Result<bool> {
        let status = retry::with_retry(&self.retry, "message status check", |_| {
            self.chain.message_status(key)
        })
        .await
        .map_err(|e| {
            self.record_failure();
            e
        })?;
        Ok(status.is_final())
    }

    fn register(&self, call: ExecutionCall, key: MessageKey) -> u64 {
        let tx_id = self.next_tx_id.fetch_add(1, Ordering::Relaxed);
        let mut transactions = lock(&self.transactions);
        // fee escalation carries across resubmissions of the same message
        let prior_failures = transactions
            .values()
            .filter(|tx| tx.related_message == Some(key) && tx.status == TxStatus::Failed)
            .count() as u32;
        transactions.insert(
            tx_id,
            PendingTransaction {
                tx_id,
                dest_chain_id: self.chain_id(),
                hash: None,
                nonce: None,
                status: TxStatus::Pending,
                submitted_at: None,
                retries: prior_failures,
                related_message: Some(key),
                mode: call.mode(),
                fees: None,
                last_error: None,
                cancel_sent: false,
                call,
            },
        );
        tx_id
    }

    async fn broadcast_and_confirm(&self, tx_id: u64) -> Result<TxResult> {
        let tx = self.snapshot(tx_id)?;
        let gas_limit = self.gas_limit_for(&tx.call);

        let estimate = match retry::with_retry(&self.retry, "fee estimate", |_| {
            self.chain.fee_estimate()
        })
        .await
        {
            Ok(estimate) => estimate,
            Err(e) => {
                self.fail(tx_id, format!("{:#}", e));
                return Err(e);
            }
        };
        let mut fees = self.gas.bid_for_attempt(estimate, tx.retries);

        let mut ctx = RetryContext::with_config(RetryConfig {
            max_retries: self.config.max_send_attempts.saturating_sub(1),
            ..self.retry.clone()
        });

        let (hash, nonce) = loop {
            let nonce = match self.nonces.next_nonce().await {
                Ok(nonce) => nonce,
                Err(e) => {
                    self.fail(tx_id, format!("{:#}", e));
                    return Err(e);
                }
            };
            let request = TxRequest {
                call: tx.call.clone(),
                nonce,
                gas_limit,
                fees,
            };

            match self.chain.send_transaction(request).await {
                Ok(hash) => break (hash, nonce),
                Err(e) => {
                    // never broadcast, so the nonce can be handed out again
                    self.nonces.release(nonce).await;
                    let error_str = format!("{:#}", e);
                    ctx.record_failure(error_str.clone());

                    match ctx.next_action() {
                        RetryAction::Resync => {
                            warn!(
                                chain_id = self.chain_id(),
                                tx_id,
                                nonce,
                                error = %error_str,
                                "Nonce conflict, resyncing cursor"
                            );
                            if let Err(resync_err) = self.nonces.resync().await {
                                warn!(chain_id = self.chain_id(), error = %resync_err, "Nonce resync failed");
                            }
                        }
                        RetryAction::BumpFees => {
                            fees = self.gas.bump(fees);
                            debug!(tx_id, max_fee = fees.max_fee_per_gas, "Bumped fee bid");
                        }
                        RetryAction::RetryAfter(backoff) => {
                            tokio::time::sleep(backoff).await;
                        }
                        RetryAction::Fail => {
                            metrics::record_error(self.chain_id(), "submit");
                            return Ok(self.fail(tx_id, error_str));
                        }
                    }
                }
            }
        };

        self.update(tx_id, |tx| {
            tx.status = TxStatus::Submitted;
            tx.hash = Some(hash);
            tx.nonce = Some(nonce);
            tx.fees = Some(fees);
            tx.submitted_at = Some(Utc::now());
            tx.last_error = None;
        });
        self.tx_submitted.fetch_add(1, Ordering::Relaxed);
        metrics::record_tx_submitted(self.chain_id(), tx.mode);
        info!(
            chain_id = self.chain_id(),
            tx_id,
            nonce,
            tx_hash = %hash,
            mode = tx.mode,
            message = ?tx.related_message,
            "Transaction submitted"
        );

        Ok(self
            .await_receipt(tx_id, hash, nonce, TxStatus::Confirmed)
            .await)
    }

    /// Broadcast a same-nonce replacement and wait for whichever version mines
    async fn replace(
        &self,
        tx_id: u64,
        original: &PendingTransaction,
        request: TxRequest,
        on_success: TxStatus,
    ) -> Result<TxResult> {
        let nonce = request.nonce;
        let fees = request.fees;
        let action = if on_success == TxStatus::Cancelled {
            "cancel"
        } else {
            "speed_up"
        };

        match self.chain.send_transaction(request).await {
            Ok(hash) => {
                self.update(tx_id, |tx| {
                    tx.status = TxStatus::Replaced;
                    tx.hash = Some(hash);
                    tx.fees = Some(fees);
                    tx.submitted_at = Some(Utc::now());
                    tx.cancel_sent = on_success == TxStatus::Cancelled;
                });
                metrics::record_tx_submitted(self.chain_id(), action);
                info!(
                    chain_id = self.chain_id(),
                    tx_id,
                    nonce,
                    tx_hash = %hash,
                    max_fee = fees.max_fee_per_gas,
                    action,
                    "Replacement transaction submitted"
                );
                Ok(self.await_receipt(tx_id, hash, nonce, on_success).await)
            }
            Err(e) if classify_error(&format!("{:#}", e)) == ErrorClass::NonceTooLow => {
                // some earlier broadcast for this nonce already mined
                debug!(tx_id, nonce, "Replacement rejected, nonce already consumed");
                self.settle_consumed(tx_id, original, nonce).await
            }
            Err(e) => {
                warn!(chain_id = self.chain_id(), tx_id, action, error = %e, "Replacement failed");
                Err(e)
            }
        }
    }

    async fn await_receipt(
        &self,
        tx_id: u64,
        hash: B256,
        nonce: u64,
        on_success: TxStatus,
    ) -> TxResult {
        let timeout = self.config.confirmation_timeout();
        match self.chain.wait_for_receipt(hash, timeout).await {
            Ok(Some(true)) => {
                self.nonces.confirm(nonce).await;
                info!(
                    chain_id = self.chain_id(),
                    tx_id,
                    nonce,
                    tx_hash = %hash,
                    status = %on_success,
                    "Transaction confirmed"
                );
                self.succeed(tx_id, on_success)
            }
            Ok(Some(false)) => {
                // a reverted transaction still consumes its nonce
                self.nonces.confirm(nonce).await;
                let reason = RelayError::Reverted {
                    chain_id: self.chain_id(),
                    tx_hash: hash.to_string(),
                }
                .to_string();
                self.fail(tx_id, reason)
            }
            Ok(None) => {
                let reason = RelayError::Timeout(format!("receipt of {}", hash)).to_string();
                warn!(
                    chain_id = self.chain_id(),
                    tx_id,
                    nonce,
                    timeout_ms = timeout.as_millis() as u64,
                    "Confirmation timed out, transaction left in flight"
                );
                self.stalled(tx_id, reason)
            }
            Err(e) => {
                warn!(chain_id = self.chain_id(), tx_id, error = %e, "Receipt lookup failed");
                self.stalled(tx_id, format!("{:#}", e))
            }
        }
    }

    /// Wait again on the latest broadcast of an in-flight transaction
    async fn rewait(&self, tx_id: u64, tx: &PendingTransaction, nonce: u64) -> Result<TxResult> {
        let hash = tx
            .hash
            .ok_or_else(|| eyre!("transaction {} has no hash", tx_id))?;
        warn!(
            chain_id = self.chain_id(),
            tx_id,
            nonce,
            "Bid already at the fee ceiling, waiting on the current broadcast"
        );
        let on_success = if tx.cancel_sent {
            TxStatus::Cancelled
        } else {
            TxStatus::Confirmed
        };
        Ok(self.await_receipt(tx_id, hash, nonce, on_success).await)
    }

    /// Resolve a transaction whose nonce is spent by a broadcast we are not
    /// waiting on. The message status tells which version mined.
    async fn settle_consumed(
        &self,
        tx_id: u64,
        tx: &PendingTransaction,
        nonce: u64,
    ) -> Result<TxResult> {
        let executed = match tx.related_message {
            Some(key) => self.already_processed(key).await?,
            None => false,
        };
        self.nonces.confirm(nonce).await;

        if executed {
            info!(chain_id = self.chain_id(), tx_id, nonce, "Message executed by an earlier broadcast");
            Ok(self.succeed(tx_id, TxStatus::Confirmed))
        } else if tx.cancel_sent {
            info!(chain_id = self.chain_id(), tx_id, nonce, "Nonce freed by cancellation");
            Ok(self.succeed(tx_id, TxStatus::Cancelled))
        } else {
            Ok(self.fail(
                tx_id,
                format!("nonce {} consumed without executing the message", nonce),
            ))
        }
    }

    fn succeed(&self, tx_id: u64, status: TxStatus) -> TxResult {
        self.update(tx_id, |tx| {
            tx.status = status;
            tx.last_error = None;
        });
        self.tx_confirmed.fetch_add(1, Ordering::Relaxed);
        self.record_success();
        metrics::record_tx_outcome(self.chain_id(), status.as_str());
        self.prune_history();
        self.result_for(tx_id)
    }

    /// The transaction may still mine; leave it in flight for speed-up/cancel
    fn stalled(&self, tx_id: u64, reason: String) -> TxResult {
        self.update(tx_id, |tx| tx.last_error = Some(reason));
        self.record_failure();
        metrics::record_error(self.chain_id(), "confirmation");
        self.result_for(tx_id)
    }

    fn fail(&self, tx_id: u64, reason: String) -> TxResult {
        error!(chain_id = self.chain_id(), tx_id, error = %reason, "Transaction failed");
        self.update(tx_id, |tx| {
            tx.status = TxStatus::Failed;
            tx.last_error = Some(reason);
        });
        self.tx_failed.fetch_add(1, Ordering::Relaxed);
        self.record_failure();
        metrics::record_tx_outcome(self.chain_id(), TxStatus::Failed.as_str());
        self.prune_history();
        self.result_for(tx_id)
    }

    fn record_success(&self) {
        if self.consecutive_failures.swap(0, Ordering::Relaxed) > 0 {
            metrics::set_consecutive_failures(self.chain_id(), 0);
        }
    }

    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::set_consecutive_failures(self.chain_id(), failures);
        if failures >= self.circuit_breaker.threshold {
            let mut paused = lock(&self.paused_until);
            if paused.is_none() {
                error!(
                    chain_id = self.chain_id(),
                    failures,
                    pause_secs = self.circuit_breaker.pause_duration.as_secs(),
                    "Circuit breaker tripped, pausing submissions"
                );
                *paused = Some(Instant::now() + self.circuit_breaker.pause_duration);
            }
        }
    }

    fn gas_limit_for(&self, call: &ExecutionCall) -> u64 {
        match call.message() {
            Some(message) => message.gas_limit.saturating_add(self.config.gas_overhead),
            None => CANCEL_GAS_LIMIT,
        }
    }

    fn snapshot(&self, tx_id: u64) -> Result<PendingTransaction> {
        self.transaction(tx_id)
            .ok_or_else(|| RelayError::UnknownTransaction(tx_id).into())
    }

    fn in_flight(
        &self,
        tx_id: u64,
        action: &'static str,
    ) -> Result<(PendingTransaction, u64, FeeBid)> {
        let tx = self.snapshot(tx_id)?;
        match (tx.status.is_in_flight(), tx.nonce, tx.fees) {
            (true, Some(nonce), Some(fees)) => Ok((tx, nonce, fees)),
            _ => Err(RelayError::InvalidState {
                tx_id,
                status: tx.status.to_string(),
                action,
            }
            .into()),
        }
    }

    fn update(&self, tx_id: u64, f: impl FnOnce(&mut PendingTransaction)) {
        if let Some(tx) = lock(&self.transactions).get_mut(&tx_id) {
            f(tx);
        }
    }

    fn result_for(&self, tx_id: u64) -> TxResult {
        match self.transaction(tx_id) {
            Some(tx) => TxResult {
                tx_id: Some(tx_id),
                success: tx.status.is_terminal(),
                status: tx.status,
                hash: tx.hash,
                nonce: tx.nonce,
                already_processed: false,
                error: tx.last_error,
            },
            None => TxResult {
                tx_id: Some(tx_id),
                success: false,
                status: TxStatus::Failed,
                hash: None,
                nonce: None,
                already_processed: false,
                error: Some(RelayError::UnknownTransaction(tx_id).to_string()),
            },
        }
    }

    /// Drop the oldest finished transactions beyond `HISTORY_LIMIT`
    fn prune_history(&self) {
        let mut transactions = lock(&self.transactions);
        let finished: Vec<u64> = transactions
            .values()
            .filter(|tx| tx.status.is_terminal() || tx.status == TxStatus::Failed)
            .map(|tx| tx.tx_id)
            .collect();
        if finished.len() <= HISTORY_LIMIT {
            return;
        }
        for tx_id in &finished[..finished.len() - HISTORY_LIMIT] {
            transactions.remove(tx_id);
        }
    }
}
