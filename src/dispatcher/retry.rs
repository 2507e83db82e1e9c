//! Retry and error recovery for transaction submission
//!
//! Exponential backoff plus a string classifier that maps node errors onto
//! the action the dispatcher should take next.

use eyre::Result;
use std::time::Duration;
use tracing::{debug, warn};

/// Transaction retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum retries after the first attempt
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Calculate backoff duration for a given attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Classifies errors for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Temporary failure - should retry (RPC timeout, network issues)
    Transient,
    /// Fee bid too low - retry with a higher bid
    Underpriced,
    /// Nonce already used - resync the cursor
    NonceTooLow,
    /// Nonce ahead of the chain - resync the cursor
    NonceTooHigh,
    /// Permanent failure - do not retry (revert, bad signature, no funds)
    Permanent,
    /// Unknown error - may retry with backoff
    Unknown,
}

impl ErrorClass {
    pub fn is_nonce_conflict(&self) -> bool {
        matches!(self, ErrorClass::NonceTooLow | ErrorClass::NonceTooHigh)
    }
}

/// Classify an error for retry decisions
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    // Nonce errors first: "nonce too low" often arrives wrapped in a
    // transport error string
    if error_lower.contains("nonce too low")
        || error_lower.contains("already known")
        || error_lower.contains("nonce has already been used")
    {
        return ErrorClass::NonceTooLow;
    }

    if error_lower.contains("nonce too high") || error_lower.contains("nonce gap") {
        return ErrorClass::NonceTooHigh;
    }

    // Transient errors
    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
    {
        return ErrorClass::Transient;
    }

    // Fee errors
    if error_lower.contains("underpriced")
        || error_lower.contains("replacement transaction")
        || error_lower.contains("gas price too low")
        || error_lower.contains("max fee per gas less than")
        || error_lower.contains("fee cap less than block base fee")
    {
        return ErrorClass::Underpriced;
    }

    // Permanent errors
    if error_lower.contains("reverted")
        || error_lower.contains("execution reverted")
        || error_lower.contains("invalid signature")
        || error_lower.contains("insufficient funds")
        || error_lower.contains("out of gas")
        || error_lower.contains("invalid parameters")
        || error_lower.contains("already executed")
        || error_lower.contains("unauthorized")
    {
        return ErrorClass::Permanent;
    }

    ErrorClass::Unknown
}

/// Action to take after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryAction {
    /// Retry after a backoff period
    RetryAfter(Duration),
    /// Retry with an escalated fee bid
    BumpFees,
    /// Resync the nonce cursor, then retry
    Resync,
    /// Give up on this attempt
    Fail,
}

/// Retry context for one submission
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub config: RetryConfig,
    pub attempt: u32,
    pub last_error: Option<String>,
}

impl RetryContext {
    pub fn with_config(config: RetryConfig) -> Self {
        Self {
            config,
            attempt: 0,
            last_error: None,
        }
    }

    /// Record a failed attempt
    pub fn record_failure(&mut self, error: String) {
        self.attempt += 1;
        self.last_error = Some(error);
    }

    /// Get the decision for the next attempt
    pub fn next_action(&self) -> RetryAction {
        let error = self.last_error.as_deref().unwrap_or("");
        let error_class = classify_error(error);

        if error_class == ErrorClass::Permanent {
            warn!(error = %error, "Permanent error, not retrying");
            return RetryAction::Fail;
        }
        if !self.config.should_retry(self.attempt) {
            debug!(attempt = self.attempt, "Retry budget exhausted");
            return RetryAction::Fail;
        }

        match error_class {
            ErrorClass::NonceTooLow | ErrorClass::NonceTooHigh => {
                debug!(class = ?error_class, "Nonce conflict, resyncing");
                RetryAction::Resync
            }
            ErrorClass::Underpriced => {
                debug!("Underpriced, retrying with bumped fees");
                RetryAction::BumpFees
            }
            ErrorClass::Transient | ErrorClass::Unknown => {
                let backoff = self.config.backoff_for_attempt(self.attempt - 1);
                debug!(?backoff, attempt = self.attempt, "Transient error, retrying");
                RetryAction::RetryAfter(backoff)
            }
            ErrorClass::Permanent => RetryAction::Fail,
        }
    }
}

/// Run a read-only chain call, retrying transient failures with backoff
pub async fn with_retry<F, T, Fut>(config: &RetryConfig, what: &str, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut ctx = RetryContext::with_config(config.clone());

    loop {
        match operation(ctx.attempt).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let error_str = format!("{:#}", e);
                ctx.record_failure(error_str.clone());

                match ctx.next_action() {
                    RetryAction::RetryAfter(backoff) => {
                        warn!(
                            attempt = ctx.attempt,
                            max = config.max_retries,
                            ?backoff,
                            error = %error_str,
                            "{} failed, retrying after backoff",
                            what
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    _ => {
                        return Err(e.wrap_err(format!("{} failed after {} attempts", what, ctx.attempt)));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::eyre;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_calculation() {
        let config = RetryConfig::default();

        assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(2));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(4));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(8));
        assert_eq!(config.backoff_for_attempt(4), Duration::from_secs(32));
        assert_eq!(config.backoff_for_attempt(5), Duration::from_secs(60)); // capped
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(classify_error("connection timeout"), ErrorClass::Transient);
        assert_eq!(
            classify_error("replacement transaction underpriced"),
            ErrorClass::Underpriced
        );
        assert_eq!(classify_error("nonce too low: 4"), ErrorClass::NonceTooLow);
        assert_eq!(classify_error("Nonce too high"), ErrorClass::NonceTooHigh);
        assert_eq!(classify_error("execution reverted"), ErrorClass::Permanent);
        assert_eq!(classify_error("some unknown error"), ErrorClass::Unknown);
        assert!(classify_error("nonce too low").is_nonce_conflict());
        assert!(!classify_error("execution reverted").is_nonce_conflict());
    }

    #[test]
    fn test_next_action() {
        let mut ctx = RetryContext::with_config(RetryConfig::with_max_retries(3));
        ctx.record_failure("nonce too low".to_string());
        assert_eq!(ctx.next_action(), RetryAction::Resync);
        ctx.record_failure("transaction underpriced".to_string());
        assert_eq!(ctx.next_action(), RetryAction::BumpFees);
        ctx.record_failure("connection reset".to_string());
        assert_eq!(ctx.next_action(), RetryAction::Fail); // budget exhausted

        let mut ctx = RetryContext::with_config(RetryConfig::default());
        ctx.record_failure("execution reverted: bad proof".to_string());
        assert_eq!(ctx.next_action(), RetryAction::Fail);
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient() {
        let config = RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        };
        let calls = AtomicU32::new(0);
        let result = with_retry(&config, "status check", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(eyre!("connection refused"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        let value = tokio_test::assert_ok!(result);
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_stops_on_permanent() {
        let config = RetryConfig::default();
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&config, "status check", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(eyre!("execution reverted")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
