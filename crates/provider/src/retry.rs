//! Classified retry around provider calls.
//!
//! Authentication failures are surfaced immediately (and trip the credential
//! watch exactly once); transient failures back off exponentially with
//! jitter; anything else is returned as-is on the first attempt.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ErrorClass, ProviderError};
use crate::rng::RandomSource;

// ── Credential watch ──────────────────────────────────────────────────────────

/// Told that the provider rejected our credentials.  Hears about it at most
/// once until the watch is re-armed, however many call sites fail.
pub trait CredentialObserver: Send + Sync {
    fn credential_invalid(&self, detail: &str);
}

/// Once-only latch in front of a [`CredentialObserver`].
#[derive(Clone)]
pub struct CredentialWatch {
    tripped: Arc<AtomicBool>,
    observer: Arc<dyn CredentialObserver>,
}

impl CredentialWatch {
    pub fn new(observer: Arc<dyn CredentialObserver>) -> Self {
        Self {
            tripped: Arc::new(AtomicBool::new(false)),
            observer,
        }
    }

    pub fn mark_invalid(&self, detail: &str) {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            self.observer.credential_invalid(detail);
        }
    }

    /// Re-arm after the host has rotated keys.
    pub fn reset(&self) {
        self.tripped.store(false, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

// ── Retry policy ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_jitter: Duration,
    rng: Arc<dyn RandomSource>,
    credentials: CredentialWatch,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_jitter: Duration,
        rng: Arc<dyn RandomSource>,
        credentials: CredentialWatch,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_jitter,
            rng,
            credentials,
        }
    }

    pub fn credentials(&self) -> &CredentialWatch {
        &self.credentials
    }

    /// Run `call`, retrying transient failures until the attempt budget is
    /// spent.  `operation` only labels log lines.
    pub async fn execute<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "provider call recovered");
                    }
                    return Ok(value);
                }
                Err(err) => match err.class() {
                    ErrorClass::Authentication => {
                        self.credentials.mark_invalid(&err.to_string());
                        return Err(err);
                    }
                    ErrorClass::Retriable if attempt < self.max_attempts => {
                        let delay = self.backoff_delay(attempt);
                        warn!(
                            operation,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            %err,
                            "provider unavailable, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    ErrorClass::Retriable => {
                        warn!(operation, attempt, %err, "retry budget exhausted");
                        return Err(err);
                    }
                    ErrorClass::Fatal => return Err(err),
                },
            }
        }
    }

    /// Delay before the retry that follows failure number `completed`
    /// (1-based): `base * 2^(completed-1)` plus uniform jitter.
    fn backoff_delay(&self, completed: u32) -> Duration {
        let factor = 2u32.saturating_pow(completed.saturating_sub(1).min(16));
        let jitter_ms = (self.max_jitter.as_millis() as f64 * self.rng.next_f64()) as u64;
        self.base_delay.saturating_mul(factor) + Duration::from_millis(jitter_ms)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
