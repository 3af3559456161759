//! Per-bank scraping flows.
//!
//! A flow drives one page context through navigate → wait-stable → flatten →
//! parse, with every step guarded by a timeout and the caller's
//! cancellation signal.

pub mod bbva;

pub use bbva::BbvaScraper;

use crate::cancel::CancelSignal;
use crate::error::{ErrorCause, ScraperError, ScraperResult};
use crate::login::{LoginOutcome, Session};
use crate::model::{Balance, BankCode, Credentials, Transaction};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// What every bank integration offers.
#[async_trait]
pub trait BankScraper: Send + Sync {
    fn bank(&self) -> BankCode;

    /// Authenticate. Failures the portal reports (bad credentials, bot
    /// block, outage) come back as outcomes; driver failures, timeouts and
    /// cancellation come back as errors.
    async fn login(
        &self,
        credentials: &Credentials,
        cancel: &CancelSignal,
    ) -> ScraperResult<LoginOutcome<Session>>;

    async fn fetch_balances(
        &self,
        session: &mut Session,
        cancel: &CancelSignal,
    ) -> ScraperResult<Vec<Balance>>;

    async fn fetch_transactions(
        &self,
        session: &mut Session,
        account_id: &str,
        cancel: &CancelSignal,
    ) -> ScraperResult<Vec<Transaction>>;
}

/// Exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable cause, or the
/// attempts run out. Cancellation during a backoff wait ends the loop.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancelSignal,
    mut op: F,
) -> ScraperResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ScraperResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    "attempt {attempt}/{attempts} failed ({e}), retrying in {}ms",
                    delay.as_millis()
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(ScraperError::new(
                            e.bank,
                            e.operation,
                            ErrorCause::Cancelled,
                            format!("cancelled while waiting to retry after: {}", e.detail),
                        ));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

pub(crate) fn session_error(session: &Session, operation: &'static str) -> Option<ScraperError> {
    if !session.is_open() {
        return Some(ScraperError::new(
            session.bank,
            operation,
            ErrorCause::SessionExpired,
            "session is closed",
        ));
    }
    if session.is_expired() {
        return Some(ScraperError::new(
            session.bank,
            operation,
            ErrorCause::SessionExpired,
            format!("session expired at {}", session.expires_at.to_rfc3339()),
        ));
    }
    None
}
