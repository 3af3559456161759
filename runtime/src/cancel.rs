//! Cancellation and per-step deadlines for session-scoped browser work.
//!
//! Every blocking step (navigation, stability waits, in-page scripts) runs
//! through [`guard_step`], which races it against a deadline and the
//! session's [`CancelSignal`].

use crate::error::{ErrorCause, ScraperError};
use crate::model::BankCode;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Owner side: trips the signal.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side, passed into every session-scoped operation.
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a linked handle/signal pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires. Never resolves if the handle is dropped untripped.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Outcome of a guarded step that did not complete.
#[derive(thiserror::Error, Debug)]
pub enum StepError {
    #[error("cancelled")]
    Cancelled,

    #[error("timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    #[error("{0:#}")]
    Failed(anyhow::Error),
}

impl StepError {
    /// Attach bank/operation context. `failure` is the cause used when the
    /// step itself errored (as opposed to timing out or being cancelled).
    pub fn into_scraper_error(
        self,
        bank: BankCode,
        operation: &'static str,
        failure: ErrorCause,
        step: &str,
    ) -> ScraperError {
        let cause = match &self {
            StepError::Cancelled => ErrorCause::Cancelled,
            StepError::TimedOut(_) => ErrorCause::Timeout,
            StepError::Failed(_) => failure,
        };
        ScraperError::new(bank, operation, cause, format!("{step}: {self}"))
    }
}

/// Run `step` under a deadline and a cancellation signal.
pub async fn guard_step<T, F>(cancel: &CancelSignal, limit: Duration, step: F) -> Result<T, StepError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(StepError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StepError::Cancelled),
        res = tokio::time::timeout(limit, step) => match res {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StepError::Failed(e)),
            Err(_) => Err(StepError::TimedOut(limit)),
        },
    }
}
