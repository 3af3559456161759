//! Error taxonomy shared by every scraper operation.
//!
//! Callers branch on [`ErrorCause`]; humans read `detail`.

use crate::model::BankCode;
use std::fmt;

/// Why a scraper operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCause {
    /// Markup did not match a known structure or a value failed locale conversion.
    ParsingFailed,
    InvalidCredentials,
    SessionExpired,
    BotDetected,
    /// Network failure, outage or rate limiting.
    BankUnavailable,
    Timeout,
    /// The caller cancelled the operation.
    Cancelled,
    /// Classification was inconclusive.
    Unknown,
}

impl ErrorCause {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCause::ParsingFailed => "failed to parse bank response",
            ErrorCause::InvalidCredentials => "invalid credentials",
            ErrorCause::SessionExpired => "session expired",
            ErrorCause::BotDetected => "bot detected",
            ErrorCause::BankUnavailable => "bank unavailable",
            ErrorCause::Timeout => "operation timed out",
            ErrorCause::Cancelled => "operation cancelled",
            ErrorCause::Unknown => "unknown failure",
        }
    }

    /// Only outages and timeouts may be retried; retrying credential or
    /// bot-detection failures looks like abuse to the portal.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorCause::BankUnavailable | ErrorCause::Timeout)
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure raised by a bank scraper operation.
#[derive(thiserror::Error, Debug)]
#[error("[{bank}] {operation} failed: {cause} - {detail}")]
pub struct ScraperError {
    pub bank: BankCode,
    pub operation: &'static str,
    pub cause: ErrorCause,
    pub detail: String,
}

impl ScraperError {
    pub fn new(
        bank: BankCode,
        operation: &'static str,
        cause: ErrorCause,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            bank,
            operation,
            cause,
            detail: detail.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.cause.is_retryable()
    }
}

/// Convenience result type.
pub type ScraperResult<T> = Result<T, ScraperError>;
