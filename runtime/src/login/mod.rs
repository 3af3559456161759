//! Login outcome classification.
//!
//! After the credential form is submitted the flow knows two things: the
//! status code of the submission request (captured from intercepted
//! traffic) and the stabilized page markup. [`classify_login`] turns those
//! into one of five outcomes. It behaves the same whether the traffic was
//! live or replayed.

pub mod session;

pub use session::Session;

use crate::error::{ErrorCause, ScraperError, ScraperResult};
use crate::extraction::{bbva, ParseError};
use crate::model::BankCode;

/// Result of a login attempt. Callers match on all five variants.
#[derive(Debug)]
pub enum LoginOutcome<S> {
    Success(S),
    /// The portal rejected the credentials. `code` may be empty.
    InvalidCredentials { code: String, message: String },
    BotDetected,
    BankUnavailable { status: u16 },
    Unknown(String),
}

impl<S> LoginOutcome<S> {
    /// Split off the success payload. Failures are re-typed so they can be
    /// returned from a flow with a different success type.
    pub fn into_success<T>(self) -> Result<S, LoginOutcome<T>> {
        match self {
            LoginOutcome::Success(s) => Ok(s),
            LoginOutcome::InvalidCredentials { code, message } => {
                Err(LoginOutcome::InvalidCredentials { code, message })
            }
            LoginOutcome::BotDetected => Err(LoginOutcome::BotDetected),
            LoginOutcome::BankUnavailable { status } => {
                Err(LoginOutcome::BankUnavailable { status })
            }
            LoginOutcome::Unknown(detail) => Err(LoginOutcome::Unknown(detail)),
        }
    }

    /// Swap the success payload, keeping every failure as-is.
    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> LoginOutcome<T> {
        match self.into_success() {
            Ok(s) => LoginOutcome::Success(f(s)),
            Err(failure) => failure,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::Success(_))
    }

    /// Error cause for failed outcomes.
    pub fn cause(&self) -> Option<ErrorCause> {
        match self {
            LoginOutcome::Success(_) => None,
            LoginOutcome::InvalidCredentials { .. } => Some(ErrorCause::InvalidCredentials),
            LoginOutcome::BotDetected => Some(ErrorCause::BotDetected),
            LoginOutcome::BankUnavailable { .. } => Some(ErrorCause::BankUnavailable),
            LoginOutcome::Unknown(_) => Some(ErrorCause::Unknown),
        }
    }

    /// Collapse into a plain result for callers that only care about success.
    pub fn into_result(self, bank: BankCode) -> ScraperResult<S> {
        let detail = match self {
            LoginOutcome::Success(s) => return Ok(s),
            LoginOutcome::InvalidCredentials { ref code, ref message } if code.is_empty() => {
                message.clone()
            }
            LoginOutcome::InvalidCredentials { ref code, ref message } => {
                format!("(code {code}) {message}")
            }
            LoginOutcome::BotDetected => "access forbidden - possible bot detection".to_string(),
            LoginOutcome::BankUnavailable { status } => {
                format!("bank service unavailable or rate limited (status {status})")
            }
            LoginOutcome::Unknown(ref detail) => detail.clone(),
        };
        let cause = self.cause().unwrap_or(ErrorCause::Unknown);
        Err(ScraperError::new(bank, "Login", cause, detail))
    }
}

/// Classify a login attempt.
///
/// Precedence: 403, then 429/5xx, then an error block in the markup, then
/// the landing page marker. Anything else is `Unknown`.
pub fn classify_login(bank: BankCode, status: Option<u16>, markup: &str) -> LoginOutcome<()> {
    match status {
        Some(403) => return LoginOutcome::BotDetected,
        Some(s @ (429 | 500..=599)) => return LoginOutcome::BankUnavailable { status: s },
        _ => {}
    }

    let status_text = status.map_or_else(|| "none".to_string(), |s| s.to_string());
    match inspect_markup(bank, markup) {
        Ok(PageState::ErrorBlock { code, message }) => {
            LoginOutcome::InvalidCredentials { code, message }
        }
        Ok(PageState::Landing) => LoginOutcome::Success(()),
        Ok(PageState::Unrecognized) => LoginOutcome::Unknown(format!(
            "submission status {status_text}, landing page not recognized"
        )),
        Err(e) => LoginOutcome::Unknown(format!("submission status {status_text}, {e}")),
    }
}

enum PageState {
    ErrorBlock { code: String, message: String },
    Landing,
    Unrecognized,
}

fn inspect_markup(bank: BankCode, markup: &str) -> Result<PageState, ParseError> {
    match bank {
        BankCode::Bbva => {
            if let Some(block) = bbva::detect_login_error(markup)? {
                return Ok(PageState::ErrorBlock {
                    code: block.code,
                    message: block.message,
                });
            }
            if bbva::has_dashboard(markup)? {
                return Ok(PageState::Landing);
            }
            Ok(PageState::Unrecognized)
        }
        BankCode::Interbank | BankCode::Bcp => Err(ParseError::UnsupportedBank(bank)),
    }
}

/// True when a page loaded inside an authenticated session shows the login
/// form again.
pub fn session_invalidated(bank: BankCode, markup: &str) -> Result<bool, ParseError> {
    match bank {
        BankCode::Bbva => bbva::has_login_form(markup),
        BankCode::Interbank | BankCode::Bcp => Err(ParseError::UnsupportedBank(bank)),
    }
}
