//! Typed records handed to downstream consumers.
//!
//! Monetary values are integer cents; dates are calendar dates serialized as
//! `YYYY-MM-DD`. These shapes are the only thing that crosses the extraction
//! boundary - raw markup and credentials never do.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Banks the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BankCode {
    Bbva,
    Interbank,
    Bcp,
}

impl BankCode {
    /// Canonical upper-case code.
    pub fn as_str(self) -> &'static str {
        match self {
            BankCode::Bbva => "BBVA",
            BankCode::Interbank => "INTERBANK",
            BankCode::Bcp => "BCP",
        }
    }

    /// Lower-case directory name used for fixtures.
    pub fn fixture_dir(self) -> &'static str {
        match self {
            BankCode::Bbva => "bbva",
            BankCode::Interbank => "interbank",
            BankCode::Bcp => "bcp",
        }
    }
}

impl fmt::Display for BankCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BankCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BBVA" => Ok(BankCode::Bbva),
            "INTERBANK" => Ok(BankCode::Interbank),
            "BCP" => Ok(BankCode::Bcp),
            other => Err(format!("unknown bank code: {other:?}")),
        }
    }
}

/// Supported account currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Peruvian sol.
    Pen,
    /// US dollar.
    Usd,
}

impl Currency {
    pub fn as_str(self) -> &'static str {
        match self {
            Currency::Pen => "PEN",
            Currency::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Balance of a single account at fetch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub account_id: String,
    pub currency: Currency,
    /// Available balance in cents.
    pub available_amount: i64,
    /// Booked (accounted) balance in cents. Zero when the layout does not expose it.
    pub booked_amount: i64,
    pub fetched_at: DateTime<Utc>,
}

/// Whether money entered or left the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Credit,
    Debit,
}

/// A single account movement.
///
/// `amount` is always non-negative; the sign lives in `direction`. The
/// operation date usually precedes or equals the value date, but commissions
/// can be value-dated a day later, so no ordering is enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub operation_date: NaiveDate,
    pub value_date: NaiveDate,
    pub description: String,
    /// Absolute amount in cents.
    pub amount: u64,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_specific_code: Option<String>,
    /// Bank metadata with no dedicated field (operation code, office, ...).
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// Portal login credentials, supplied per call and never stored.
#[derive(Clone)]
pub struct Credentials {
    pub company_code: String,
    pub user_code: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        company_code: impl Into<String>,
        user_code: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            company_code: company_code.into(),
            user_code: user_code.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("company_code", &"[REDACTED]")
            .field("user_code", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .finish()
    }
}
