//! Flattened markup → typed balances and transactions.
//!
//! Each bank gets its own parser module. Dispatch is a closed match on
//! [`BankCode`], so adding a bank is a compile-time change.

pub mod bbva;
pub mod locale;

use crate::error::{ErrorCause, ScraperError};
use crate::model::{Balance, BankCode, Transaction};
use scraper::Selector;

/// Why a page could not be turned into records.
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("no parser available for bank {0}")]
    UnsupportedBank(BankCode),

    #[error("no account elements found")]
    NoAccountElements,

    #[error("table not found with selector: {0}")]
    TableNotFound(&'static str),

    #[error("table {table}: missing list-group-currency")]
    MissingCurrency { table: usize },

    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("invalid amount: {input:?}")]
    InvalidAmount { input: String },

    #[error("invalid date: {input:?} (expected DD-MM-YYYY)")]
    InvalidDate { input: String },

    #[error("unknown currency symbol: {0:?}")]
    UnknownCurrencySymbol(String),

    #[error("unknown currency code: {0:?}")]
    UnknownCurrencyCode(String),

    #[error("table {table} row {row}: {source}")]
    AccountRow {
        table: usize,
        row: usize,
        source: Box<ParseError>,
    },

    #[error("card {index}: {source}")]
    Card {
        index: usize,
        source: Box<ParseError>,
    },

    #[error("failed to parse row {index}: {source}")]
    Row {
        index: usize,
        source: Box<ParseError>,
    },

    #[error("row has {found} cells, expected {expected}")]
    MissingCells { found: usize, expected: usize },

    #[error("invalid selector: {0}")]
    InvalidSelector(String),
}

impl ParseError {
    /// Every parse failure surfaces as [`ErrorCause::ParsingFailed`].
    pub fn cause(&self) -> ErrorCause {
        ErrorCause::ParsingFailed
    }

    pub fn into_scraper_error(self, bank: BankCode, operation: &'static str) -> ScraperError {
        ScraperError::new(bank, operation, self.cause(), self.to_string())
    }
}

/// Parse the accounts page of `bank` into balances.
pub fn parse_balances(bank: BankCode, markup: &str) -> Result<Vec<Balance>, ParseError> {
    match bank {
        BankCode::Bbva => bbva::parse_account_balances(markup),
        BankCode::Interbank | BankCode::Bcp => Err(ParseError::UnsupportedBank(bank)),
    }
}

/// Parse the movements page of `bank` into transactions.
pub fn parse_transactions(bank: BankCode, markup: &str) -> Result<Vec<Transaction>, ParseError> {
    match bank {
        BankCode::Bbva => bbva::parse_transactions(markup),
        BankCode::Interbank | BankCode::Bcp => Err(ParseError::UnsupportedBank(bank)),
    }
}

pub(crate) fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::InvalidSelector(format!("{css}: {e}")))
}
