// Copyright 2026 Bank Scraper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bank portal extraction engine.
//!
//! Flattens web-component portals (shadow roots, iframes) into plain markup,
//! parses that markup into typed balances and transactions, classifies login
//! attempts, and replays recorded traffic so all of it runs offline.

#![allow(clippy::new_without_default)]

pub mod bank;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod extraction;
pub mod fixtures;
pub mod flatten;
pub mod login;
pub mod model;
pub mod renderer;
pub mod replay;
pub mod transport;

pub use error::{ErrorCause, ScraperError, ScraperResult};
pub use model::{Balance, BankCode, Credentials, Currency, Direction, Transaction};
