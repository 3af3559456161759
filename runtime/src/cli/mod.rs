//! CLI subcommand implementations for the bank-scraper binary.

pub mod doctor;
pub mod flatten_cmd;
pub mod output;
pub mod parse_cmd;
pub mod replay_cmd;
pub mod sanitize_cmd;
