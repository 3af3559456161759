//! `bank-scraper parse` - run a bank parser over a saved markup file.

use crate::cli::output;
use crate::extraction::{parse_balances, parse_transactions};
use crate::model::BankCode;
use anyhow::{Context, Result};
use std::path::Path;

pub async fn run_balances(bank: BankCode, file: &Path) -> Result<()> {
    let markup = read_markup(file)?;
    let balances = parse_balances(bank, &markup)
        .with_context(|| format!("failed to parse {} balances", bank))?;

    if output::is_json() {
        output::print_json(&serde_json::to_value(&balances)?);
        return Ok(());
    }

    if balances.is_empty() {
        println!("  No accounts.");
        return Ok(());
    }
    println!("  {} accounts:\n", balances.len());
    println!("  {:<28}  {:<4}  {:>16}  {:>16}", "account", "cur", "available", "booked");
    println!("  {}  {}  {}  {}", "-".repeat(28), "-".repeat(4), "-".repeat(16), "-".repeat(16));
    for b in &balances {
        println!(
            "  {:<28}  {:<4}  {:>16}  {:>16}",
            b.account_id,
            b.currency,
            output::format_cents(b.available_amount),
            output::format_cents(b.booked_amount),
        );
    }
    Ok(())
}

pub async fn run_transactions(bank: BankCode, file: &Path) -> Result<()> {
    let markup = read_markup(file)?;
    let transactions = parse_transactions(bank, &markup)
        .with_context(|| format!("failed to parse {} transactions", bank))?;

    if output::is_json() {
        output::print_json(&serde_json::to_value(&transactions)?);
        return Ok(());
    }

    if transactions.is_empty() {
        println!("  No movements.");
        return Ok(());
    }
    println!("  {} movements:\n", transactions.len());
    for t in &transactions {
        let amount = i64::try_from(t.amount).unwrap_or(i64::MAX);
        println!(
            "  {}  {:<12}  {:<6}  {:>14}  {}",
            t.operation_date,
            t.id,
            format!("{:?}", t.direction).to_uppercase(),
            output::format_cents(amount),
            t.description,
        );
    }
    Ok(())
}

fn read_markup(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))
}
