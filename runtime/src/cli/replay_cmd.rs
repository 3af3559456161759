//! `bank-scraper replay` - inspect recorded traffic logs.

use crate::cli::output;
use crate::replay::{coarse_key, load_replay_log, ReplayOutcome, Replayer};
use anyhow::Result;
use std::path::Path;

/// List the entries of a log and its index sizes.
pub async fn run_inspect(log_path: &Path) -> Result<()> {
    let log = load_replay_log(log_path)?;
    let entries: Vec<serde_json::Value> = log
        .entries
        .iter()
        .map(|e| {
            serde_json::json!({
                "method": e.request.method,
                "url": e.request.url,
                "status": e.response.status,
                "mimeType": e.response.content.mime_type,
                "coarseKey": coarse_key(&e.request.url),
            })
        })
        .collect();
    let stats = Replayer::new(log).stats();

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "entries": entries,
            "exactKeys": stats.exact_keys,
            "coarseKeys": stats.coarse_keys,
        }));
        return Ok(());
    }

    println!(
        "  {} entries ({} exact URLs, {} coarse keys)\n",
        stats.entries, stats.exact_keys, stats.coarse_keys
    );
    for e in &entries {
        println!(
            "  {:<6} {:>3}  {}",
            e["method"].as_str().unwrap_or("?"),
            e["status"],
            e["url"].as_str().unwrap_or("?"),
        );
    }
    Ok(())
}

/// Show what the replayer would serve for `url`.
pub async fn run_resolve(log_path: &Path, url: &str) -> Result<()> {
    let replayer = Replayer::new(load_replay_log(log_path)?);
    match replayer.resolve(url) {
        ReplayOutcome::Matched {
            response,
            match_kind,
            hops,
        } => {
            if output::is_json() {
                output::print_json(&serde_json::json!({
                    "matched": true,
                    "matchKind": format!("{match_kind:?}").to_lowercase(),
                    "hops": hops,
                    "status": response.status,
                    "headers": response.headers,
                    "bodyBytes": response.body.len(),
                }));
            } else {
                println!("  Matched ({match_kind:?}, {hops} redirects followed)");
                println!("  Status: {}", response.status);
                for (name, value) in &response.headers {
                    println!("  {name}: {value}");
                }
                println!("  Body:   {} bytes", response.body.len());
            }
        }
        ReplayOutcome::Unmatched { url } => {
            if output::is_json() {
                output::print_json(&serde_json::json!({ "matched": false, "url": url }));
            } else {
                println!("  No recording for {url} (would be served a 404)");
            }
        }
    }
    Ok(())
}
