//! `bank-scraper flatten` - flatten a saved DOM snapshot offline.

use crate::cli::output;
use crate::flatten::{flatten_snapshot, DomSnapshot};
use anyhow::{Context, Result};
use std::path::Path;

pub async fn run(snapshot_path: &Path, max_depth: usize, out: Option<&Path>) -> Result<()> {
    let raw = std::fs::read_to_string(snapshot_path)
        .with_context(|| format!("failed to read {}", snapshot_path.display()))?;
    let snapshot = DomSnapshot::from_json(&raw, max_depth)?;
    let doc = flatten_snapshot(&snapshot, max_depth);

    if let Some(path) = out {
        std::fs::write(path, &doc.markup)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if output::is_json() {
        output::print_json(&serde_json::to_value(&doc)?);
    } else if out.is_some() {
        println!(
            "  Flattened {} shadow roots and {} iframes ({} bytes)",
            doc.shadow_roots,
            doc.iframes,
            doc.markup.len()
        );
    } else {
        println!("{}", doc.markup);
    }
    Ok(())
}
