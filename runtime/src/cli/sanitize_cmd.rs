//! `bank-scraper sanitize` - scrub captured fixtures before committing them.

use crate::cli::output;
use crate::fixtures::list_markup_files;
use crate::replay::{count_redactions, load_replay_log, sanitize_log, sanitize_markup, save_replay_log};
use anyhow::{Context, Result};
use std::path::Path;

/// Redact a replay log, in place unless `out` is given.
pub async fn run_log(input: &Path, out: Option<&Path>, dry_run: bool) -> Result<()> {
    let log = load_replay_log(input)?;
    let clean = sanitize_log(&log);
    let redactions = count_redactions(&log, &clean);
    let target = out.unwrap_or(input);

    if !dry_run {
        save_replay_log(target, &clean)?;
    }

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "input": input.display().to_string(),
            "output": target.display().to_string(),
            "entries": clean.entries.len(),
            "redactions": redactions,
            "dryRun": dry_run,
        }));
    } else if dry_run {
        println!("  {redactions} values would be redacted in {}", input.display());
    } else {
        println!("  Redacted {redactions} values -> {}", target.display());
    }
    Ok(())
}

/// Mask personal data in every `.html` file under `dir`.
pub async fn run_markup(dir: &Path, dry_run: bool) -> Result<()> {
    let mut report = Vec::new();
    for path in list_markup_files(dir)? {
        let html = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let result = sanitize_markup(&html);
        if result.changed() && !dry_run {
            std::fs::write(&path, &result.markup)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        report.push((path, result.matches));
    }

    if output::is_json() {
        let files: Vec<serde_json::Value> = report
            .iter()
            .map(|(path, matches)| {
                let rules: serde_json::Map<String, serde_json::Value> = matches
                    .iter()
                    .map(|(rule, n)| (rule.to_string(), serde_json::json!(n)))
                    .collect();
                serde_json::json!({ "file": path.display().to_string(), "matches": rules })
            })
            .collect();
        output::print_json(&serde_json::json!({ "files": files, "dryRun": dry_run }));
        return Ok(());
    }

    for (path, matches) in &report {
        if matches.is_empty() {
            println!("  {}: clean", path.display());
            continue;
        }
        println!("  {}:", path.display());
        for (rule, n) in matches {
            println!("    {rule}: {n}");
        }
    }
    if dry_run {
        println!("\n  Dry run, no files written.");
    }
    Ok(())
}
