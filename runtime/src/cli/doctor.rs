//! Environment readiness check.

use crate::cli::output;
use crate::config::{data_dir, ScraperConfig};
use crate::fixtures::{default_fixture_root, recording_path};
use crate::model::BankCode;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;

/// Check Chromium availability, configuration and bundled fixtures.
pub async fn run() -> Result<()> {
    let chromium = find_chromium();
    let config = ScraperConfig::load();
    let fixture_root = default_fixture_root();
    let recording = recording_path(&fixture_root, BankCode::Bbva, "login_success");

    if output::is_json() {
        let bbva = config.as_ref().ok().map(|c| c.settings(BankCode::Bbva));
        output::print_json(&serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "chromium": chromium.as_ref().map(|p| p.display().to_string()),
            "dataDir": data_dir().display().to_string(),
            "config": match &config {
                Ok(_) => serde_json::json!({ "ok": true, "bbva": bbva }),
                Err(e) => serde_json::json!({ "ok": false, "error": format!("{e:#}") }),
            },
            "fixtures": fixture_root.display().to_string(),
            "recordingsPresent": recording.exists(),
            "ready": chromium.is_some() && config.is_ok(),
        }));
        return Ok(());
    }

    println!("Bank Scraper Doctor");
    println!("===================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Set BANK_SCRAPER_CHROMIUM_PATH or install Chrome."
        ),
    }

    match &config {
        Ok(c) => {
            let bbva = c.settings(BankCode::Bbva);
            println!(
                "[OK] Config loaded (BBVA: navigation {}ms, session {}s, flatten depth {})",
                bbva.navigation_timeout_ms, bbva.session_lifetime_secs, bbva.flatten_max_depth
            );
        }
        Err(e) => println!("[!!] Config invalid: {e:#}"),
    }

    if recording.exists() {
        println!("[OK] Replay fixtures found under {}", fixture_root.display());
    } else {
        println!(
            "[??] No replay fixtures under {} (offline tests need them)",
            fixture_root.display()
        );
    }

    println!();
    if chromium.is_some() && config.is_ok() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
        println!("  Only offline commands (parse, flatten, replay, sanitize) will work.");
    }
    Ok(())
}
