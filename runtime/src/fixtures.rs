//! On-disk test fixtures.
//!
//! Layout under a fixture root:
//! - `<bank>/fixtures/<scenario>.html`: flattened markup
//! - `<bank>/recordings/<scenario>.har.json`: replay logs

use crate::model::BankCode;
use crate::replay::{load_replay_log, ReplayLog};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Fixture root: `BANK_SCRAPER_FIXTURES`, else the crate's `tests/fixtures`.
pub fn default_fixture_root() -> PathBuf {
    match std::env::var("BANK_SCRAPER_FIXTURES") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
        _ => Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures"),
    }
}

pub fn markup_fixture_path(root: &Path, bank: BankCode, scenario: &str) -> PathBuf {
    root.join(bank.fixture_dir())
        .join("fixtures")
        .join(format!("{scenario}.html"))
}

pub fn recording_path(root: &Path, bank: BankCode, scenario: &str) -> PathBuf {
    root.join(bank.fixture_dir())
        .join("recordings")
        .join(format!("{scenario}.har.json"))
}

pub fn load_markup_fixture(root: &Path, bank: BankCode, scenario: &str) -> Result<String> {
    let path = markup_fixture_path(root, bank, scenario);
    std::fs::read_to_string(&path)
        .with_context(|| format!("failed to load fixture {bank}/{scenario}: {}", path.display()))
}

pub fn load_recording(root: &Path, bank: BankCode, scenario: &str) -> Result<ReplayLog> {
    load_replay_log(&recording_path(root, bank, scenario))
        .with_context(|| format!("failed to load recording {bank}/{scenario}"))
}

/// Every `.html` file directly under `dir`, sorted.
pub fn list_markup_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "html"))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_paths() {
        let root = Path::new("/data");
        assert_eq!(
            markup_fixture_path(root, BankCode::Bbva, "accounts_list"),
            PathBuf::from("/data/bbva/fixtures/accounts_list.html")
        );
        assert_eq!(
            recording_path(root, BankCode::Bbva, "login_success"),
            PathBuf::from("/data/bbva/recordings/login_success.har.json")
        );
    }

    #[test]
    fn test_missing_fixture_names_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_markup_fixture(dir.path(), BankCode::Bbva, "nope").unwrap_err();
        assert!(format!("{err:#}").contains("bbva") || format!("{err:#}").contains("BBVA"));
        assert!(format!("{err:#}").contains("nope"));
    }

    #[test]
    fn test_list_markup_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.html"), "<p>b</p>").unwrap();
        std::fs::write(dir.path().join("a.html"), "<p>a</p>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let files = list_markup_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.html", "b.html"]);
    }

    #[test]
    fn test_bundled_fixtures_are_present() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures");
        let html = load_markup_fixture(&root, BankCode::Bbva, "accounts_list").unwrap();
        assert!(html.contains("accountsTable"));
        let log = load_recording(&root, BankCode::Bbva, "login_success").unwrap();
        assert!(!log.entries.is_empty());
    }
}
