//! Scraper configuration: per-bank timeouts, session lifetime and flattening limits.
//!
//! Resolution order (later wins):
//! 1. Built-in defaults per bank
//! 2. JSON file at `BANK_SCRAPER_CONFIG`, or `~/.bank-scraper/config.json`
//! 3. `BANK_SCRAPER_<BANK>_*` environment variables

use crate::model::BankCode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default flattening depth ceiling.
pub const DEFAULT_FLATTEN_MAX_DEPTH: usize = 100;

/// Upper bound on any configured ceiling. Captures and snapshot files never
/// nest deeper than this.
pub const MAX_FLATTEN_DEPTH: usize = 256;

/// Tunables for a single bank portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankSettings {
    /// Budget for a single navigation, including redirects.
    pub navigation_timeout_ms: u64,
    /// Budget for waiting until the DOM stops mutating.
    pub stability_timeout_ms: u64,
    /// How long the DOM must stay quiet to count as stable.
    pub stability_quiet_ms: u64,
    /// Budget for a single in-page script evaluation.
    pub script_timeout_ms: u64,
    /// Portal session lifetime.
    pub session_lifetime_secs: u64,
    pub flatten_max_depth: usize,
}

impl Default for BankSettings {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 30_000,
            stability_timeout_ms: 15_000,
            stability_quiet_ms: 500,
            script_timeout_ms: 20_000,
            session_lifetime_secs: 10 * 60,
            flatten_max_depth: DEFAULT_FLATTEN_MAX_DEPTH,
        }
    }
}

impl BankSettings {
    /// Built-in defaults for a bank.
    pub fn for_bank(bank: BankCode) -> Self {
        match bank {
            // The BBVA portal is slow to settle after login; its session lasts 10 minutes.
            BankCode::Bbva => Self {
                stability_timeout_ms: 20_000,
                ..Self::default()
            },
            BankCode::Interbank | BankCode::Bcp => Self::default(),
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn stability_timeout(&self) -> Duration {
        Duration::from_millis(self.stability_timeout_ms)
    }

    pub fn stability_quiet(&self) -> Duration {
        Duration::from_millis(self.stability_quiet_ms)
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_millis(self.script_timeout_ms)
    }

    pub fn session_lifetime(&self) -> Duration {
        Duration::from_secs(self.session_lifetime_secs)
    }

    fn apply_env(&mut self, bank: BankCode) {
        let prefix = format!("BANK_SCRAPER_{}", bank.as_str());
        self.navigation_timeout_ms = read_env_u64(
            &format!("{prefix}_NAVIGATION_TIMEOUT_MS"),
            self.navigation_timeout_ms,
        );
        self.stability_timeout_ms = read_env_u64(
            &format!("{prefix}_STABILITY_TIMEOUT_MS"),
            self.stability_timeout_ms,
        );
        self.stability_quiet_ms = read_env_u64(
            &format!("{prefix}_STABILITY_QUIET_MS"),
            self.stability_quiet_ms,
        );
        self.script_timeout_ms =
            read_env_u64(&format!("{prefix}_SCRIPT_TIMEOUT_MS"), self.script_timeout_ms);
        self.session_lifetime_secs = read_env_u64(
            &format!("{prefix}_SESSION_LIFETIME_SECS"),
            self.session_lifetime_secs,
        );
        self.flatten_max_depth = read_env_usize(
            &format!("{prefix}_FLATTEN_MAX_DEPTH"),
            self.flatten_max_depth,
        )
        .max(1);
    }
}

/// A bank entry in the config file. Absent fields keep the bank's built-in value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BankOverrides {
    navigation_timeout_ms: Option<u64>,
    stability_timeout_ms: Option<u64>,
    stability_quiet_ms: Option<u64>,
    script_timeout_ms: Option<u64>,
    session_lifetime_secs: Option<u64>,
    flatten_max_depth: Option<usize>,
}

impl BankOverrides {
    fn apply(self, base: BankSettings) -> BankSettings {
        BankSettings {
            navigation_timeout_ms: self.navigation_timeout_ms.unwrap_or(base.navigation_timeout_ms),
            stability_timeout_ms: self.stability_timeout_ms.unwrap_or(base.stability_timeout_ms),
            stability_quiet_ms: self.stability_quiet_ms.unwrap_or(base.stability_quiet_ms),
            script_timeout_ms: self.script_timeout_ms.unwrap_or(base.script_timeout_ms),
            session_lifetime_secs: self
                .session_lifetime_secs
                .unwrap_or(base.session_lifetime_secs),
            flatten_max_depth: self.flatten_max_depth.unwrap_or(base.flatten_max_depth).max(1),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    banks: HashMap<BankCode, BankOverrides>,
}

/// Configuration for every bank the process talks to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScraperConfig {
    pub banks: HashMap<BankCode, BankSettings>,
}

impl ScraperConfig {
    /// Load from the default file location (if present) and apply env overrides.
    pub fn load() -> Result<Self> {
        let mut config = match config_file_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a JSON config file. Each bank entry is layered over that bank's
    /// built-in settings; banks missing from the file keep them whole.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let file: ConfigFile = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config JSON: {}", path.display()))?;
        let banks = file
            .banks
            .into_iter()
            .map(|(bank, overrides)| (bank, overrides.apply(BankSettings::for_bank(bank))))
            .collect();
        Ok(Self { banks })
    }

    /// Effective settings for a bank.
    pub fn settings(&self, bank: BankCode) -> BankSettings {
        self.banks
            .get(&bank)
            .cloned()
            .unwrap_or_else(|| BankSettings::for_bank(bank))
    }

    fn apply_env(&mut self) {
        for bank in [BankCode::Bbva, BankCode::Interbank, BankCode::Bcp] {
            let mut settings = self.settings(bank);
            settings.apply_env(bank);
            self.banks.insert(bank, settings);
        }
    }
}

/// `~/.bank-scraper`, the home of the config file and a local Chromium install.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".bank-scraper")
}

fn config_file_path() -> Option<PathBuf> {
    if let Some(explicit) = read_env_string("BANK_SCRAPER_CONFIG") {
        return Some(PathBuf::from(explicit));
    }
    Some(data_dir().join("config.json"))
}

fn read_env_u64(name: &str, default_value: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn read_env_usize(name: &str, default_value: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default_value)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
