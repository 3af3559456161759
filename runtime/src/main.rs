// Copyright 2026 Bank Scraper Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use bank_scraper::cli;
use bank_scraper::config::DEFAULT_FLATTEN_MAX_DEPTH;
use bank_scraper::model::BankCode;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "bank-scraper",
    about = "Bank portal extraction engine: flatten, parse, replay",
    version,
    after_help = "Run 'bank-scraper <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a saved (flattened) page into typed records
    Parse {
        #[command(subcommand)]
        what: ParseTarget,
    },
    /// Flatten a saved DOM snapshot into a single document
    Flatten {
        /// Snapshot JSON produced by the capture script
        snapshot: PathBuf,
        /// Depth ceiling; deeper elements are left unflattened
        #[arg(long, default_value_t = DEFAULT_FLATTEN_MAX_DEPTH)]
        max_depth: usize,
        /// Write the markup here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Inspect recorded traffic logs
    Replay {
        #[command(subcommand)]
        action: ReplayAction,
    },
    /// Redact secrets and personal data from captured fixtures
    Sanitize {
        #[command(subcommand)]
        action: SanitizeAction,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ParseTarget {
    /// Parse an accounts page into balances
    Balances {
        file: PathBuf,
        #[arg(long, default_value = "BBVA")]
        bank: BankCode,
    },
    /// Parse a movements page into transactions
    Transactions {
        file: PathBuf,
        #[arg(long, default_value = "BBVA")]
        bank: BankCode,
    },
}

#[derive(Subcommand)]
enum ReplayAction {
    /// List the entries of a log
    Inspect { log: PathBuf },
    /// Show what would be served for a URL
    Resolve { log: PathBuf, url: String },
}

#[derive(Subcommand)]
enum SanitizeAction {
    /// Redact headers, query values and bodies in a replay log
    Log {
        input: PathBuf,
        /// Write here instead of overwriting the input
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Report without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Mask account numbers, names and tokens in every .html file of a directory
    Markup {
        dir: PathBuf,
        /// Report without writing
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json {
        std::env::set_var(cli::output::JSON_ENV, "1");
    }
    if cli.quiet {
        std::env::set_var(cli::output::QUIET_ENV, "1");
    }

    let default_directive = if cli.verbose {
        "bank_scraper=debug"
    } else {
        "bank_scraper=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Parse { what } => match what {
            ParseTarget::Balances { file, bank } => cli::parse_cmd::run_balances(bank, &file).await,
            ParseTarget::Transactions { file, bank } => {
                cli::parse_cmd::run_transactions(bank, &file).await
            }
        },
        Commands::Flatten {
            snapshot,
            max_depth,
            output,
        } => cli::flatten_cmd::run(&snapshot, max_depth, output.as_deref()).await,
        Commands::Replay { action } => match action {
            ReplayAction::Inspect { log } => cli::replay_cmd::run_inspect(&log).await,
            ReplayAction::Resolve { log, url } => cli::replay_cmd::run_resolve(&log, &url).await,
        },
        Commands::Sanitize { action } => match action {
            SanitizeAction::Log {
                input,
                output,
                dry_run,
            } => cli::sanitize_cmd::run_log(&input, output.as_deref(), dry_run).await,
            SanitizeAction::Markup { dir, dry_run } => {
                cli::sanitize_cmd::run_markup(&dir, dry_run).await
            }
        },
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "bank-scraper", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else if !cli::output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
