//! # Inbox Janitor CLI (`janitor`)
//!
//! ```bash
//! janitor --config ./config/janitor.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `janitor init` | Create the SQLite database and tables |
//! | `janitor extract <file>` | Extract one document, print the result and review decision |
//! | `janitor batch <dir>` | Extract a directory on a worker pool, one JSON line per document |
//! | `janitor cache stats\|clear\|get` | Inspect or reset the extraction cache |
//! | `janitor prefs ...` | List, query, teach, disable and enable preference rules |
//! | `janitor stats` | Cache and preference overview |
//!
//! Logs go to stderr and follow `RUST_LOG`; review gate decisions are logged
//! on the `audit` target.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use inbox_janitor::{cache_cmd, config, extract_cmd, migrate, prefs_cmd, stats};
use janitor_core::models::{TriggerKey, RULE_VENDOR_FOLDER};

const DEFAULT_LOG_FILTER: &str = "inbox_janitor=info,janitor_core=info,audit=info";

/// Inbox Janitor: adaptive document extraction with quality-gated caching,
/// mandatory review for poor extractions, and routing preferences learned
/// from corrections.
#[derive(Parser)]
#[command(name = "janitor", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/janitor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Extract text from one document.
    ///
    /// Prints the extraction result and the review gate decision as JSON.
    Extract {
        file: PathBuf,

        /// Ask for auto-approval; low-quality extractions are still sent to review.
        #[arg(long)]
        auto_approve: bool,
    },

    /// Extract every matching document under a directory.
    ///
    /// Prints one JSON line per document on stdout; progress and the
    /// summary go to stderr.
    Batch {
        dir: PathBuf,

        /// Override `[batch].workers`.
        #[arg(long)]
        workers: Option<usize>,

        #[arg(long)]
        auto_approve: bool,

        /// Machine-readable progress on stderr.
        #[arg(long)]
        json: bool,
    },

    /// Manage the extraction cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage learned preference rules.
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },

    /// Show cache and preference statistics.
    Stats,
}

#[derive(Subcommand)]
enum CacheAction {
    Stats,
    /// Remove every cache entry.
    Clear,
    /// Show the cache entry a file would hit.
    Get { file: PathBuf },
}

/// Identifies one rule.
#[derive(clap::Args)]
struct RuleArgs {
    #[arg(long)]
    vendor: String,
    #[arg(long)]
    doc_type: String,
    /// Rule type.
    #[arg(long = "type", default_value = RULE_VENDOR_FOLDER)]
    rule_type: String,
}

impl RuleArgs {
    fn trigger(&self) -> TriggerKey {
        TriggerKey::new(self.vendor.clone(), self.doc_type.clone())
    }
}

#[derive(Subcommand)]
enum PrefsAction {
    /// List rules, most confident first.
    List {
        #[arg(long = "type")]
        rule_type: Option<String>,
        /// Include disabled rules.
        #[arg(long)]
        all: bool,
    },
    /// Print the learned value for an exact vendor + document type match.
    Query {
        #[command(flatten)]
        rule: RuleArgs,
        /// Defaults to `[learning].min_confidence`.
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// Record an approval: what was suggested and what the human chose.
    Learn {
        #[command(flatten)]
        rule: RuleArgs,
        #[arg(long)]
        suggested: String,
        #[arg(long = "final")]
        final_value: String,
    },
    /// Stop recommending a rule (it keeps learning).
    Disable {
        #[command(flatten)]
        rule: RuleArgs,
    },
    Enable {
        #[command(flatten)]
        rule: RuleArgs,
    },
    /// Show every recorded transition of a rule.
    History {
        #[command(flatten)]
        rule: RuleArgs,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Extract { file, auto_approve } => {
            extract_cmd::run_extract(&cfg, &file, auto_approve).await?;
        }
        Commands::Batch {
            dir,
            workers,
            auto_approve,
            json,
        } => {
            extract_cmd::run_batch_command(&cfg, &dir, workers, auto_approve, json).await?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => cache_cmd::run_cache_stats(&cfg).await?,
            CacheAction::Clear => cache_cmd::run_cache_clear(&cfg).await?,
            CacheAction::Get { file } => cache_cmd::run_cache_get(&cfg, &file).await?,
        },
        Commands::Prefs { action } => match action {
            PrefsAction::List { rule_type, all } => {
                prefs_cmd::run_prefs_list(&cfg, rule_type.as_deref(), all).await?;
            }
            PrefsAction::Query {
                rule,
                min_confidence,
            } => {
                prefs_cmd::run_prefs_query(&cfg, &rule.rule_type, &rule.trigger(), min_confidence)
                    .await?;
            }
            PrefsAction::Learn {
                rule,
                suggested,
                final_value,
            } => {
                prefs_cmd::run_prefs_learn(
                    &cfg,
                    &rule.rule_type,
                    rule.trigger(),
                    &suggested,
                    &final_value,
                )
                .await?;
            }
            PrefsAction::Disable { rule } => {
                prefs_cmd::run_prefs_set_enabled(&cfg, &rule.rule_type, &rule.trigger(), false)
                    .await?;
            }
            PrefsAction::Enable { rule } => {
                prefs_cmd::run_prefs_set_enabled(&cfg, &rule.rule_type, &rule.trigger(), true)
                    .await?;
            }
            PrefsAction::History { rule } => {
                prefs_cmd::run_prefs_history(&cfg, &rule.rule_type, &rule.trigger()).await?;
            }
        },
        Commands::Stats => stats::run_stats(&cfg).await?,
    }

    Ok(())
}
