//! # repovec CLI (`rvec`)
//!
//! The `rvec` binary drives the ingestion pipeline. All commands accept a
//! `--config` flag pointing to a TOML configuration file.
//!
//! ## Usage
//!
//! ```bash
//! rvec --config ./config/rvec.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rvec index` | Sync the repository and load its chunks into the vector index |
//! | `rvec repos` | List repositories recorded as indexed |
//!
//! The access token for private remotes is read from the environment
//! variable named in `repo.token_env` (default `REPO_ACCESS_TOKEN`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use repovec::lifecycle::TerminalPrompt;
use repovec::progress::ProgressMode;
use repovec::{config, ingest, registry};

/// repovec — a repository ingestion pipeline for vector-backed semantic
/// code search.
#[derive(Parser)]
#[command(
    name = "rvec",
    about = "repovec — ingest a repository into a vector index for semantic search",
    version,
    long_about = "repovec synchronizes a remote repository into a local snapshot, filters its \
    files through configurable ignore rules, splits eligible content into token-bounded chunks, \
    and submits them to a vector index in size-capped batches."
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rvec.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full ingestion pipeline for the configured repository.
    ///
    /// Checks whether the target index already exists (and asks what to do
    /// about it), syncs the snapshot, then walks, chunks, and submits all
    /// eligible files. Per-file decode failures are logged and skipped;
    /// everything else aborts the run with an explanation.
    Index {
        /// Skip the configuration confirmation prompt.
        #[arg(long)]
        yes: bool,

        /// Progress reporting on stderr: off, human, or json.
        /// Defaults to human when stderr is a TTY, off otherwise.
        #[arg(long)]
        progress: Option<String>,
    },

    /// List repositories recorded as indexed, with their index names.
    Repos,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index { yes, progress } => {
            let progress_mode = match progress.as_deref() {
                None => ProgressMode::default_for_tty(),
                Some("off") => ProgressMode::Off,
                Some("human") => ProgressMode::Human,
                Some("json") => ProgressMode::Json,
                Some(other) => anyhow::bail!(
                    "Unknown progress mode: '{}'. Must be off, human, or json.",
                    other
                ),
            };
            ingest::run_index(&cfg, &TerminalPrompt, yes, progress_mode).await?;
        }
        Commands::Repos => {
            registry::run_repos(&cfg)?;
        }
    }

    Ok(())
}
