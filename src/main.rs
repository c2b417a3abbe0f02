//! # lexguard CLI
//!
//! ## Usage
//!
//! ```bash
//! lexguard --config ./config/lexguard.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexguard init` | Create the SQLite database and run schema migrations |
//! | `lexguard import <file> [--auto-link]` | Import parent chunks from JSONL |
//! | `lexguard embed pending` | Backfill missing or stale child embeddings |
//! | `lexguard lifecycle approve <id>` | DRAFT → ACTIVE |
//! | `lexguard lifecycle retire <id>` | ACTIVE → RETIRED |
//! | `lexguard query "<question>"` | Answer a question with citations |
//! | `lexguard get <id>` | Show a chunk and its relationships |
//! | `lexguard get --section 017` | List ACTIVE chunks at a statutory anchor |
//! | `lexguard serve` | Start the HTTP server |
//! | `lexguard completions <shell>` | Print a shell completion script |

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use lexguard::lifecycle::LifecycleAction;
use lexguard::{config, embed_cmd, get, import, lifecycle, logging, migrate, query, server};

/// Cited question answering over the Companies Act, 2013.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lexguard.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lexguard",
    about = "Governance-grade retrieval and cited answers over the Companies Act, 2013",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lexguard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Import finalized parent chunks from a JSONL file.
    ///
    /// Each line is one chunk. Children, retrieval rules, refusal
    /// policies and reciprocal relationship edges are derived and written
    /// alongside it. New chunks start as DRAFT unless the line sets a
    /// status.
    Import {
        /// Path to the JSONL file.
        path: PathBuf,

        /// Link parents that declare no relationships to the Act chunk of
        /// the same section, by document type.
        #[arg(long)]
        auto_link: bool,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Move a chunk through its lifecycle.
    Lifecycle {
        #[command(subcommand)]
        action: LifecycleCommand,
    },

    /// Answer a question from ACTIVE chunks, with citations.
    Query {
        /// The question.
        query: String,

        /// Maximum number of chunks to retrieve.
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show a chunk by id, or list ACTIVE chunks at a statutory anchor.
    Get {
        /// Chunk id.
        id: Option<String>,

        /// Section number, e.g. `17` or `017`.
        #[arg(long, conflicts_with = "id")]
        section: Option<String>,

        /// Sub-section within `--section`.
        #[arg(long, requires = "section")]
        sub_section: Option<String>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Print a shell completion script to stdout.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed child chunks that are missing or have stale embeddings.
    Pending {
        /// Maximum number of chunks to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config (number of texts per API call).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum LifecycleCommand {
    /// DRAFT → ACTIVE. A parent's DRAFT children move with it.
    Approve { chunk_id: String },
    /// ACTIVE → RETIRED. A parent's ACTIVE children move with it.
    Retire { chunk_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(
            shell,
            &mut Cli::command(),
            "lexguard",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    logging::init_tracing();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { path, auto_link } => {
            import::run_import(&cfg, &path, import::ImportOptions { auto_link }).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                embed_cmd::run_embed_pending(&cfg, limit, batch_size, dry_run).await?;
            }
        },
        Commands::Lifecycle { action } => {
            let (chunk_id, action) = match action {
                LifecycleCommand::Approve { chunk_id } => (chunk_id, LifecycleAction::Approve),
                LifecycleCommand::Retire { chunk_id } => (chunk_id, LifecycleAction::Retire),
            };
            lifecycle::run_lifecycle(&cfg, &chunk_id, action).await?;
        }
        Commands::Query { query, top_k, json } => {
            query::run_query(&cfg, &query, top_k, json).await?;
        }
        Commands::Get {
            id,
            section,
            sub_section,
            json,
        } => {
            get::run_get(
                &cfg,
                id.as_deref(),
                section.as_deref(),
                sub_section.as_deref(),
                json,
            )
            .await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
