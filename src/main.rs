//! # convo CLI
//!
//! Builds and queries the conversation index, and serves it to agents.
//!
//! ## Usage
//!
//! ```bash
//! convo --config ./config/convo.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `convo index` | Rebuild the index from the archive |
//! | `convo search "<query>"` | Search conversations |
//! | `convo commands "<query>"` | Find shell commands mentioned in conversations |
//! | `convo snippet <id>` | Print a window of a conversation's messages |
//! | `convo stats` | Show what is indexed |
//! | `convo serve mcp` | Serve the tools over MCP stdio |
//! | `convo serve http` | Serve the tools over HTTP |
//!
//! Every command except `index` builds the index first. With `--reuse` and a
//! file-backed `[db].path`, an existing populated store is served as is.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use convo_index::config::{self, Config};
use convo_index::index::SearchIndex;
use convo_index::models::{CommandFilters, CommandType, ConversationFilters};
use convo_index::progress::{BuildProgressReporter, NoProgress, ProgressMode};
use convo_index::tools::{ToolContext, ToolRegistry};
use convo_index::workspace::Workspace;
use convo_index::{mcp, search, server, snippet, stats};

/// convo: search an archive of past AI conversations.
#[derive(Parser)]
#[command(
    name = "convo",
    about = "Search an archive of past AI conversations",
    version,
    long_about = "convo indexes an archive of exported AI conversations into SQLite with \
    full-text and fuzzy search, extracts the shell commands mentioned in them, and serves \
    the index to agents over MCP or HTTP."
)]
struct Cli {
    /// Path to configuration file (TOML). Optional; defaults apply when absent.
    #[arg(long, global = true, default_value = "./config/convo.toml")]
    config: PathBuf,

    /// Archive directory, overriding `[archive].path`.
    #[arg(long, global = true, env = "CONVO_ARCHIVE")]
    archive: Option<PathBuf>,

    /// Projects root for workspace search, overriding `[workspace].projects_root`.
    #[arg(long, global = true, env = "CONVO_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Serve an existing file-backed index instead of rebuilding it.
    #[arg(long, global = true)]
    reuse: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index from the archive.
    Index {
        /// Progress output: `off`, `human`, or `json` (stderr).
        /// Defaults to `human` on a terminal and `off` otherwise.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Search conversations by title, summary, project, and message text.
    Search {
        query: String,

        /// Only conversations in this project.
        #[arg(long)]
        project: Option<String>,

        /// Only conversations created on or after this date (YYYY-MM-DD).
        #[arg(long)]
        from: Option<String>,

        /// Only conversations created on or before this date (YYYY-MM-DD).
        #[arg(long)]
        to: Option<String>,

        #[arg(long)]
        limit: Option<i64>,
    },

    /// Find shell commands mentioned in conversations.
    Commands {
        query: String,

        /// Command type: `cli`, `code`, `config`, or `any`.
        #[arg(long = "type")]
        command_type: Option<String>,

        /// Skip full-text search and use fuzzy matching only.
        #[arg(long)]
        fuzzy: bool,

        #[arg(long)]
        limit: Option<i64>,
    },

    /// Print a window of a conversation's messages.
    Snippet {
        conversation_id: String,

        /// First message to show (0-based).
        #[arg(long, default_value_t = 0)]
        start: i64,

        /// Number of messages to show.
        #[arg(long, default_value_t = snippet::DEFAULT_MESSAGE_COUNT)]
        count: i64,
    },

    /// Show what is indexed.
    Stats,

    /// Serve the tools to agents.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// MCP over stdin/stdout.
    Mcp,
    /// JSON HTTP API on `[server].bind`.
    Http,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("convo_index=info,warn"));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn parse_progress(value: Option<&str>) -> Result<ProgressMode> {
    match value {
        None => Ok(ProgressMode::default_for_tty()),
        Some("off") => Ok(ProgressMode::Off),
        Some("human") => Ok(ProgressMode::Human),
        Some("json") => Ok(ProgressMode::Json),
        Some(other) => bail!(
            "unknown progress mode '{}': expected off, human, or json",
            other
        ),
    }
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut cfg = config::load_or_default(&cli.config)?;
    if let Some(ref archive) = cli.archive {
        cfg.archive.path = archive.clone();
    }
    if let Some(ref root) = cli.workspace {
        cfg.workspace.projects_root = Some(root.clone());
    }
    Ok(cfg)
}

/// Attaches with `--reuse` when possible, otherwise builds from the archive.
async fn prepare(
    index: &SearchIndex,
    cfg: &Config,
    reuse: bool,
    reporter: &dyn BuildProgressReporter,
) -> Result<()> {
    if reuse {
        if index.attach_existing().await? {
            return Ok(());
        }
        info!("nothing to reuse, building from archive");
    }
    index.build(&cfg.archive.path, reporter).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = resolve_config(&cli)?;
    let index = SearchIndex::open(&cfg).await?;

    match cli.command {
        Commands::Index { ref progress } => {
            let mode = parse_progress(progress.as_deref())?;
            let report = index.build(&cfg.archive.path, mode.reporter().as_ref()).await?;
            println!(
                "Indexed {} conversations ({} messages, {} commands) from {} of {} files.",
                report.conversations,
                report.messages,
                report.commands,
                report.files_processed,
                report.files_discovered
            );
            for failure in &report.failures {
                println!("  skipped {}: {}", failure.path.display(), failure.error);
            }
        }
        Commands::Search {
            ref query,
            ref project,
            ref from,
            ref to,
            limit,
        } => {
            prepare(&index, &cfg, cli.reuse, &NoProgress).await?;
            let filters = ConversationFilters {
                project: project.clone(),
                date_from: from.clone(),
                date_to: to.clone(),
                limit,
            };
            search::run_search(&index, query, &filters).await?;
        }
        Commands::Commands {
            ref query,
            ref command_type,
            fuzzy,
            limit,
        } => {
            let command_type = match command_type {
                Some(value) => CommandType::parse_filter(value)?,
                None => None,
            };
            prepare(&index, &cfg, cli.reuse, &NoProgress).await?;
            let filters = CommandFilters {
                command_type,
                limit,
            };
            search::run_commands(&index, query, &filters, fuzzy).await?;
        }
        Commands::Snippet {
            ref conversation_id,
            start,
            count,
        } => {
            prepare(&index, &cfg, cli.reuse, &NoProgress).await?;
            snippet::run_snippet(&index, conversation_id, start, count).await?;
        }
        Commands::Stats => {
            prepare(&index, &cfg, cli.reuse, &NoProgress).await?;
            stats::run_stats(&index).await?;
        }
        Commands::Serve { ref service } => {
            let reporter = ProgressMode::default_for_tty().reporter();
            prepare(&index, &cfg, cli.reuse, reporter.as_ref()).await?;

            let workspace = Workspace::from_config(&cfg.workspace);
            let index = Arc::new(index);
            let ctx = ToolContext::new(index.clone(), workspace, cfg.archive.path.clone());
            let tools = Arc::new(ToolRegistry::with_builtins());

            match service {
                ServeService::Mcp => mcp::run_stdio(ctx, tools).await?,
                ServeService::Http => server::run_server(ctx, tools).await?,
            }
            index.close().await;
            return Ok(());
        }
    }

    index.close().await;
    Ok(())
}
