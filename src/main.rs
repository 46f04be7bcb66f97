//! # ThoughtSynth CLI (`synth`)
//!
//! ## Usage
//!
//! ```bash
//! synth --config ./config/synth.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `synth init` | Create the SQLite database and run schema migrations |
//! | `synth serve` | Start the HTTP + WebSocket server |
//! | `synth classify <url>` | Print the content type of a URL |
//! | `synth process <url> --user <id>` | Run the ingestion pipeline once |
//! | `synth search "<query>" --user <id>` | Semantic search over a user's items |
//!
//! Logging goes to stderr through `tracing`; set `RUST_LOG` to adjust it.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use thoughtsynth::app::AppContext;
use thoughtsynth::config;
use thoughtsynth::extract::classify;
use thoughtsynth::ingest::{process_content, ProcessRequest};
use thoughtsynth::migrate;
use thoughtsynth::server;

/// ThoughtSynth: save links, get an AI digest, discuss them per item.
#[derive(Parser)]
#[command(name = "synth", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/synth.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve {
        /// Keep everything in memory instead of SQLite.
        #[arg(long)]
        memory: bool,
    },

    /// Classify a URL as article, podcast, or video (no network access).
    Classify { url: String },

    /// Fetch, analyze, and store one URL.
    Process {
        url: String,

        /// Owner of the new item.
        #[arg(long)]
        user: String,

        /// Notes stored as the item's first takeaway.
        #[arg(long)]
        notes: Option<String>,
    },

    /// Vector similarity search over a user's items and takeaways.
    Search {
        query: String,

        #[arg(long)]
        user: String,

        #[arg(long)]
        limit: Option<usize>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,thoughtsynth=debug,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let load = || config::load_config(&cli.config);

    match cli.command {
        Commands::Classify { url } => {
            println!("{}", classify(&url)?);
        }
        Commands::Init => {
            migrate::run_migrations(&load()?).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve { memory } => {
            server::run_server(&load()?, memory).await?;
        }
        Commands::Process { url, user, notes } => {
            let cfg = load()?;
            let ctx = AppContext::from_config(&cfg, false).await?;
            let outcome = process_content(
                &ctx,
                &ProcessRequest {
                    url,
                    user_takeaways: notes,
                    owner_id: user,
                },
            )
            .await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.success {
                std::process::exit(1);
            }
        }
        Commands::Search { query, user, limit } => {
            let cfg = load()?;
            let ctx = AppContext::from_config(&cfg, false).await?;
            let limit = limit.unwrap_or(cfg.content.semantic_default_limit);
            let matches = ctx.indexer.semantic_search(&user, &query, limit).await?;
            if matches.is_empty() {
                println!("No results.");
            }
            for (i, m) in matches.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} ({})",
                    i + 1,
                    m.score,
                    m.metadata.title,
                    m.id
                );
                if let Some(text) = &m.metadata.takeaway_text {
                    println!("    takeaway: {}", text);
                } else if let Some(url) = &m.metadata.url {
                    println!("    {}", url);
                }
            }
        }
    }

    Ok(())
}
