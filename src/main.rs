//! Thin CLI harness over [`hme_core::Engine`].
//!
//! The engine itself has no CLI surface (spec §1) — this binary exists so
//! the crate is runnable for manual poking, not as a product surface.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hme_core::{Engine, EngineConfig, SignificanceType};

#[derive(Parser)]
#[command(name = "hme", about = "Hierarchical memory engine CLI")]
struct Cli {
    #[arg(long, env = "HME_BASE_DIR", default_value = ".")]
    base_dir: std::path::PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a new WORKING-tier block.
    Add {
        content: String,
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,
    },
    /// Search across tiers for matching blocks.
    Search {
        query: String,
        #[arg(long)]
        include_archived: bool,
    },
    /// Look a block up by its id.
    Get { id: String },
    /// Blocks related to an existing block.
    Related { id: String },
    /// Current nexus points.
    Nexus,
    /// Aggregate per-tier counts and token totals.
    Stats,
    /// Run the prune/archive/nexus/snapshot maintenance sweep.
    Maintain,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(&cli.base_dir).context("failed to load configuration")?;
    let mut engine = Engine::open(config).context("failed to open engine")?;
    let now = chrono::Utc::now().timestamp();

    match cli.command {
        Command::Add { content, keywords } => {
            let id = uuid::Uuid::new_v4().to_string();
            let block = engine
                .add_memory(&id, content, SignificanceType::User, keywords, now)
                .context("add_memory failed")?;
            println!("{}", serde_json::to_string_pretty(&block)?);
        }
        Command::Search { query, include_archived } => {
            let results = engine
                .search_memory(&query, include_archived, now)
                .context("search_memory failed")?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::Get { id } => match engine.get_memory_by_id(&id) {
            Some(block) => println!("{}", serde_json::to_string_pretty(&block)?),
            None => println!("no block with id {id}"),
        },
        Command::Related { id } => {
            let related = engine.get_related_memories(&id).context("get_related_memories failed")?;
            println!("{}", serde_json::to_string_pretty(&related)?);
        }
        Command::Nexus => {
            println!("{}", serde_json::to_string_pretty(&engine.get_nexus_points())?);
        }
        Command::Stats => {
            let stats = engine.get_memory_stats();
            println!(
                "total_blocks={} total_tokens={} working={} short_term={} long_term={} stale={}",
                stats.total_blocks,
                stats.total_tokens,
                stats.working.block_count,
                stats.short_term.block_count,
                stats.long_term.block_count,
                stats.stale.block_count,
            );
        }
        Command::Maintain => {
            let report = engine.maintain_system(now).context("maintain_system failed")?;
            println!(
                "pruned={} archived_to_long_term={} archived_to_stale={} snapshot_taken={}",
                report.pruned.len(),
                report.archived_to_long_term.len(),
                report.archived_to_stale.len(),
                report.snapshot_taken,
            );
        }
    }

    Ok(())
}
