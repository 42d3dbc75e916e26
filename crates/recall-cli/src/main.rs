// ============================================================================
// recall-db — CLI for inspecting and querying the companion's memory store
// ============================================================================
// Usage:
//   recall-db stats                                  Show store statistics
//   recall-db list [--type TYPE]                     List memories
//   recall-db add "text" --type goal [--vector F]    Store a memory
//   recall-db retrieve --query "text" [--top-k N]    Rank memories for a query
//   recall-db forget ID                              Delete a memory
//   recall-db prune --older-than 90 [--dry-run]      Prune stale memories
//   recall-db export --format json                   Export the store as JSON
// ============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use recall_core::memory::{
    create_embedding_service, EmbeddingService, Memory, MemoryRanker, MemoryStore, MemoryType,
    RankerConfig, RetrievalQuery, EMBEDDING_DIM,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Recall memory store tool
#[derive(Parser)]
#[command(name = "recall-db", version, about = "Inspect and query the companion's memory store")]
struct Cli {
    /// Path to the database file (default: ~/.recall/memories.redb)
    #[arg(long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show store statistics (memory counts by type, access totals)
    Stats,

    /// List memories with optional type filter
    List {
        /// Filter by type: user_fact, goal, trigger, coping_strategy, milestone, summary, preference
        #[arg(long = "type")]
        memory_type: Option<String>,
    },

    /// Store a new memory
    Add {
        /// Memory content
        content: String,

        /// Memory type
        #[arg(long = "type", default_value = "user_fact")]
        memory_type: String,

        /// Importance between 0.0 and 1.0
        #[arg(long, default_value = "0.5")]
        importance: f32,

        /// JSON file containing the embedding (skips the embeddings API)
        #[arg(long)]
        vector: Option<String>,
    },

    /// Rank stored memories against a query
    Retrieve {
        /// Query text to embed
        #[arg(long, conflicts_with = "vector", required_unless_present = "vector")]
        query: Option<String>,

        /// JSON file containing a precomputed query embedding
        #[arg(long)]
        vector: Option<String>,

        /// Maximum number of results (default: RECALL_MAX_MEMORIES or 5)
        #[arg(long, allow_hyphen_values = true)]
        top_k: Option<i64>,
    },

    /// Set the importance of a stored memory
    SetImportance {
        id: Uuid,
        importance: f32,
    },

    /// Delete a memory by id
    Forget {
        id: Uuid,
    },

    /// Prune memories that have not been retrieved recently
    Prune {
        /// Delete memories not accessed in this many days
        #[arg(long, default_value = "90")]
        older_than: i64,

        /// Show what would be pruned without actually deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Export all memories as JSON (embeddings omitted)
    Export {
        /// Output format (currently only json is supported)
        #[arg(long, default_value = "json")]
        format: String,
    },
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

fn parse_type(s: &str) -> Result<MemoryType> {
    s.parse::<MemoryType>().map_err(|e| anyhow::anyhow!(e))
}

fn read_vector(path: &str) -> Result<Vec<f32>> {
    let raw = std::fs::read_to_string(Path::new(path))
        .with_context(|| format!("Failed to read vector file {}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of numbers", path))
}

fn embedding_service(config: &RankerConfig) -> Result<EmbeddingService> {
    let service = create_embedding_service(
        std::env::var("RECALL_EMBEDDING_API_KEY").ok(),
        std::env::var("RECALL_EMBEDDING_BASE_URL").ok(),
        std::env::var("OPENAI_API_KEY").ok(),
    )?;

    if config.embedding_dimension != EMBEDDING_DIM {
        return Ok(service.with_dimensions(config.embedding_dimension));
    }
    Ok(service)
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "recall_core=info".parse::<tracing_subscriber::filter::Directive>() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };

    // stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // load .env before the subscriber reads RUST_LOG
    let dotenv = dotenvy::dotenv();
    init_logging();
    if let Err(e) = dotenv {
        debug!("No .env file loaded: {}", e);
    }

    let cli = Cli::parse();
    let config = RankerConfig::from_env()?;
    let store = MemoryStore::open(cli.db_path.as_deref(), config.embedding_dimension)?;

    match cli.command {
        Commands::Stats => cmd_stats(&store),
        Commands::List { memory_type } => cmd_list(&store, memory_type),
        Commands::Add {
            content,
            memory_type,
            importance,
            vector,
        } => cmd_add(&store, &config, content, &memory_type, importance, vector).await,
        Commands::Retrieve {
            query,
            vector,
            top_k,
        } => cmd_retrieve(&store, config, query, vector, top_k).await,
        Commands::SetImportance { id, importance } => {
            store.update_importance(&id, importance)?;
            println!("Updated importance of {} to {}", id, importance);
            Ok(())
        }
        Commands::Forget { id } => cmd_forget(&store, &id),
        Commands::Prune {
            older_than,
            dry_run,
        } => cmd_prune(&store, older_than, dry_run),
        Commands::Export { format } => cmd_export(&store, &format),
    }
}

fn cmd_stats(store: &MemoryStore) -> Result<()> {
    let stats = store.stats()?;

    println!("=== Recall Memory Store Stats ===");
    println!("Database: {}", store.path().display());
    println!();
    println!("Memories:       {} total", stats.total_memories);
    let mut counts: Vec<_> = stats.type_counts.iter().collect();
    counts.sort();
    for (memory_type, count) in counts {
        println!("  {:16} {}", memory_type, count);
    }
    println!("Retrievals:     {}", stats.total_accesses);
    println!("Never recalled: {}", stats.never_accessed);

    Ok(())
}

fn cmd_list(store: &MemoryStore, type_filter: Option<String>) -> Result<()> {
    let filter = type_filter.as_deref().map(parse_type).transpose()?;
    let mut memories = store.list_memories(filter)?;

    if memories.is_empty() {
        println!("No memories found.");
        return Ok(());
    }

    memories.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));

    println!(
        "{:<36}  {:<16}  {:>4}  {:>5}  {:<22}  {}",
        "MEMORY ID", "TYPE", "IMP", "HITS", "LAST ACCESSED", "CONTENT"
    );
    println!("{}", "-".repeat(120));

    for memory in &memories {
        let content = memory.content.chars().take(40).collect::<String>();
        println!(
            "{:<36}  {:<16}  {:>4.2}  {:>5}  {:<22}  {}",
            memory.id,
            memory.memory_type,
            memory.importance,
            memory.access_count,
            format_timestamp(memory.last_accessed),
            content
        );
    }

    println!("\nTotal: {} memories", memories.len());
    Ok(())
}

async fn cmd_add(
    store: &MemoryStore,
    config: &RankerConfig,
    content: String,
    memory_type: &str,
    importance: f32,
    vector: Option<String>,
) -> Result<()> {
    let memory_type = parse_type(memory_type)?;
    let embedding = match vector {
        Some(path) => read_vector(&path)?,
        None => embedding_service(config)?.embed_single(&content).await?,
    };

    let memory = Memory::new(
        content,
        memory_type,
        importance,
        embedding,
        store.embedding_dim(),
    )?;
    store.store_memory(&memory)?;

    println!("Stored memory {}", memory.id);
    Ok(())
}

async fn cmd_retrieve(
    store: &MemoryStore,
    config: RankerConfig,
    query: Option<String>,
    vector: Option<String>,
    top_k: Option<i64>,
) -> Result<()> {
    let top_k = top_k.unwrap_or(config.max_memories_to_retrieve as i64);
    let embedding = match (vector, query) {
        (Some(path), _) => read_vector(&path)?,
        (None, Some(text)) => embedding_service(&config)?.embed_single(&text).await?,
        (None, None) => anyhow::bail!("Provide either --query or --vector"),
    };

    let ranker = MemoryRanker::new(config)?;
    let retrieval = store.retrieve(&ranker, &RetrievalQuery::new(embedding, top_k))?;

    for warning in &retrieval.warnings {
        warn!("{}", warning);
    }

    if retrieval.is_empty() {
        println!("No memories matched.");
        return Ok(());
    }

    println!(
        "{:>4}  {:>6}  {:>6}  {:>6}  {:>6}  {:>6}  {:<36}  {}",
        "RANK", "SCORE", "SIM", "REC", "IMP", "ACC", "MEMORY ID", "CONTENT"
    );
    println!("{}", "-".repeat(120));

    for (rank, ranked) in retrieval.results.iter().enumerate() {
        let content = ranked.memory.content.chars().take(40).collect::<String>();
        println!(
            "{:>4}  {:>6.3}  {:>6.3}  {:>6.3}  {:>6.3}  {:>6.3}  {:<36}  {}",
            rank + 1,
            ranked.score,
            ranked.breakdown.similarity,
            ranked.breakdown.recency,
            ranked.breakdown.importance,
            ranked.breakdown.access,
            ranked.memory.id,
            content
        );
    }

    if !retrieval.warnings.is_empty() {
        println!("\n{} memories skipped (integrity warnings)", retrieval.warnings.len());
    }
    Ok(())
}

fn cmd_forget(store: &MemoryStore, id: &Uuid) -> Result<()> {
    if store.delete_memory(id)? {
        println!("Deleted memory {}", id);
    } else {
        println!("No memory with id {}", id);
    }
    Ok(())
}

fn cmd_prune(store: &MemoryStore, older_than: i64, dry_run: bool) -> Result<()> {
    if dry_run {
        println!("=== DRY RUN — no data will be deleted ===\n");

        let stale = store.stale_memories(older_than, Utc::now().timestamp())?;
        println!(
            "Would prune {} memories not accessed in {} days",
            stale.len(),
            older_than
        );
        for memory in &stale {
            println!(
                "  - {} [{}] (last accessed: {})",
                memory.id,
                memory.memory_type,
                format_timestamp(memory.last_accessed)
            );
        }
    } else {
        let pruned = store.prune_stale(older_than)?;
        println!("Pruned {} memories (not accessed in {} days)", pruned, older_than);
    }

    Ok(())
}

fn cmd_export(store: &MemoryStore, format: &str) -> Result<()> {
    if format != "json" {
        anyhow::bail!("Unsupported format '{}'. Only 'json' is supported.", format);
    }

    let memories: Vec<_> = store
        .list_memories(None)?
        .into_iter()
        .map(|m| {
            serde_json::json!({
                "id": m.id,
                "content": m.content,
                "memory_type": m.memory_type,
                "importance": m.importance,
                "created_at": m.created_at,
                "last_accessed": m.last_accessed,
                "access_count": m.access_count,
            })
        })
        .collect();
    let stats = store.stats()?;

    let export = serde_json::json!({
        "exported_at": Utc::now().to_rfc3339(),
        "stats": stats,
        "memories": memories,
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}
