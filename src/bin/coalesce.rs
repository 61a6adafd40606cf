//! Coalesce CLI — batch entity resolution over a SQLite evidence store.
//!
//! Usage:
//!   coalesce resolve --org <org> --input batch.json [--db path]
//!   coalesce split --entity <id> --mention <id>... [--reason text] [--db path]
//!   coalesce history --entity <id> [--provenance] [--db path]

use clap::{Parser, Subcommand};
use coalesce::{
    provenance_of, CrossBatchResolver, EntityId, EntityRegistry, EvidenceStore,
    IncrementalClusterer, MentionId, MentionInput, MergeLedger, OrgId, ResolverConfig,
    SplitService, SqliteStore, TrigramEmbedder,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "coalesce",
    version,
    about = "Cross-batch entity resolution engine"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a batch of extracted mentions
    Resolve {
        /// Tenant the batch belongs to
        #[arg(long)]
        org: String,
        /// Path to a JSON array of mention inputs
        #[arg(long)]
        input: PathBuf,
        /// Minimum similarity for a merge decision
        #[arg(long)]
        floor: Option<f64>,
        /// Max concurrent per-mention resolutions
        #[arg(long)]
        concurrency: Option<usize>,
        /// Path to SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Detach mentions from an entity into a new one
    Split {
        /// Entity to split
        #[arg(long)]
        entity: String,
        /// Mention id to detach (repeatable)
        #[arg(long = "mention", required = true)]
        mentions: Vec<String>,
        /// Acting principal recorded on the ledger entry
        #[arg(long, default_value = "cli")]
        actor: String,
        /// Rationale recorded on the ledger entry
        #[arg(long, default_value = "")]
        reason: String,
        /// Path to SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Show merge history for an entity
    History {
        /// Entity to inspect
        #[arg(long)]
        entity: String,
        /// Also list every entity absorbed into this one, transitively
        #[arg(long)]
        provenance: bool,
        /// Path to SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn default_db_path() -> PathBuf {
    PathBuf::from("coalesce.db")
}

fn open_store(db: Option<PathBuf>) -> Result<Arc<SqliteStore>, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    let store =
        SqliteStore::open(&db_path).map_err(|e| format!("failed to open database: {}", e))?;
    Ok(Arc::new(store))
}

fn build_clusterer(store: Arc<SqliteStore>, config: ResolverConfig) -> Result<IncrementalClusterer, String> {
    let registry = Arc::new(EntityRegistry::new(
        Arc::clone(&store) as Arc<dyn EvidenceStore>,
        Box::new(TrigramEmbedder::new()),
        &config,
    ));
    registry
        .warm_start()
        .map_err(|e| format!("failed to warm candidate filter: {}", e))?;
    let resolver = CrossBatchResolver::new(
        Arc::clone(&store) as Arc<dyn EvidenceStore>,
        registry,
        config,
    );
    Ok(IncrementalClusterer::new(store, resolver))
}

async fn cmd_resolve(
    org: String,
    input: PathBuf,
    floor: Option<f64>,
    concurrency: Option<usize>,
    db: Option<PathBuf>,
) -> i32 {
    let raw = match std::fs::read_to_string(&input) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", input.display(), e);
            return 1;
        }
    };
    let inputs: Vec<MentionInput> = match serde_json::from_str(&raw) {
        Ok(inputs) => inputs,
        Err(e) => {
            eprintln!("Error: malformed batch file: {}", e);
            return 1;
        }
    };

    let mut config = ResolverConfig::default();
    if let Some(floor) = floor {
        config = config.with_similarity_floor(floor);
    }
    if let Some(limit) = concurrency {
        config = config.with_max_concurrent(limit);
    }

    let store = match open_store(db) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let clusterer = match build_clusterer(store, config) {
        Ok(clusterer) => clusterer,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    match clusterer.add_batch(&OrgId::from(org), inputs).await {
        Ok(result) => {
            match serde_json::to_string_pretty(&result.report) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Error: cannot serialize report: {}", e);
                    return 1;
                }
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_split(
    entity: &str,
    mentions: &[String],
    actor: &str,
    reason: &str,
    db: Option<PathBuf>,
) -> i32 {
    let entity_id = match EntityId::from_str(entity) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Error: invalid entity id '{}': {}", entity, e);
            return 1;
        }
    };
    let mut mention_ids = Vec::with_capacity(mentions.len());
    for raw in mentions {
        match MentionId::from_str(raw) {
            Ok(id) => mention_ids.push(id),
            Err(e) => {
                eprintln!("Error: invalid mention id '{}': {}", raw, e);
                return 1;
            }
        }
    }

    let store = match open_store(db) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let config = ResolverConfig::default();
    let registry = Arc::new(EntityRegistry::new(
        Arc::clone(&store) as Arc<dyn EvidenceStore>,
        Box::new(TrigramEmbedder::new()),
        &config,
    ));
    let service = SplitService::new(Arc::clone(&store) as Arc<dyn EvidenceStore>, registry, actor);

    match service.split_entity(&entity_id, &mention_ids, reason) {
        Ok(outcome) => {
            println!(
                "Split {} mention(s) from {} into new entity {}",
                outcome.detached.len(),
                entity_id,
                outcome.new_entity.id
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_history(entity: &str, provenance: bool, db: Option<PathBuf>) -> i32 {
    let entity_id = match EntityId::from_str(entity) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Error: invalid entity id '{}': {}", entity, e);
            return 1;
        }
    };
    let store = match open_store(db) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let history = match store.history_for(&entity_id) {
        Ok(history) => history,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if history.is_empty() {
        println!("No ledger entries for {}", entity_id);
    } else {
        println!(
            "{:<25}  {:<18}  {:>5}  {:<12}  SOURCE -> TARGET",
            "RECORDED", "REASON", "CONF", "ACTOR"
        );
        for record in &history {
            println!(
                "{:<25}  {:<18}  {:>5.2}  {:<12}  {} -> {}",
                record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                record.reason.as_str(),
                record.confidence,
                record.actor,
                record.source,
                record.target
            );
        }
    }

    if provenance {
        match provenance_of(store.as_ref(), &entity_id) {
            Ok(absorbed) => {
                if absorbed.is_empty() {
                    println!("No absorbed entities.");
                } else {
                    println!("Absorbed entities:");
                    for id in absorbed {
                        println!("  {}", id);
                    }
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    }
    0
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let code = match cli.command {
        Commands::Resolve {
            org,
            input,
            floor,
            concurrency,
            db,
        } => cmd_resolve(org, input, floor, concurrency, db).await,
        Commands::Split {
            entity,
            mentions,
            actor,
            reason,
            db,
        } => cmd_split(&entity, &mentions, &actor, &reason, db),
        Commands::History {
            entity,
            provenance,
            db,
        } => cmd_history(&entity, provenance, db),
    };
    std::process::exit(code);
}
