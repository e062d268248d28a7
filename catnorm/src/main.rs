//! catnorm - catalog name normalization CLI
//!
//! Configuration follows the usual order: command-line flag, environment
//! variable, TOML file, built-in default. Logs go to stderr; results are
//! printed to stdout as JSON.

use anyhow::{bail, Context, Result};
use catnorm::ai::{AiCategoryClassifier, AiClient, AiClientConfig, AiNameCorrector};
use catnorm::classification::{load_tree, CategoryTree, FoldingEngine};
use catnorm::db::{InMemorySessionStore, SessionStore, SqliteSessionStore};
use catnorm::stats::{PatternAnalyzer, StatsCollector};
use catnorm::{BatchConfig, BatchDriver, BatchItem, PipelineConfig, VersionedPipeline};
use catnorm_common::TomlConfig;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Command-line arguments for catnorm
#[derive(Parser, Debug)]
#[command(name = "catnorm")]
#[command(about = "Normalize and classify catalog item names")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(short, long, env = "CATNORM_CONFIG")]
    config: Option<PathBuf>,

    /// Session database (SQLite)
    #[arg(short, long, env = "CATNORM_DATABASE")]
    database: Option<PathBuf>,

    /// Keep sessions in memory instead of the database
    #[arg(long)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pattern cleanup only; prints the stage as JSON
    Normalize {
        name: String,
    },

    /// Full pipeline for one name
    Run {
        name: String,

        /// Folding strategy for classification
        #[arg(long)]
        strategy: Option<String>,

        /// Apply AI correction and classification
        #[arg(long)]
        ai: bool,

        /// Item code passed to the classifier
        #[arg(long)]
        code: Option<String>,

        /// Classifier tree (TSV or JSON rows)
        #[arg(long)]
        tree: Option<PathBuf>,
    },

    /// Process a file with one name per line (Ctrl+C stops between items)
    Batch {
        file: PathBuf,

        /// Apply AI correction and classification
        #[arg(long)]
        ai: bool,

        /// Pause between AI calls in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        #[arg(long)]
        strategy: Option<String>,

        #[arg(long)]
        tree: Option<PathBuf>,
    },

    /// Print the stage history of a session
    History {
        session_id: Uuid,
    },

    /// Restore a session to the output of an earlier stage
    Revert {
        session_id: Uuid,
        stage_id: Uuid,
    },

    /// Fold a category path given as `A > B > C`
    Fold {
        path: String,

        #[arg(long, default_value = "top_priority")]
        strategy: String,

        #[arg(long, default_value_t = 2)]
        depth: u32,
    },

    /// List recent sessions
    Sessions {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = TomlConfig::resolve(cli.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("catnorm {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Normalize { ref name } => {
            let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
            let mut pipeline = VersionedPipeline::new(store, PipelineConfig::from_toml(&config))?;
            pipeline.start_session("cli", name).await?;
            pipeline.apply_patterns().await?;
            print_json(&pipeline.history())?;
        }

        Command::Run {
            ref name,
            ref strategy,
            ai,
            ref code,
            ref tree,
        } => {
            let store = open_store(&cli, &config).await?;
            let stats = Arc::new(StatsCollector::new());
            let mut pipeline = build_pipeline(&config, store, stats.clone(), ai, tree.as_deref())?;

            let session = pipeline.start_session("cli", name).await?;
            if let Some(code) = code {
                pipeline.set_metadata("code", json!(code)).await?;
            }
            pipeline.apply_patterns().await?;

            if ai {
                let cancel = CancellationToken::new();
                let use_chat = pipeline.config().use_chat;
                pipeline.apply_ai_correction(use_chat, &cancel).await?;
                pipeline.classify(strategy.as_deref(), &cancel).await?;
            }
            let session_state = pipeline.complete().await?;
            info!(session_id = %session.id, "Run finished");

            print_json(&json!({
                "session": session_state,
                "stages": pipeline.history(),
                "stats": stats.snapshot(),
            }))?;
        }

        Command::Batch {
            ref file,
            ai,
            delay_ms,
            ref strategy,
            ref tree,
        } => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let items = BatchItem::from_lines(&text);

            let store = open_store(&cli, &config).await?;
            let stats = Arc::new(StatsCollector::new());
            let analyzer = Arc::new(PatternAnalyzer::default());
            let pipeline = build_pipeline(&config, store, stats.clone(), ai, tree.as_deref())?
                .with_analyzer(analyzer.clone());

            let mut batch_config = BatchConfig::from_toml(&config);
            batch_config.use_ai_correction = ai;
            batch_config.classify = ai;
            batch_config.strategy_id = strategy.clone();
            if let Some(ms) = delay_ms {
                batch_config.inter_call_delay = Duration::from_millis(ms);
            }

            let stop = CancellationToken::new();
            let trigger = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Received Ctrl+C, stopping after the current item");
                    trigger.cancel();
                }
            });

            let mut driver = BatchDriver::new(pipeline, batch_config)?;
            let report = driver.run(items, &stop).await;

            eprintln!("{}", analyzer.format_report());
            print_json(&json!({
                "report": report,
                "stats": stats.snapshot(),
                "patterns": analyzer.report(),
            }))?;
        }

        Command::History { session_id } => {
            let store = open_store(&cli, &config).await?;
            let session = store
                .get_session(session_id)
                .await?
                .with_context(|| format!("Session {} not found", session_id))?;
            let stages = store.get_stage_history(session_id).await?;
            print_json(&json!({ "session": session, "stages": stages }))?;
        }

        Command::Revert {
            session_id,
            stage_id,
        } => {
            let store = open_store(&cli, &config).await?;
            let mut pipeline = VersionedPipeline::new(store, PipelineConfig::from_toml(&config))?;
            pipeline.open_session(session_id).await?;
            let stage = pipeline.revert_to_stage(stage_id).await?;
            print_json(&stage)?;
        }

        Command::Fold {
            ref path,
            ref strategy,
            depth,
        } => {
            let labels: Vec<String> = path
                .split('>')
                .map(str::trim)
                .filter(|label| !label.is_empty())
                .map(str::to_string)
                .collect();
            if labels.is_empty() {
                bail!("Category path is empty");
            }
            let engine = folding_engine(&config)?;
            let folded = engine.fold(&labels, strategy, depth)?;
            print_json(&folded)?;
        }

        Command::Sessions { limit } => {
            let store = open_store(&cli, &config).await?;
            print_json(&store.list_sessions(limit).await?)?;
        }
    }

    Ok(())
}

async fn open_store(cli: &Cli, config: &TomlConfig) -> Result<Arc<dyn SessionStore>> {
    if cli.memory {
        return Ok(Arc::new(InMemorySessionStore::new()));
    }
    let path = config.database_path(cli.database.as_deref());
    info!("Database: {}", path.display());
    let store = SqliteSessionStore::open(&path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(store))
}

fn folding_engine(config: &TomlConfig) -> Result<FoldingEngine> {
    let mut engine = FoldingEngine::new();
    if let Some(file) = &config.pipeline.strategies_file {
        let json = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read strategies file {}", file.display()))?;
        let ids = engine.load_strategy_json(&json)?;
        info!(strategies = ?ids, "Loaded folding strategies");
    }
    Ok(engine)
}

fn load_category_tree(path: &Path) -> Result<CategoryTree> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read classifier tree {}", path.display()))?;
    let tree = load_tree(&text)?;
    info!(nodes = tree.len(), "Loaded classifier tree");
    Ok(tree)
}

fn build_pipeline(
    config: &TomlConfig,
    store: Arc<dyn SessionStore>,
    stats: Arc<StatsCollector>,
    with_ai: bool,
    tree: Option<&Path>,
) -> Result<VersionedPipeline> {
    let mut pipeline = VersionedPipeline::new(store, PipelineConfig::from_toml(config))?
        .with_folding_engine(Arc::new(folding_engine(config)?))
        .with_stats(stats.clone());

    if with_ai {
        let client_config = AiClientConfig::from_toml(config)?;
        let client = Arc::new(AiClient::new(client_config)?.with_stats(stats));

        let mut classifier = AiCategoryClassifier::new(client.clone());
        if let Some(path) = tree {
            classifier = classifier.with_tree(Arc::new(load_category_tree(path)?));
        }

        pipeline = pipeline
            .with_corrector(Arc::new(AiNameCorrector::new(client)))
            .with_classifier(Arc::new(classifier));
    }

    Ok(pipeline)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
