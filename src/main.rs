//! # Autosign
//!
//! Runs the recurring-policy engines against a shared Postgres database.
//!
//! Usage:
//!   autosign scheduler                        # Enqueue due policies every 30s
//!   autosign tx-indexer                       # Track broadcast transactions
//!   autosign migrate                          # Apply the embedded schema
//!   autosign keysign --request req.json       # Run one signing session
//!   autosign queue purge                      # Drop finished tasks past retention

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use autosign_core::config::{AutosignConfig, LoggingConfig};
use autosign_core::traits::{Emitter, SafetyGate, TaskQueue};
use autosign_core::types::KeysignRequest;
use autosign_core::util::spawn_signal_listener;
use autosign_db::{MigrationRunner, PgPolicyStore, PgSafetyGate, PgSchedulerStore, PgTaskQueue, PgTxStore};
use autosign_keysign::{HttpEmitter, HttpRelay, QueueEmitter, Signer};
use autosign_scheduler::{SchedulerOptions, SchedulerWorker};
use autosign_txindexer::{TxIndexerOptions, TxIndexerWorker, build_adapters};

#[derive(Parser)]
#[command(
    name = "autosign",
    version,
    about = "🔐 Autosign: policy scheduler, keysign coordinator and tx indexer"
)]
struct Cli {
    /// Config file (default: ~/.autosign/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler worker until interrupted
    Scheduler,
    /// Run the transaction indexer until interrupted
    TxIndexer,
    /// Apply database migrations and exit
    Migrate {
        /// Read migrations from this directory instead of the embedded set
        #[arg(long)]
        dir: Option<String>,
    },
    /// Sign a request file and print the signatures as JSON
    Keysign {
        /// JSON-encoded keysign request (session id and key left empty)
        #[arg(long)]
        request: String,
    },
    /// Task queue maintenance
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Archive abandoned leases and delete finished tasks past retention
    Purge,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn load_config(path: Option<&str>) -> Result<AutosignConfig> {
    let config = match path {
        Some(p) => AutosignConfig::load_from(&expand_path(p))?.with_env_overrides(),
        None => AutosignConfig::load()?,
    };
    config.validate()?;
    Ok(config)
}

fn init_logging(cfg: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { cfg.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},sqlx=warn,hyper=info,reqwest=info")));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if cfg.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Token cancelled on SIGINT/SIGTERM.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    spawn_signal_listener(token.clone());
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging, cli.verbose);

    match cli.command {
        Command::Scheduler => run_scheduler(&config).await,
        Command::TxIndexer => run_tx_indexer(&config).await,
        Command::Migrate { dir } => run_migrate(&config, dir.as_deref()).await,
        Command::Keysign { request } => run_keysign(&config, &expand_path(&request)).await,
        Command::Queue { action: QueueAction::Purge } => {
            let pool = autosign_db::connect(&config.database).await?;
            let purged = PgTaskQueue::new(pool).purge_expired().await?;
            println!("🧹 Purged {purged} task(s)");
            Ok(())
        }
    }
}

async fn run_scheduler(config: &AutosignConfig) -> Result<()> {
    let pool = autosign_db::connect(&config.database).await?;
    let schedules = Arc::new(PgSchedulerStore::new(pool.clone()));
    let policies = Arc::new(PgPolicyStore::new(pool.clone()));
    let queue: Arc<dyn TaskQueue> = Arc::new(PgTaskQueue::new(pool.clone()));

    let opts = SchedulerOptions::from_config(&config.scheduler, &config.task_queue);
    let mut worker = SchedulerWorker::new(schedules, policies, queue, opts);
    if config.scheduler.safety_gate {
        let gate: Arc<dyn SafetyGate> = Arc::new(PgSafetyGate::new(pool));
        worker = worker.with_safety_gate(gate);
    }

    worker.run(shutdown_token()).await;
    tracing::info!(
        "👋 Scheduler exited (last tick: {} due, {} stuck)",
        worker.gauges().due.get(),
        worker.gauges().stuck.get()
    );
    Ok(())
}

async fn run_tx_indexer(config: &AutosignConfig) -> Result<()> {
    let endpoints = config.tx_indexer.chain_endpoints()?;
    if endpoints.is_empty() {
        tracing::warn!("⚠️ No chains configured: every pending tx will be marked lost");
    }
    let rpcs = build_adapters(&endpoints)?;
    let pool = autosign_db::connect(&config.database).await?;
    let store = Arc::new(PgTxStore::new(pool));

    let worker = TxIndexerWorker::new(store, rpcs, TxIndexerOptions::from_config(&config.tx_indexer)?);
    worker.run(shutdown_token()).await;
    Ok(())
}

async fn run_migrate(config: &AutosignConfig, dir: Option<&str>) -> Result<()> {
    let runner = match dir {
        Some(d) => MigrationRunner::from_dir(&expand_path(d)).await?,
        None => MigrationRunner::embedded(),
    };
    for (version, description) in runner.versions() {
        tracing::debug!("migration {version}: {description}");
    }
    let pool = autosign_db::connect(&config.database).await?;
    runner.run(&pool).await?;
    Ok(())
}

async fn run_keysign(config: &AutosignConfig, request_path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(request_path)
        .with_context(|| format!("reading {}", request_path.display()))?;
    let request: KeysignRequest = serde_json::from_str(&raw).context("parsing keysign request")?;

    let ks = &config.keysign;
    if ks.relay_url.is_empty() {
        anyhow::bail!("keysign.relay_url is not configured");
    }

    let mut emitters: Vec<Arc<dyn Emitter>> = Vec::new();
    if let Some(verifier) = &ks.verifier {
        emitters.push(Arc::new(HttpEmitter::from_config(verifier)?));
    }
    if ks.plugin_queue {
        let pool = autosign_db::connect(&config.database).await?;
        let queue: Arc<dyn TaskQueue> = Arc::new(PgTaskQueue::new(pool));
        emitters.push(Arc::new(QueueEmitter::new(queue, &config.task_queue.keysign_queue)));
    }
    if emitters.is_empty() {
        tracing::warn!("⚠️ No emitters configured: parties must learn about the session elsewhere");
    }

    let relay = Arc::new(HttpRelay::new(&ks.relay_url)?);
    let signer = Signer::from_config(relay, emitters, ks);
    let signatures = signer.sign(&shutdown_token(), request).await?;
    println!("{}", serde_json::to_string_pretty(&signatures)?);
    Ok(())
}
