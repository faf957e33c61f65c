//! Run conversation turns through the tether orchestrator.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable unless
//! `--dry-run` is given.
//!
//! # Examples
//!
//! ```sh
//! # One-shot
//! tether --prompt "Why does src/auth/login.rs return 500?"
//!
//! # Interactive REPL with a tighter budget and background monitoring
//! tether --fixed-threshold 2000 --monitor-interval-secs 5
//!
//! # Offline: inspect intent and plan without calling the API
//! tether --dry-run --verbose --prompt "refactor the parser module"
//!
//! # Persist extracted knowledge between sessions
//! tether --knowledge-file .tether/knowledge.json
//! ```

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex};
use tether_rs::agent::{LoggingHandler, Orchestrator, OrchestratorConfig, TurnOutcome};
use tether_rs::api::{ReplyClient, ReplyFuture};
use tether_rs::context::knowledge::{KnowledgeStore, SharedKnowledgeStore};
use tether_rs::tools::ToolSet;
use tether_rs::{Message, MessageRole, OpenRouterClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Context budget manager and predictive tool orchestration for LLM turns.
#[derive(Parser)]
#[command(name = "tether")]
struct Cli {
    // ── Input ──────────────────────────────────────────────────
    /// Run a single turn and exit. Without it, read turns from stdin.
    #[arg(long)]
    prompt: Option<String>,

    // ── Model and workspace ────────────────────────────────────
    /// Model identifier (also selects the context limit)
    #[arg(long)]
    model: Option<String>,

    /// Root directory for the built-in file and shell tools
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    // ── Budget ─────────────────────────────────────────────────
    /// Reduce when the estimated token count exceeds this
    #[arg(long)]
    fixed_threshold: Option<usize>,

    /// Reduce when usage reaches this fraction of the model limit
    #[arg(long)]
    percent_threshold: Option<f64>,

    /// Use the aggressive reduction policy
    #[arg(long)]
    aggressive: bool,

    /// Check the budget in the background every N seconds
    #[arg(long)]
    monitor_interval_secs: Option<u64>,

    // ── Execution ──────────────────────────────────────────────
    /// Allow planned steps that write files or run shell commands
    #[arg(long)]
    allow_mutations: bool,

    /// Load and save the knowledge store from this JSON file
    #[arg(long)]
    knowledge_file: Option<PathBuf>,

    /// Do not call the API; reply with a summary of the turn context
    #[arg(long)]
    dry_run: bool,

    /// Debug logging and per-turn plan output on stderr
    #[arg(long)]
    verbose: bool,
}

// ── Offline client ─────────────────────────────────────────────────

/// Reply client for `--dry-run`: describes what a real call would receive.
struct OfflineClient {
    model: String,
}

impl ReplyClient for OfflineClient {
    fn generate<'a>(&'a self, messages: &'a [Message], user_text: &'a str) -> ReplyFuture<'a> {
        Box::pin(async move {
            let tool_results = messages
                .iter()
                .filter(|m| m.role == MessageRole::Tool)
                .count();
            let tokens = tether_rs::context::budget::estimate_tokens(messages);
            Ok(format!(
                "[dry run] {} would answer \"{user_text}\" with {} messages (~{tokens} tokens, {tool_results} tool results) in context",
                self.model,
                messages.len()
            ))
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ── Setup ──────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let default = if verbose { "tether_rs=debug" } else { "tether_rs=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(cli: &Cli) -> Result<OrchestratorConfig, String> {
    let mut config = match &cli.config {
        Some(path) => OrchestratorConfig::from_json_file(path)
            .map_err(|e| format!("failed to load config '{}': {e}", path.display()))?,
        None => OrchestratorConfig::default(),
    };
    if let Some(model) = &cli.model {
        config = config.with_model(model);
    }
    if let Some(threshold) = cli.fixed_threshold {
        config = config.with_fixed_token_threshold(threshold);
    }
    if let Some(threshold) = cli.percent_threshold {
        config = config.with_percentage_threshold(threshold);
    }
    if cli.aggressive {
        config = config.with_aggressive_reduction(true);
    }
    if let Some(secs) = cli.monitor_interval_secs {
        config = config.with_monitor_interval(secs);
    }
    if cli.allow_mutations {
        config = config.with_allow_mutating_steps(true);
    }
    Ok(config)
}

fn load_knowledge(path: &Path, max_entries: usize) -> Result<SharedKnowledgeStore, String> {
    let store = if path.exists() {
        KnowledgeStore::load_json(path, max_entries)
            .map_err(|e| format!("failed to load knowledge '{}': {e}", path.display()))?
    } else {
        KnowledgeStore::new(max_entries)
    };
    info!("Knowledge store: {} entries from {}", store.len(), path.display());
    Ok(Arc::new(Mutex::new(store)))
}

fn save_knowledge(path: &Path, store: &SharedKnowledgeStore) {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!("Failed to create {}: {e}", parent.display());
        return;
    }
    let store = store.lock().unwrap_or_else(|e| e.into_inner());
    match store.save_json(path) {
        Ok(()) => info!("Saved {} knowledge entries to {}", store.len(), path.display()),
        Err(e) => warn!("Failed to save knowledge to {}: {e}", path.display()),
    }
}

// ── Turns ──────────────────────────────────────────────────────────

/// Run one turn; Ctrl-C cancels any tool step in flight.
async fn run_turn(orchestrator: &mut Orchestrator<'_>, text: &str) -> Result<TurnOutcome, String> {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let result = orchestrator.handle_turn(text, &cancel).await;
    interrupt.abort();
    result
}

fn print_outcome(outcome: &TurnOutcome, verbose: bool) {
    if verbose {
        if let Some(plan) = &outcome.plan {
            eprintln!("  plan: {}", plan.summary());
        }
        if let Some(report) = &outcome.execution {
            eprintln!("  executed: {}", report.to_log_string());
        }
        if let Some(stats) = &outcome.reduction {
            eprintln!("  reduced: {}", stats.to_log_string());
        }
    }
    println!("{}", outcome.reply);
}

async fn repl(orchestrator: &mut Orchestrator<'_>, verbose: bool) -> Result<(), String> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("tether: one turn per line, Ctrl-D to exit");
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| format!("failed to read stdin: {e}"))?
    {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        match run_turn(orchestrator, text).await {
            Ok(outcome) => print_outcome(&outcome, verbose),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = build_config(&cli)?;
    let workdir = cli.workdir.to_string_lossy().into_owned();
    let tools = ToolSet::new().with_common_tools(workdir);

    let client: Box<dyn ReplyClient> = if cli.dry_run {
        Box::new(OfflineClient {
            model: config.model.clone(),
        })
    } else {
        let api_key = std::env::var("OPENROUTER_KEY")
            .map_err(|_| "OPENROUTER_KEY environment variable is not set".to_string())?;
        Box::new(OpenRouterClient::new(api_key)?.with_model(config.model.clone()))
    };

    let knowledge = match &cli.knowledge_file {
        Some(path) => Some(load_knowledge(path, config.context.max_knowledge_entries)?),
        None => None,
    };

    let mut orchestrator = Orchestrator::new(client.as_ref(), &tools, config)
        .map_err(|e| format!("invalid configuration: {e}"))?
        .with_event_handler(&LoggingHandler);
    if let Some(store) = knowledge {
        orchestrator = orchestrator.with_knowledge_store(store);
    }

    let result = match &cli.prompt {
        Some(prompt) => run_turn(&mut orchestrator, prompt)
            .await
            .map(|outcome| print_outcome(&outcome, cli.verbose)),
        None => repl(&mut orchestrator, cli.verbose).await,
    };

    orchestrator.shutdown().await;
    if let Some(path) = &cli.knowledge_file {
        save_knowledge(path, &orchestrator.knowledge());
    }
    result
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
