//! swell CLI entry point

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use swell::cli::{Cli, Command};
use swell::config::Config;
use swell::domain::TaskStatus;
use swell::events::create_event_bus;
use swell::llm::create_provider;
use swell::planning::SinglePassPlanner;
use swell::probe::ProcProbe;
use swell::progress::NoopSink;
use swell::prompts::PromptBuilder;
use swell::r#loop::{IterationEngine, LoopConfig, LoopOutcome};
use swell::scheduler::{Scheduler, SchedulerConfig, compute_waves};
use swell::store::BoardStore;
use swell::supervisor::{Supervisor, SupervisorConfig};

fn setup_logging(cli_level: Option<&str>, config_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("swell")
        .join("logs");
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = match cli_level.or(config_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some("INFO") | None => tracing::Level::INFO,
        Some(other) => {
            eprintln!("Warning: unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(log_dir.join("swell.log")).context("Failed to create log file")?;
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
    Ok(())
}

fn open_store(board: Option<PathBuf>) -> BoardStore {
    match board {
        Some(path) => BoardStore::new(path),
        None => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            BoardStore::discover(&cwd)
        }
    }
}

async fn cmd_run(
    config: Config,
    board_path: Option<PathBuf>,
    max_parallel: Option<usize>,
    max_iterations: Option<u32>,
    task_timeouts: bool,
) -> Result<()> {
    let store = open_store(board_path);
    let mut board = store
        .load()
        .await
        .with_context(|| format!("No board found at {}", store.path().display()))?;
    if task_timeouts {
        board.use_default_timeouts = true;
    }

    let provider = create_provider(&config.llm)?;
    let prompts = Arc::new(PromptBuilder::new());
    let events = create_event_bus();
    let (cancel_tx, cancel_rx) = watch::channel(false);

    // Ctrl-C cancels every running attempt, then the loop winds down
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling running attempts");
            let _ = cancel_tx.send(true);
        }
    });

    let runner = Arc::new(Supervisor::new(
        SupervisorConfig::default(),
        provider.clone(),
        Arc::new(ProcProbe),
        prompts.clone(),
        Arc::new(NoopSink),
        events.clone(),
        cancel_rx,
    ));
    let scheduler = Scheduler::new(
        SchedulerConfig {
            max_parallel: max_parallel.unwrap_or(config.engine.max_parallel),
            ..SchedulerConfig::default()
        },
        runner,
        provider.clone(),
        prompts.clone(),
        store.clone(),
        events.clone(),
    );
    let planner = Arc::new(SinglePassPlanner::new(provider.clone(), prompts.clone()));
    let engine = IterationEngine::new(
        LoopConfig {
            max_iterations: max_iterations.or(config.engine.max_iterations),
            cleanup_pass: config.engine.cleanup_pass,
            ..LoopConfig::default()
        },
        scheduler,
        provider,
        prompts,
        planner,
        store,
        events,
    );

    info!(goal = %board.goal, tasks = board.tasks.len(), "starting run");
    let board = Arc::new(Mutex::new(board));
    let outcome = engine.run(board.clone()).await?;

    let b = board.lock().await;
    let progress = b.progress();
    match outcome {
        LoopOutcome::GoalAchieved { iterations } => {
            println!(
                "Goal achieved in {} iteration(s): {}/{} tasks completed",
                iterations, progress.completed, progress.total
            );
        }
        LoopOutcome::MaxIterationsReached { iterations } => {
            println!(
                "Stopped at the {}-iteration cap: {}/{} tasks completed, {} blocked",
                iterations, progress.completed, progress.total, progress.blocked
            );
        }
        LoopOutcome::GoalLoopDetected { goal } => {
            println!("Aborted: goal '{}' appears impossible with this approach", goal);
        }
    }
    Ok(())
}

async fn cmd_status(board_path: Option<PathBuf>) -> Result<()> {
    let store = open_store(board_path);
    let board = store.load().await?;
    let progress = board.progress();

    println!("board: {}", board.id);
    println!("goal: {}", board.goal);
    println!("mode: {} | iteration: {}", board.mode, board.iteration);
    println!(
        "tasks: {} total, {} completed, {} in progress, {} blocked",
        progress.total, progress.completed, progress.in_progress, progress.blocked
    );
    for task in &board.tasks {
        let extra = match task.status {
            TaskStatus::Blocked => format!(" ({})", task.blocked_reason),
            _ if task.kill_count > 0 => format!(" (killed {}x)", task.kill_count),
            _ => String::new(),
        };
        println!("  [{}] {} - {}{}", task.status, task.id, task.title, extra);
    }
    Ok(())
}

async fn cmd_waves(board_path: Option<PathBuf>) -> Result<()> {
    let store = open_store(board_path);
    let board = store.load().await?;

    let completed: HashSet<String> = board.completed_ids();
    let pending: Vec<&swell::domain::Task> = board.tasks.iter().filter(|t| !t.is_terminal()).collect();
    let plan = compute_waves(&pending, &completed);

    if plan.waves.is_empty() {
        println!("no runnable waves");
    }
    for (i, wave) in plan.waves.iter().enumerate() {
        println!("wave {}: {}", i + 1, wave.join(", "));
    }
    if !plan.unreachable.is_empty() {
        println!("unreachable (circular or dangling deps): {}", plan.unreachable.join(", "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref())?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref())?;

    match cli.command {
        Command::Run {
            board,
            max_parallel,
            max_iterations,
            task_timeouts,
        } => cmd_run(config, board, max_parallel, max_iterations, task_timeouts).await,
        Command::Status { board } => cmd_status(board).await,
        Command::Waves { board } => cmd_waves(board).await,
    }
}
