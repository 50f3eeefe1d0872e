//! Command-line interface definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// swell - run autonomous agent sprints against a board
#[derive(Debug, Parser)]
#[command(name = "sw", version, about)]
pub struct Cli {
    /// Config file path (defaults to .swell.yml then ~/.config/swell/swell.yml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the board until the critic accepts or a breaker trips
    Run {
        /// Board file (defaults to searching upward for .swell.yaml)
        #[arg(long)]
        board: Option<PathBuf>,

        /// Max concurrent agent attempts
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Hard cap on outer iterations
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Enable complexity-based per-attempt timeouts
        #[arg(long)]
        task_timeouts: bool,
    },

    /// Show board progress
    Status {
        #[arg(long)]
        board: Option<PathBuf>,
    },

    /// Show the wave plan for the remaining tasks
    Waves {
        #[arg(long)]
        board: Option<PathBuf>,
    },
}
