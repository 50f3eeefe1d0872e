//! Wave scheduler
//!
//! Derives parallel execution frontiers from the task DAG and pumps ready
//! work onto a bounded pool of supervised attempts.

mod core;
pub mod integration;
mod waves;

pub use core::{
    ACTIVITY_RESIZE_THRESHOLD, KILL_CAP, SILENCE_RESIZE_THRESHOLD, Scheduler, SchedulerConfig, SprintOutcome, snapshot,
};
pub use waves::{WavePlan, compute_waves};
