//! Event types for engine activity streaming
//!
//! These events are the outward-facing vocabulary of the engine: sprint and
//! wave planning, task lifecycle, kill/resize decisions, iteration verdicts.
//! Observers (dashboards, log sinks) subscribe via the bus; the engine never
//! waits for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Complexity;

/// Core event enum - everything observable about a run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A sprint (one scheduler drain) has started
    SprintStarted {
        total_tasks: usize,
        waves: Vec<Vec<String>>,
        tasks: Vec<TaskSummary>,
    },
    /// The wave plan derived from the dependency DAG
    WavePlanCreated { waves: Vec<Vec<String>> },
    /// A task attempt was admitted onto the pool
    TaskStarted {
        task_id: String,
        title: String,
        started_at: DateTime<Utc>,
    },
    /// One output line from a running attempt (may be rate-limited)
    TaskOutput { task_id: String, line: String },
    /// A task reached Completed
    TaskCompleted {
        task_id: String,
        artifacts: Vec<String>,
        actual_complexity: Option<Complexity>,
        completed_at: DateTime<Utc>,
    },
    /// The supervisor killed an attempt
    TaskKilled {
        task_id: String,
        reason: String,
        attempt: u32,
    },
    /// A task became Blocked
    TaskBlocked { task_id: String, reason: String },
    /// Re-estimation deliberation concluded
    ReEstimationDecided {
        task_id: String,
        from: Complexity,
        to: Complexity,
        consensus: bool,
    },
    /// The outer loop began iteration n
    IterationStarted { n: u32 },
    /// The critic ruled on a finished iteration
    CriticVerdict { success: bool, reasoning: String },
}

/// Compact task description carried by SprintStarted
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    pub dependencies: Vec<String>,
    pub status: String,
}

impl EngineEvent {
    /// Event type name for logging and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SprintStarted { .. } => "sprint_started",
            Self::WavePlanCreated { .. } => "wave_plan_created",
            Self::TaskStarted { .. } => "task_started",
            Self::TaskOutput { .. } => "task_output",
            Self::TaskCompleted { .. } => "task_completed",
            Self::TaskKilled { .. } => "task_killed",
            Self::TaskBlocked { .. } => "task_blocked",
            Self::ReEstimationDecided { .. } => "re_estimation_decided",
            Self::IterationStarted { .. } => "iteration_started",
            Self::CriticVerdict { .. } => "critic_verdict",
        }
    }

    /// Task id this event concerns, if any
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskStarted { task_id, .. }
            | Self::TaskOutput { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskKilled { task_id, .. }
            | Self::TaskBlocked { task_id, .. }
            | Self::ReEstimationDecided { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}
