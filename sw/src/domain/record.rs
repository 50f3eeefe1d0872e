//! Records appended to the board as the engine works
//!
//! ResurrectionRecord captures one failed attempt at a task. CriticRecord
//! captures one critic verdict. Both are immutable once appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record of a previous killed attempt at a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResurrectionRecord {
    /// Attempt number (equals the kill count when appended)
    pub attempt: u32,

    /// Persona that ran the attempt
    pub persona: String,

    /// Why the supervisor killed it
    pub kill_reason: String,

    /// Whatever notes existed at the moment of death, truncated
    pub partial_notes: String,

    pub killed_at: DateTime<Utc>,

    /// Wall time from attempt start to kill
    pub elapsed_seconds: i64,
}

impl ResurrectionRecord {
    pub fn new(
        attempt: u32,
        persona: impl Into<String>,
        kill_reason: impl Into<String>,
        partial_notes: impl Into<String>,
        elapsed_seconds: i64,
    ) -> Self {
        Self {
            attempt,
            persona: persona.into(),
            kill_reason: kill_reason.into(),
            partial_notes: partial_notes.into(),
            killed_at: Utc::now(),
            elapsed_seconds,
        }
    }
}

/// Lightweight record of one critic verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticRecord {
    pub iteration: u32,
    pub success: bool,
    /// Reasoning trimmed to a sentence or two for the board document
    pub reasoning: String,
}
