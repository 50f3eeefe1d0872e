//! Board domain type
//!
//! The Board is the full unit of work for one iteration: the user goal, its
//! context, the task DAG and the planning metadata. It works for both Sprint
//! mode (upfront planning, locked scope) and Kanban mode (continuous flow
//! under a WIP limit).
//!
//! Ownership: the iteration loop owns the Board; the scheduler holds it
//! behind a single mutex for the duration of one iteration. Everything in
//! here is plain data plus queries - no locking.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::id::generate_id;
use super::record::CriticRecord;
use super::task::{Task, TaskStatus};

/// Operating mode for a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Upfront planning, locked scope, commitment
    #[default]
    Sprint,
    /// Continuous flow, WIP limits, flexible scope
    Kanban,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sprint => write!(f, "sprint"),
            Self::Kanban => write!(f, "kanban"),
        }
    }
}

/// Sprint-mode configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SprintConfig {
    /// Once true, task additions are tracked as scope changes unless forced
    pub scope_locked: bool,
    /// Scope creep log
    pub scope_changes: Vec<String>,
}

/// Kanban-mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KanbanConfig {
    /// Max tasks in progress at once
    pub wip_limit: usize,
}

impl Default for KanbanConfig {
    fn default() -> Self {
        Self { wip_limit: 2 }
    }
}

/// Per-persona estimate accounting across iterations
///
/// Consumed by thrashing detection: a persona whose wrong estimates outnumber
/// accurate ones (with enough data points) is a thrashing signal.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PersonaStats {
    pub estimates_given: u32,
    pub estimates_accurate: u32,
    /// Underestimated (actual came in above the estimate)
    pub estimates_low: u32,
    /// Overestimated
    pub estimates_high: u32,
}

impl PersonaStats {
    /// Wrong estimates in either direction
    pub fn estimates_wrong(&self) -> u32 {
        self.estimates_low + self.estimates_high
    }
}

/// Accept both the list form `validate_steps: [a, b]` and the legacy
/// single-string form `validate_cmd: a`.
fn de_validate_steps<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Steps {
        One(String),
        Many(Vec<String>),
    }

    match Option::<Steps>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(Steps::One(s)) => Ok(vec![s]),
        Some(Steps::Many(v)) => Ok(v),
    }
}

/// Aggregate progress numbers for observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardProgress {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub blocked: usize,
}

/// The main container - goal, context, tasks and planning metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: String,

    /// What the user asked for (rewritten by the critic between iterations)
    pub goal: String,

    /// Accumulated context, grows across iterations
    #[serde(default)]
    pub context: String,

    #[serde(default)]
    pub mode: Mode,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    // Planning artifacts
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub out_of_scope: Vec<String>,
    #[serde(default)]
    pub definition_of_done: Vec<String>,

    /// Binding technical contract injected into every Implementation
    /// attempt. Empty means no contract was generated.
    #[serde(default)]
    pub architecture_contract: String,

    /// Deviations found by wave integration checks, append-only
    #[serde(default)]
    pub integration_notes: String,

    /// Shell commands run after the scheduler drains; output feeds the
    /// critic. Legacy boards carry a single `validate_cmd` string instead.
    #[serde(default, alias = "validate_cmd", deserialize_with = "de_validate_steps")]
    pub validate_steps: Vec<String>,

    /// Iteration counter, bumped by the outer loop
    #[serde(default)]
    pub iteration: u32,

    #[serde(default)]
    pub verdict_history: Vec<CriticRecord>,

    #[serde(default)]
    pub sprint: SprintConfig,

    #[serde(default)]
    pub kanban: KanbanConfig,

    #[serde(default)]
    pub persona_stats: HashMap<String, PersonaStats>,

    /// Explicit per-attempt timeout in seconds, overrides the defaults
    #[serde(default)]
    pub task_timeout: Option<u64>,

    /// Opt into complexity-based default timeouts
    #[serde(default)]
    pub use_default_timeouts: bool,

    #[serde(default)]
    pub retro_notes: String,

    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Board {
    /// Create an empty board for a goal
    pub fn new(goal: impl Into<String>, context: impl Into<String>, mode: Mode) -> Self {
        let goal = goal.into();
        Self {
            id: generate_id(&goal),
            goal,
            context: context.into(),
            mode,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            risks: Vec::new(),
            assumptions: Vec::new(),
            out_of_scope: Vec::new(),
            definition_of_done: Vec::new(),
            architecture_contract: String::new(),
            integration_notes: String::new(),
            validate_steps: Vec::new(),
            iteration: 0,
            verdict_history: Vec::new(),
            sprint: SprintConfig::default(),
            kanban: KanbanConfig::default(),
            persona_stats: HashMap::new(),
            task_timeout: None,
            use_default_timeouts: false,
            retro_notes: String::new(),
            tasks: Vec::new(),
        }
    }

    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Ids of all completed tasks
    pub fn completed_ids(&self) -> HashSet<String> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id.clone())
            .collect()
    }

    /// Tasks eligible for admission: waiting state and every dependency
    /// completed. Insertion order is preserved; the scheduler applies the
    /// priority tie-break.
    pub fn eligible_tasks(&self) -> Vec<&Task> {
        let completed = self.completed_ids();
        self.tasks
            .iter()
            .filter(|t| t.is_admittable() && t.dependencies.iter().all(|d| completed.contains(d)))
            .collect()
    }

    pub fn in_progress_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.status == TaskStatus::InProgress).count()
    }

    /// Add a task. In Sprint mode with locked scope this is tracked as a
    /// scope change unless forced.
    pub fn add_task(&mut self, mut task: Task, force: bool) {
        if self.mode == Mode::Sprint && self.sprint.scope_locked && !force {
            self.sprint
                .scope_changes
                .push(format!("Added: {} - {}", task.id, task.title));
            task.notes.push_str(" [SCOPE CHANGE]");
        }
        self.tasks.push(task);
    }

    /// Sprint mode: lock the scope and move backlog items to Planned
    pub fn lock_scope(&mut self) {
        if self.mode != Mode::Sprint {
            return;
        }
        self.sprint.scope_locked = true;
        self.started_at = Some(Utc::now());
        for task in &mut self.tasks {
            if task.status == TaskStatus::Backlog {
                task.status = TaskStatus::Planned;
            }
        }
    }

    /// Reset every non-terminal task to Backlog for the next iteration
    pub fn reset_non_terminal(&mut self) {
        for task in &mut self.tasks {
            if !task.is_terminal() {
                task.reset_for_retry();
            }
        }
    }

    pub fn progress(&self) -> BoardProgress {
        let mut p = BoardProgress {
            total: self.tasks.len(),
            completed: 0,
            in_progress: 0,
            blocked: 0,
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Completed => p.completed += 1,
                TaskStatus::InProgress => p.in_progress += 1,
                TaskStatus::Blocked => p.blocked += 1,
                _ => {}
            }
        }
        p
    }

    /// Completed fraction of all tasks, 0.0 when empty
    pub fn completion_ratio(&self) -> f64 {
        if self.tasks.is_empty() {
            return 0.0;
        }
        let completed = self.tasks.iter().filter(|t| t.status == TaskStatus::Completed).count();
        completed as f64 / self.tasks.len() as f64
    }
}
