//! Task domain type
//!
//! A Task is the unit of work on a board: one single-shot agent invocation,
//! either an Implementation (build something) or a Spike (investigate
//! something). The scheduler owns all status transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::ResurrectionRecord;

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet committed to the current iteration
    #[default]
    Backlog,
    /// Committed to the sprint scope
    Planned,
    /// Dependencies met, ready to pull
    Ready,
    /// Currently held by a supervisor
    InProgress,
    /// Done, awaiting verification
    InReview,
    /// Cannot proceed; see blocked_reason
    Blocked,
    /// Done and verified (terminal)
    Completed,
    /// Won't do (terminal)
    Skipped,
}

impl TaskStatus {
    /// Terminal statuses never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backlog => write!(f, "backlog"),
            Self::Planned => write!(f, "planned"),
            Self::Ready => write!(f, "ready"),
            Self::InProgress => write!(f, "in_progress"),
            Self::InReview => write!(f, "in_review"),
            Self::Blocked => write!(f, "blocked"),
            Self::Completed => write!(f, "completed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Estimated (or actual) task complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Single file, obvious change
    Trivial,
    /// A couple of files, straightforward
    Small,
    /// Multiple files, some thinking
    Medium,
    /// Significant changes, risks
    Large,
    /// Needs investigation first
    #[default]
    Unknown,
}

impl Complexity {
    /// Ordering rank for accuracy comparisons. Unknown has no rank.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::Trivial => Some(0),
            Self::Small => Some(1),
            Self::Medium => Some(2),
            Self::Large => Some(3),
            Self::Unknown => None,
        }
    }

    /// Parse a lowercase complexity name. Unknown strings yield None.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trivial" => Some(Self::Trivial),
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" => Some(Self::Large),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trivial => write!(f, "trivial"),
            Self::Small => write!(f, "small"),
            Self::Medium => write!(f, "medium"),
            Self::Large => write!(f, "large"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Task priority for admission ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Do first, blocks everything
    Critical,
    /// Important, do soon
    High,
    /// Normal priority
    #[default]
    Medium,
    /// Nice to have
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// What kind of work a task is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Build/code/create something
    #[default]
    Implementation,
    /// Investigate/research/answer a question
    Spike,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Implementation => write!(f, "implementation"),
            Self::Spike => write!(f, "spike"),
        }
    }
}

/// One executable step of the plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier, unique within the board
    pub id: String,

    /// Short human-readable title
    pub title: String,

    /// Full description of the work
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub complexity: Complexity,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default)]
    pub kind: TaskKind,

    /// Ordered acceptance criteria
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,

    /// File paths touched by the completed attempt
    #[serde(default)]
    pub artifacts: Vec<String>,

    /// Ids of tasks this task waits on
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub blocked_reason: String,

    /// Freeform notes; resurrection adjustments are prefixed here
    #[serde(default)]
    pub notes: String,

    /// Persona name that owns this task, empty if unassigned
    #[serde(default)]
    pub assigned_to: String,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// Set when transitioning to Completed
    #[serde(default)]
    pub actual_complexity: Option<Complexity>,

    /// completed_at - started_at, seconds
    #[serde(default)]
    pub cycle_time_seconds: Option<i64>,

    /// How many times a supervisor has killed this task
    #[serde(default)]
    pub kill_count: u32,

    /// One record per kill, append-only
    #[serde(default)]
    pub resurrection_history: Vec<ResurrectionRecord>,
}

impl Task {
    /// Create a task with defaults for everything but identity
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            complexity: Complexity::Unknown,
            priority: Priority::Medium,
            status: TaskStatus::Backlog,
            kind: TaskKind::Implementation,
            acceptance_criteria: Vec::new(),
            artifacts: Vec::new(),
            dependencies: Vec::new(),
            blocked_reason: String::new(),
            notes: String::new(),
            assigned_to: String::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            actual_complexity: None,
            cycle_time_seconds: None,
            kill_count: 0,
            resurrection_history: Vec::new(),
        }
    }

    /// Builder: set dependencies
    pub fn with_deps(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Builder: set priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: set kind
    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    /// Builder: set estimated complexity
    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }

    /// Transition to InProgress and stamp the start time
    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    /// Transition to Blocked with a reason
    pub fn block(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Blocked;
        self.blocked_reason = reason.into();
    }

    /// Transition to Completed, recording artifacts, actual complexity
    /// and cycle time
    pub fn complete(&mut self, artifacts: Vec<String>, actual: Option<Complexity>) {
        self.status = TaskStatus::Completed;
        let now = Utc::now();
        self.completed_at = Some(now);
        if !artifacts.is_empty() {
            self.artifacts = artifacts;
        }
        if let Some(actual) = actual {
            self.actual_complexity = Some(actual);
        }
        if let Some(started) = self.started_at {
            self.cycle_time_seconds = Some((now - started).num_seconds());
        }
    }

    /// Reset to Backlog for another attempt, clearing the start stamp but
    /// keeping kill accounting
    pub fn reset_for_retry(&mut self) {
        self.status = TaskStatus::Backlog;
        self.started_at = None;
    }

    /// Record a kill: bump the count and append the corpse. The invariant
    /// kill_count == resurrection_history.len() is maintained here and only
    /// here.
    pub fn record_kill(&mut self, record: ResurrectionRecord) {
        self.kill_count += 1;
        self.resurrection_history.push(record);
        debug_assert_eq!(self.kill_count as usize, self.resurrection_history.len());
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// A task may be admitted once it sits in one of the waiting states
    pub fn is_admittable(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Backlog | TaskStatus::Planned | TaskStatus::Ready
        )
    }
}
