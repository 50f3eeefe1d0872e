//! Prompt construction
//!
//! Typed builders over handlebars templates. The builder prepares the data
//! (truncation, joining, filtering) so templates stay formatting-only.

pub mod embedded;

use eyre::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;

use crate::domain::{Board, ResurrectionRecord, Task, TaskKind, TaskStatus};
use crate::probe::ProbeStatus;

/// Notes longer than this are trimmed in prompt context sections
const SPIKE_NOTES_LIMIT: usize = 3000;
const NOTES_LIMIT: usize = 1500;

/// Renders every engine prompt from embedded templates
pub struct PromptBuilder {
    handlebars: Handlebars<'static>,
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() > limit {
        let mut cut = limit;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &s[..cut])
    } else {
        s.to_string()
    }
}

#[derive(Serialize)]
struct DependencyFinding {
    id: String,
    title: String,
    kind: String,
    notes: String,
    artifacts: String,
}

#[derive(Serialize)]
struct RecordCtx {
    attempt: u32,
    persona: String,
    kill_reason: String,
    partial_notes: String,
    elapsed_seconds: i64,
}

impl From<&ResurrectionRecord> for RecordCtx {
    fn from(r: &ResurrectionRecord) -> Self {
        Self {
            attempt: r.attempt,
            persona: r.persona.clone(),
            kill_reason: r.kill_reason.clone(),
            partial_notes: truncate(&r.partial_notes, 200),
            elapsed_seconds: r.elapsed_seconds,
        }
    }
}

#[derive(Serialize)]
struct TaskLine {
    id: String,
    title: String,
    kind: String,
    status: String,
    description: String,
    dependencies: String,
    artifacts: String,
    notes: String,
    blocked_reason: String,
}

impl From<&Task> for TaskLine {
    fn from(t: &Task) -> Self {
        Self {
            id: t.id.clone(),
            title: t.title.clone(),
            kind: t.kind.to_string().to_uppercase(),
            status: t.status.to_string(),
            description: truncate(&t.description, 200),
            dependencies: t.dependencies.join(", "),
            artifacts: t.artifacts.join(", "),
            notes: truncate(&t.notes, 300),
            blocked_reason: t.blocked_reason.clone(),
        }
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        for (name, body) in embedded::all() {
            // Embedded templates are validated by tests; a bad one is a
            // build defect, not a runtime condition
            handlebars
                .register_template_string(name, body)
                .unwrap_or_else(|e| panic!("invalid embedded template {}: {}", name, e));
        }
        Self { handlebars }
    }

    fn render<T: Serialize>(&self, name: &str, ctx: &T) -> Result<String> {
        self.handlebars
            .render(name, ctx)
            .with_context(|| format!("Failed to render template {}", name))
    }

    /// System prompt for one task attempt
    pub fn task_system(&self, board: &Board, task: &Task) -> Result<String> {
        let dependency_findings: Vec<DependencyFinding> = task
            .dependencies
            .iter()
            .filter_map(|dep_id| board.get_task(dep_id))
            .filter(|dep| dep.status == TaskStatus::Completed)
            .map(|dep| {
                let limit = if dep.kind == TaskKind::Spike {
                    SPIKE_NOTES_LIMIT
                } else {
                    NOTES_LIMIT
                };
                DependencyFinding {
                    id: dep.id.clone(),
                    title: dep.title.clone(),
                    kind: dep.kind.to_string(),
                    notes: truncate(&dep.notes, limit),
                    artifacts: dep.artifacts.join(", "),
                }
            })
            .collect();

        // The contract binds Implementation tasks; spikes explore freely
        let contract = if task.kind == TaskKind::Implementation {
            board.architecture_contract.clone()
        } else {
            String::new()
        };

        let resurrections: Vec<RecordCtx> = task
            .resurrection_history
            .iter()
            .rev()
            .take(3)
            .rev()
            .map(RecordCtx::from)
            .collect();

        #[derive(Serialize)]
        struct Ctx {
            persona: String,
            goal: String,
            context: String,
            mode: String,
            risks: String,
            assumptions: String,
            contract: String,
            integration_notes: String,
            dependency_findings: Vec<DependencyFinding>,
            resurrections: Vec<RecordCtx>,
            kill_count: u32,
        }

        self.render(
            "task_system",
            &Ctx {
                persona: if task.assigned_to.is_empty() {
                    "Agent".to_string()
                } else {
                    task.assigned_to.clone()
                },
                goal: board.goal.clone(),
                context: board.context.clone(),
                mode: board.mode.to_string().to_uppercase(),
                risks: if board.risks.is_empty() {
                    "None".to_string()
                } else {
                    board.risks.join(", ")
                },
                assumptions: if board.assumptions.is_empty() {
                    "None".to_string()
                } else {
                    board.assumptions.join(", ")
                },
                contract,
                integration_notes: board.integration_notes.clone(),
                dependency_findings,
                resurrections,
                kill_count: task.kill_count,
            },
        )
    }

    /// User prompt (the task body) for one attempt
    pub fn task(&self, task: &Task) -> Result<String> {
        #[derive(Serialize)]
        struct Ctx {
            id: String,
            title: String,
            kind: String,
            complexity: String,
            description: String,
            acceptance_criteria: Vec<String>,
            notes: String,
            is_spike: bool,
        }

        self.render(
            "task",
            &Ctx {
                id: task.id.clone(),
                title: task.title.clone(),
                kind: task.kind.to_string(),
                complexity: task.complexity.to_string(),
                description: task.description.clone(),
                acceptance_criteria: task.acceptance_criteria.clone(),
                notes: task.notes.clone(),
                is_spike: task.kind == TaskKind::Spike,
            },
        )
    }

    pub fn negotiation_agent(&self, task: &Task, kill_reason: &str, rejections: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Ctx {
            title: String,
            kill_reason: String,
            history: Vec<RecordCtx>,
            rejections: String,
        }

        self.render(
            "negotiation_agent",
            &Ctx {
                title: task.title.clone(),
                kill_reason: kill_reason.to_string(),
                history: task
                    .resurrection_history
                    .iter()
                    .rev()
                    .take(3)
                    .rev()
                    .map(RecordCtx::from)
                    .collect(),
                rejections: rejections.to_string(),
            },
        )
    }

    pub fn negotiation_guardian(&self, task: &Task, kill_reason: &str, proposal: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Ctx {
            title: String,
            persona: String,
            kill_reason: String,
            proposal: String,
            history: Vec<RecordCtx>,
        }

        self.render(
            "negotiation_guardian",
            &Ctx {
                title: task.title.clone(),
                persona: if task.assigned_to.is_empty() {
                    "Agent".to_string()
                } else {
                    task.assigned_to.clone()
                },
                kill_reason: kill_reason.to_string(),
                proposal: proposal.to_string(),
                history: task
                    .resurrection_history
                    .iter()
                    .rev()
                    .take(3)
                    .rev()
                    .map(RecordCtx::from)
                    .collect(),
            },
        )
    }

    pub fn resize(&self, task: &Task, last: &ResurrectionRecord) -> Result<String> {
        #[derive(Serialize)]
        struct Ctx {
            id: String,
            title: String,
            complexity: String,
            persona: String,
            elapsed_seconds: i64,
            kill_reason: String,
            partial_notes: String,
            history: Vec<RecordCtx>,
        }

        self.render(
            "resize",
            &Ctx {
                id: task.id.clone(),
                title: task.title.clone(),
                complexity: task.complexity.to_string(),
                persona: last.persona.clone(),
                elapsed_seconds: last.elapsed_seconds,
                kill_reason: last.kill_reason.clone(),
                partial_notes: truncate(&last.partial_notes, 200),
                history: task.resurrection_history.iter().map(RecordCtx::from).collect(),
            },
        )
    }

    pub fn contract(&self, board: &Board) -> Result<String> {
        #[derive(Serialize)]
        struct Ctx {
            goal: String,
            context: String,
            tasks: Vec<TaskLine>,
        }

        self.render(
            "contract",
            &Ctx {
                goal: board.goal.clone(),
                context: if board.context.is_empty() {
                    "None".to_string()
                } else {
                    board.context.clone()
                },
                tasks: board.tasks.iter().map(TaskLine::from).collect(),
            },
        )
    }

    pub fn integration_check(&self, contract: &str, impl_tasks: &[&Task], files_section: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Ctx {
            contract: String,
            tasks: Vec<TaskLine>,
            files_section: String,
        }

        self.render(
            "integration_check",
            &Ctx {
                contract: contract.to_string(),
                tasks: impl_tasks.iter().map(|t| TaskLine::from(*t)).collect(),
                files_section: files_section.to_string(),
            },
        )
    }

    pub fn critic(&self, board: &Board, validation_summary: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Ctx {
            goal: String,
            context: String,
            tasks: Vec<TaskLine>,
            definition_of_done: Vec<String>,
            validation_summary: String,
        }

        self.render(
            "critic",
            &Ctx {
                goal: board.goal.clone(),
                context: board.context.clone(),
                tasks: board.tasks.iter().map(TaskLine::from).collect(),
                definition_of_done: board.definition_of_done.clone(),
                validation_summary: validation_summary.to_string(),
            },
        )
    }

    pub fn cleanup(&self, board: &Board) -> Result<String> {
        #[derive(Serialize)]
        struct Ctx {
            goal: String,
            tasks: Vec<TaskLine>,
        }

        self.render(
            "cleanup",
            &Ctx {
                goal: board.goal.clone(),
                tasks: board
                    .tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::Completed)
                    .map(TaskLine::from)
                    .collect(),
            },
        )
    }

    /// Rule-7 fallback: ask the LLM to judge an ambiguous hang
    pub fn liveness_judgement(
        &self,
        task: &Task,
        pid: Option<i32>,
        elapsed_seconds: u64,
        silence_seconds: u64,
        status: &ProbeStatus,
        recent: &[String],
    ) -> Result<String> {
        #[derive(Serialize)]
        struct Ctx {
            id: String,
            title: String,
            complexity: String,
            pid: Option<i32>,
            elapsed_seconds: u64,
            silence_seconds: u64,
            cpu_percent: f64,
            state: String,
            net_connections: u32,
            recent_count: usize,
            recent_output: String,
        }

        let tail: Vec<&str> = recent.iter().rev().take(20).rev().map(String::as_str).collect();
        self.render(
            "liveness_judgement",
            &Ctx {
                id: task.id.clone(),
                title: task.title.clone(),
                complexity: task.complexity.to_string(),
                pid,
                elapsed_seconds,
                silence_seconds,
                cpu_percent: status.cpu_percent,
                state: status.state.to_string(),
                net_connections: status.net_connections,
                recent_count: tail.len(),
                recent_output: tail.join("\n"),
            },
        )
    }

    pub fn plan(&self, board: &Board, iteration: u32) -> Result<String> {
        #[derive(Serialize)]
        struct Ctx {
            goal: String,
            context: String,
            mode: String,
            is_replan: bool,
            iteration: u32,
            completed_tasks: Vec<TaskLine>,
        }

        self.render(
            "plan",
            &Ctx {
                goal: board.goal.clone(),
                context: board.context.clone(),
                mode: board.mode.to_string(),
                is_replan: iteration > 1,
                iteration,
                completed_tasks: board
                    .tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::Completed)
                    .map(TaskLine::from)
                    .collect(),
            },
        )
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}
