//! Planning interface
//!
//! The engine consumes plans; it does not produce them. The `Planner`
//! trait is the callback used for re-planning between iterations, and
//! `SinglePassPlanner` is a minimal implementation: one LLM call that emits
//! a task list as YAML. Richer planning conversations live outside the
//! engine and only need to implement the trait.

use std::sync::Arc;

use async_trait::async_trait;
use eyre::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::domain::{Board, Complexity, Priority, Task, TaskKind};
use crate::llm::{LlmRequest, Provider, extract};
use crate::prompts::PromptBuilder;

const PLANNER_ROLE: &str = "You are a pragmatic technical planner. You break goals into the \
smallest set of tasks that achieves them, with honest complexity estimates \
and minimal dependencies. Output ONLY the requested YAML block.";

/// A fresh task breakdown for the remaining work
#[derive(Debug, Clone, Default)]
pub struct PlanRevision {
    pub tasks: Vec<Task>,
    pub risks: Vec<String>,
    pub assumptions: Vec<String>,
    pub definition_of_done: Vec<String>,
}

/// Produces a plan for the board's current goal
#[async_trait]
pub trait Planner: Send + Sync {
    /// Plan (or re-plan) the board's goal. `iteration` is the upcoming
    /// iteration number. Completed tasks are context, not work to redo.
    async fn plan(&self, board: &Board, iteration: u32) -> Result<PlanRevision>;
}

/// One-shot LLM planner
pub struct SinglePassPlanner {
    provider: Arc<dyn Provider>,
    prompts: Arc<PromptBuilder>,
}

impl SinglePassPlanner {
    pub fn new(provider: Arc<dyn Provider>, prompts: Arc<PromptBuilder>) -> Self {
        Self { provider, prompts }
    }
}

#[async_trait]
impl Planner for SinglePassPlanner {
    async fn plan(&self, board: &Board, iteration: u32) -> Result<PlanRevision> {
        let prompt = self.prompts.plan(board, iteration)?;
        let response = self
            .provider
            .run(LlmRequest::new(prompt).with_system(PLANNER_ROLE))
            .await
            .context("Planner call failed")?;
        let revision = parse_plan(&response)?;
        info!(tasks = revision.tasks.len(), iteration, "plan: revision produced");
        Ok(revision)
    }
}

/// Task shape the planner is allowed to emit. Unknown fields are a
/// planning error, not something to silently drop.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlannedTask {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    complexity: Complexity,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    task_type: TaskKind,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    acceptance_criteria: Vec<String>,
    #[serde(default)]
    assigned_to: String,
}

/// Parse a planner response into a revision
pub fn parse_plan(response: &str) -> Result<PlanRevision> {
    let value = extract::yaml_block(response)?;

    let planned: Vec<PlannedTask> = match value.get("tasks") {
        Some(tasks) => serde_yaml::from_value(tasks.clone()).context("Planner emitted invalid task fields")?,
        None => Vec::new(),
    };

    let tasks = planned
        .into_iter()
        .map(|p| {
            let mut task = Task::new(p.id, p.title);
            task.description = p.description;
            task.complexity = p.complexity;
            task.priority = p.priority;
            task.kind = p.task_type;
            task.dependencies = p.dependencies;
            task.acceptance_criteria = p.acceptance_criteria;
            task.assigned_to = p.assigned_to;
            task
        })
        .collect();

    Ok(PlanRevision {
        tasks,
        risks: extract::string_list_field(&value, "risks"),
        assumptions: extract::string_list_field(&value, "assumptions"),
        definition_of_done: extract::string_list_field(&value, "definition_of_done"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Mode;
    use crate::llm::mock::MockProvider;

    const PLAN_RESPONSE: &str = r#"Here is the plan.
```yaml
tasks:
  - id: spike-storage
    title: "Investigate storage options"
    task_type: spike
    complexity: trivial
    priority: high
    acceptance_criteria:
      - "Options compared"
    assigned_to: Explorer
  - id: impl-api
    title: "Build the API"
    description: "REST endpoints"
    complexity: medium
    dependencies: [spike-storage]
risks:
  - "Schema churn"
definition_of_done:
  - "Tests pass"
```"#;

    #[test]
    fn test_parse_plan() {
        let revision = parse_plan(PLAN_RESPONSE).unwrap();
        assert_eq!(revision.tasks.len(), 2);

        let spike = &revision.tasks[0];
        assert_eq!(spike.id, "spike-storage");
        assert_eq!(spike.kind, TaskKind::Spike);
        assert_eq!(spike.priority, Priority::High);
        assert_eq!(spike.assigned_to, "Explorer");

        let api = &revision.tasks[1];
        assert_eq!(api.complexity, Complexity::Medium);
        assert_eq!(api.dependencies, vec!["spike-storage".to_string()]);
        assert_eq!(revision.risks, vec!["Schema churn".to_string()]);
        assert_eq!(revision.definition_of_done, vec!["Tests pass".to_string()]);
    }

    #[test]
    fn test_parse_plan_rejects_unknown_task_fields() {
        let response = "```yaml\ntasks:\n  - id: a\n    title: A\n    estimated_days: 4\n```";
        assert!(parse_plan(response).is_err());
    }

    #[test]
    fn test_parse_plan_without_tasks_is_empty() {
        let revision = parse_plan("```yaml\nrisks:\n  - \"none\"\n```").unwrap();
        assert!(revision.tasks.is_empty());
        assert_eq!(revision.risks.len(), 1);
    }

    #[tokio::test]
    async fn test_single_pass_planner() {
        let provider = Arc::new(MockProvider::new(vec![PLAN_RESPONSE]));
        let planner = SinglePassPlanner::new(provider.clone(), Arc::new(PromptBuilder::new()));

        let board = Board::new("store things", "", Mode::Sprint);
        let revision = planner.plan(&board, 1).await.unwrap();
        assert_eq!(revision.tasks.len(), 2);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_planner_propagates_llm_failure() {
        let provider = Arc::new(MockProvider::new(vec![]));
        let planner = SinglePassPlanner::new(provider, Arc::new(PromptBuilder::new()));
        let board = Board::new("store things", "", Mode::Sprint);
        assert!(planner.plan(&board, 1).await.is_err());
    }
}
