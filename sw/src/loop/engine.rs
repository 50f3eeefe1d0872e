//! Iteration engine - the outer loop
//!
//! Drain the board, validate, let the critic judge, and either finish or
//! fold the critic's follow-up into a fresh plan and go again. Thrashing
//! detection annotates the follow-up; goal-loop detection aborts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use eyre::Result;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::critic;
use super::stats;
use super::thrash;
use super::validation::run_validate_steps;
use crate::domain::{Board, CriticRecord};
use crate::events::{EngineEvent, EventBus};
use crate::llm::{LlmRequest, Provider};
use crate::planning::{PlanRevision, Planner};
use crate::prompts::PromptBuilder;
use crate::scheduler::{Scheduler, integration, snapshot};
use crate::store::BoardStore;

/// Outer loop tuning
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Hard iteration cap; None loops until success or loop detection
    pub max_iterations: Option<u32>,
    /// Run the post-sprint cleanup pass
    pub cleanup_pass: bool,
    /// Per-step budget for validation commands
    pub validation_timeout: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: None,
            cleanup_pass: true,
            validation_timeout: Duration::from_secs(600),
        }
    }
}

/// How the loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    GoalAchieved { iterations: u32 },
    MaxIterationsReached { iterations: u32 },
    /// The critic kept asking for the same goal; it appears impossible
    /// with this approach
    GoalLoopDetected { goal: String },
}

/// Runs iterations until the critic accepts or a breaker trips
pub struct IterationEngine {
    config: LoopConfig,
    scheduler: Scheduler,
    provider: Arc<dyn Provider>,
    prompts: Arc<PromptBuilder>,
    planner: Arc<dyn Planner>,
    store: BoardStore,
    events: Arc<EventBus>,
}

impl IterationEngine {
    pub fn new(
        config: LoopConfig,
        scheduler: Scheduler,
        provider: Arc<dyn Provider>,
        prompts: Arc<PromptBuilder>,
        planner: Arc<dyn Planner>,
        store: BoardStore,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            scheduler,
            provider,
            prompts,
            planner,
            store,
            events,
        }
    }

    pub async fn run(&self, board: Arc<Mutex<Board>>) -> Result<LoopOutcome> {
        let original_goal = board.lock().await.goal.clone();
        let mut previous_goals: Vec<String> = Vec::new();
        let mut iteration: u32 = 1;

        loop {
            {
                let mut b = board.lock().await;
                b.iteration = iteration;
            }
            self.events.emit(EngineEvent::IterationStarted { n: iteration });
            info!(iteration, "run: iteration started");

            self.ensure_contract(&board).await;

            let before_completed = {
                let b = board.lock().await;
                stats::completed_task_ids(&b)
            };

            self.scheduler.run(board.clone()).await?;

            let validation = {
                let steps = board.lock().await.validate_steps.clone();
                run_validate_steps(&steps, &self.store.project_dir(), self.config.validation_timeout).await
            };

            if self.config.cleanup_pass {
                self.run_cleanup(&board).await;
            }

            let verdict = {
                let view = snapshot(&board).await;
                critic::evaluate(self.provider.as_ref(), &self.prompts, &view, &validation.summary()).await
            };
            self.events.emit(EngineEvent::CriticVerdict {
                success: verdict.success,
                reasoning: verdict.reasoning.clone(),
            });

            {
                let mut b = board.lock().await;
                let after = stats::completed_task_ids(&b);
                let new_ids: Vec<String> = after
                    .into_iter()
                    .filter(|id| !before_completed.contains(id))
                    .collect();
                stats::update_persona_stats(&mut b, &new_ids);
                b.verdict_history.push(CriticRecord {
                    iteration,
                    success: verdict.success,
                    reasoning: verdict.reasoning.chars().take(300).collect(),
                });
                self.save(&b).await;
            }

            if verdict.success {
                let mut b = board.lock().await;
                b.retro_notes = format!("Completed in {} iteration(s). {}", iteration, verdict.reasoning);
                b.completed_at = Some(Utc::now());
                self.save(&b).await;
                info!(iteration, "run: goal achieved");
                return Ok(LoopOutcome::GoalAchieved { iterations: iteration });
            }

            if let Some(max) = self.config.max_iterations {
                if iteration >= max {
                    let mut b = board.lock().await;
                    b.retro_notes = format!("Incomplete after {} iteration(s). {}", iteration, verdict.reasoning);
                    self.save(&b).await;
                    warn!(iteration, "run: max iterations reached");
                    return Ok(LoopOutcome::MaxIterationsReached { iterations: iteration });
                }
            }

            let follow_up_goal = verdict.follow_up_goal.clone();
            let mut follow_up_context = verdict.follow_up_context.clone();

            if let Some(message) = {
                let b = board.lock().await;
                thrash::detect_thrashing(&b, iteration)
            } {
                warn!(iteration, "run: thrashing detected");
                let banner = format!(
                    "THRASHING DETECTED - change approach: {}\nTry a completely different approach - the current method isn't working.",
                    message
                );
                if follow_up_context.is_empty() {
                    follow_up_context = banner;
                } else {
                    follow_up_context = format!("{}\n\n{}", follow_up_context, banner);
                }
            }

            if thrash::goal_loop_detected(&previous_goals, &follow_up_goal, iteration) {
                let mut b = board.lock().await;
                b.retro_notes = format!(
                    "Loop detected after {} iterations. Goal '{}' appears impossible with this approach.",
                    iteration, follow_up_goal
                );
                self.save(&b).await;
                warn!(iteration, goal = %follow_up_goal, "run: goal loop detected, aborting");
                return Ok(LoopOutcome::GoalLoopDetected { goal: follow_up_goal });
            }
            previous_goals.push(follow_up_goal.clone());

            let follow_up_goal = if follow_up_goal.is_empty() {
                format!("Complete remaining work for: {}", original_goal)
            } else {
                follow_up_goal
            };

            {
                let mut b = board.lock().await;
                b.reset_non_terminal();
                b.goal = follow_up_goal;
                if !follow_up_context.is_empty() {
                    b.context = format!("{}\n\nFrom previous iteration: {}", b.context, follow_up_context);
                }
                self.save(&b).await;
            }

            self.replan(&board, iteration + 1).await;
            iteration += 1;
        }
    }

    /// Generate the architecture contract when the plan warrants one and
    /// none exists yet
    async fn ensure_contract(&self, board: &Arc<Mutex<Board>>) {
        let view = {
            let b = board.lock().await;
            if !b.architecture_contract.is_empty() {
                return;
            }
            b.clone()
        };

        match integration::generate_contract(self.provider.as_ref(), &self.prompts, &view).await {
            Ok(contract) if !contract.is_empty() => {
                let mut b = board.lock().await;
                b.architecture_contract = contract;
                self.save(&b).await;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "ensure_contract: contract generation failed, continuing without");
            }
        }
    }

    /// Post-sprint cleanup pass: one bounded LLM call; never fails the
    /// iteration
    async fn run_cleanup(&self, board: &Arc<Mutex<Board>>) {
        let view = snapshot(board).await;
        let prompt = match self.prompts.cleanup(&view) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "run_cleanup: failed to build prompt");
                return;
            }
        };

        let request = LlmRequest::new(prompt)
            .with_system("You are doing a quick post-sprint cleanup pass. Remove loose ends only; no refactors, no features.")
            .with_timeout(Duration::from_secs(180));
        match self.provider.run(request).await {
            Ok(result) => {
                let mut b = board.lock().await;
                let summary: String = result.chars().take(200).collect();
                b.context = format!("{}\n\n**Cleanup pass:** {}", b.context, summary);
                self.save(&b).await;
            }
            Err(e) => {
                warn!(error = %e, "run_cleanup: cleanup pass skipped");
            }
        }
    }

    /// Ask the planner for a fresh breakdown and graft it onto the board,
    /// keeping terminal tasks. Planner failure keeps the reset tasks.
    async fn replan(&self, board: &Arc<Mutex<Board>>, next_iteration: u32) {
        let view = snapshot(board).await;
        match self.planner.plan(&view, next_iteration).await {
            Ok(revision) => {
                let mut b = board.lock().await;
                apply_revision(&mut b, revision);
                self.save(&b).await;
            }
            Err(e) => {
                warn!(error = %e, "replan: planner failed, keeping reset tasks");
            }
        }
    }

    async fn save(&self, board: &Board) {
        if let Err(e) = self.store.save(board).await {
            warn!(error = %e, "save: failed to persist board");
        }
    }
}

/// Graft a plan revision onto the board: terminal tasks stay as history,
/// everything else is replaced. A fresh plan means a fresh contract.
fn apply_revision(board: &mut Board, revision: PlanRevision) {
    if revision.tasks.is_empty() {
        return;
    }

    board.tasks.retain(|t| t.is_terminal());
    let existing: std::collections::HashSet<String> = board.tasks.iter().map(|t| t.id.clone()).collect();
    for task in revision.tasks {
        if !existing.contains(&task.id) {
            board.tasks.push(task);
        }
    }

    if !revision.risks.is_empty() {
        board.risks = revision.risks;
    }
    if !revision.assumptions.is_empty() {
        board.assumptions = revision.assumptions;
    }
    if !revision.definition_of_done.is_empty() {
        board.definition_of_done = revision.definition_of_done;
    }
    board.architecture_contract.clear();
    // Sprint scope re-locks on the next drain
    board.sprint.scope_locked = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Complexity, Mode, Task, TaskStatus};
    use crate::llm::mock::MockProvider;
    use crate::scheduler::SchedulerConfig;
    use crate::supervisor::{AttemptOutcome, AttemptRunner, AttemptSpec};
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct InstantRunner;

    #[async_trait]
    impl AttemptRunner for InstantRunner {
        async fn run_attempt(&self, _task: Task, _spec: AttemptSpec) -> AttemptOutcome {
            AttemptOutcome::Completed {
                artifacts: Vec::new(),
                actual_complexity: Complexity::Trivial,
                notes: String::new(),
            }
        }
    }

    struct StubPlanner {
        revisions: std::sync::Mutex<std::collections::VecDeque<PlanRevision>>,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl StubPlanner {
        fn new(revisions: Vec<PlanRevision>) -> Self {
            Self {
                revisions: std::sync::Mutex::new(revisions.into_iter().collect()),
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Planner for StubPlanner {
        async fn plan(&self, _board: &Board, _iteration: u32) -> Result<PlanRevision> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(self.revisions.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    struct Fixture {
        engine: IterationEngine,
        board: Arc<Mutex<Board>>,
        _dir: tempfile::TempDir,
    }

    fn fixture(tasks: Vec<Task>, critic_responses: Vec<&str>, planner: StubPlanner, max_iterations: Option<u32>) -> Fixture {
        let dir = tempdir().unwrap();
        let store = BoardStore::new(dir.path().join(".swell.yaml"));
        let events = Arc::new(EventBus::new(1024));
        let provider: Arc<dyn Provider> = Arc::new(MockProvider::new(critic_responses));
        let prompts = Arc::new(PromptBuilder::new());

        let scheduler = Scheduler::new(
            SchedulerConfig {
                wait_slice: Duration::from_millis(10),
                ..SchedulerConfig::default()
            },
            Arc::new(InstantRunner),
            provider.clone(),
            prompts.clone(),
            store.clone(),
            events.clone(),
        );
        let engine = IterationEngine::new(
            LoopConfig {
                max_iterations,
                cleanup_pass: false,
                validation_timeout: Duration::from_secs(10),
            },
            scheduler,
            provider,
            prompts,
            Arc::new(planner),
            store,
            events,
        );

        let mut board = Board::new("build the thing", "", Mode::Sprint);
        board.tasks = tasks;
        Fixture {
            engine,
            board: Arc::new(Mutex::new(board)),
            _dir: dir,
        }
    }

    const SUCCESS: &str = "```yaml\nsuccess: true\nreasoning: \"done\"\n```";

    fn failure(goal: &str) -> String {
        format!(
            "```yaml\nsuccess: false\nreasoning: \"not there\"\nfollow_up_goal: \"{}\"\nfollow_up_context: \"more to do\"\n```",
            goal
        )
    }

    #[tokio::test]
    async fn test_success_first_iteration() {
        let f = fixture(
            vec![Task::new("a", "A")],
            vec![SUCCESS],
            StubPlanner::new(vec![]),
            None,
        );
        let outcome = f.engine.run(f.board.clone()).await.unwrap();
        assert_eq!(outcome, LoopOutcome::GoalAchieved { iterations: 1 });

        let b = f.board.lock().await;
        assert_eq!(b.verdict_history.len(), 1);
        assert!(b.verdict_history[0].success);
        assert!(b.retro_notes.contains("Completed in 1 iteration"));
        assert!(b.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_failure_replans_and_retries() {
        let fail = failure("finish the edges");
        let replan = PlanRevision {
            tasks: vec![Task::new("edges", "Finish the edges")],
            ..PlanRevision::default()
        };
        let f = fixture(
            vec![Task::new("a", "A")],
            vec![&fail, SUCCESS],
            StubPlanner::new(vec![replan]),
            None,
        );

        let outcome = f.engine.run(f.board.clone()).await.unwrap();
        assert_eq!(outcome, LoopOutcome::GoalAchieved { iterations: 2 });

        let b = f.board.lock().await;
        assert_eq!(b.goal, "finish the edges");
        assert!(b.context.contains("more to do"));
        // Original completed task kept, new task completed on iteration 2
        assert_eq!(b.get_task("a").unwrap().status, TaskStatus::Completed);
        assert_eq!(b.get_task("edges").unwrap().status, TaskStatus::Completed);
        assert_eq!(b.verdict_history.len(), 2);
    }

    #[tokio::test]
    async fn test_max_iterations_cap() {
        let fail1 = failure("goal one");
        let fail2 = failure("goal two");
        let f = fixture(
            vec![Task::new("a", "A")],
            vec![&fail1, &fail2],
            StubPlanner::new(vec![]),
            Some(2),
        );
        let outcome = f.engine.run(f.board.clone()).await.unwrap();
        assert_eq!(outcome, LoopOutcome::MaxIterationsReached { iterations: 2 });

        let b = f.board.lock().await;
        assert!(b.retro_notes.contains("Incomplete after 2"));
    }

    #[tokio::test]
    async fn test_goal_loop_aborts() {
        let fail = failure("make the impossible thing");
        let f = fixture(
            vec![Task::new("a", "A")],
            vec![&fail, &fail, &fail],
            StubPlanner::new(vec![]),
            None,
        );
        let outcome = f.engine.run(f.board.clone()).await.unwrap();
        assert_eq!(
            outcome,
            LoopOutcome::GoalLoopDetected {
                goal: "make the impossible thing".to_string()
            }
        );

        let b = f.board.lock().await;
        assert!(b.retro_notes.contains("appears impossible"));
    }

    #[tokio::test]
    async fn test_thrashing_annotates_context() {
        let mut kill_prone = Task::new("a", "A");
        kill_prone.kill_count = 4;
        let fail = failure("try again differently");
        let f = fixture(
            vec![kill_prone],
            vec![&fail, SUCCESS],
            StubPlanner::new(vec![]),
            None,
        );

        // Iteration numbers: thrashing only fires from iteration 2, so the
        // first failing verdict (iteration 1) must not annotate
        let outcome = f.engine.run(f.board.clone()).await.unwrap();
        assert_eq!(outcome, LoopOutcome::GoalAchieved { iterations: 2 });
        let b = f.board.lock().await;
        assert!(!b.context.contains("THRASHING DETECTED"));
    }

    #[tokio::test]
    async fn test_thrashing_fires_on_second_iteration() {
        let mut kill_prone = Task::new("a", "A");
        kill_prone.kill_count = 4;
        let fail1 = failure("first follow-up");
        let fail2 = failure("second follow-up");
        let f = fixture(
            vec![kill_prone],
            vec![&fail1, &fail2, SUCCESS],
            StubPlanner::new(vec![]),
            None,
        );

        let outcome = f.engine.run(f.board.clone()).await.unwrap();
        assert_eq!(outcome, LoopOutcome::GoalAchieved { iterations: 3 });
        let b = f.board.lock().await;
        assert!(b.context.contains("THRASHING DETECTED"));
    }

    #[tokio::test]
    async fn test_empty_follow_up_goal_gets_default() {
        let fail = "```yaml\nsuccess: false\nreasoning: \"hmm\"\n```";
        let f = fixture(
            vec![Task::new("a", "A")],
            vec![fail, SUCCESS],
            StubPlanner::new(vec![]),
            None,
        );
        f.engine.run(f.board.clone()).await.unwrap();

        let b = f.board.lock().await;
        assert_eq!(b.goal, "Complete remaining work for: build the thing");
    }

    #[test]
    fn test_apply_revision_keeps_terminal_tasks() {
        let mut board = Board::new("g", "", Mode::Sprint);
        let mut done = Task::new("done", "Done");
        done.complete(vec![], None);
        let mut stale = Task::new("stale", "Stale");
        stale.block("stuck");
        board.tasks = vec![done, stale];
        board.architecture_contract = "old contract".to_string();

        apply_revision(
            &mut board,
            PlanRevision {
                tasks: vec![Task::new("fresh", "Fresh"), Task::new("done", "Duplicate of kept")],
                risks: vec!["new risk".to_string()],
                ..PlanRevision::default()
            },
        );

        let ids: Vec<&str> = board.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["done", "fresh"]);
        assert_eq!(board.risks, vec!["new risk".to_string()]);
        assert!(board.architecture_contract.is_empty());
        assert!(!board.sprint.scope_locked);
    }

    #[test]
    fn test_apply_empty_revision_is_noop() {
        let mut board = Board::new("g", "", Mode::Sprint);
        board.tasks = vec![Task::new("a", "A")];
        apply_revision(&mut board, PlanRevision::default());
        assert_eq!(board.tasks.len(), 1);
    }
}
