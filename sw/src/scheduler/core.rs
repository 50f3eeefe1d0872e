//! Scheduler - owns the board for one iteration
//!
//! Admits eligible tasks onto a bounded worker pool in dependency order,
//! receives attempt outcomes, decides retry / resize / block, and persists
//! the board after every transition. All board access goes through one
//! mutex; anything that talks to the LLM (negotiation, re-estimation, the
//! wave integration check) runs strictly outside it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use eyre::Result;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::integration;
use super::waves::compute_waves;
use crate::deliberation;
use crate::domain::{Board, Mode, ResurrectionRecord, Task, TaskStatus};
use crate::events::{EngineEvent, EventBus, TaskSummary};
use crate::llm::Provider;
use crate::prompts::PromptBuilder;
use crate::store::BoardStore;
use crate::supervisor::{AttemptOutcome, AttemptRunner, AttemptSpec, AttemptTimeout, for_complexity};

/// A task that accumulates this many kills is permanently blocked
pub const KILL_CAP: u32 = 10;

/// Silence-style kills needed before re-estimation. Policy, not invariant:
/// repeated silence means the approach may be wrong before the size is.
pub const SILENCE_RESIZE_THRESHOLD: u32 = 3;

/// Activity-style kills (loops, timeouts) needed before re-estimation.
/// Policy, not invariant.
pub const ACTIVITY_RESIZE_THRESHOLD: u32 = 2;

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Max concurrent supervised attempts
    pub max_parallel: usize,
    /// Bounded wait for any supervisor, so the loop observes state changes
    /// made by concurrent deliberation work
    pub wait_slice: Duration,
    pub kill_cap: u32,
    pub silence_resize_threshold: u32,
    pub activity_resize_threshold: u32,
    pub negotiation_max_rounds: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 8,
            wait_slice: Duration::from_millis(500),
            kill_cap: KILL_CAP,
            silence_resize_threshold: SILENCE_RESIZE_THRESHOLD,
            activity_resize_threshold: ACTIVITY_RESIZE_THRESHOLD,
            negotiation_max_rounds: 3,
        }
    }
}

/// How a drain ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SprintOutcome {
    /// Every task reached Completed or Skipped
    Completed,
    /// Progress stopped with tasks blocked
    TasksBlocked { blocked: Vec<String> },
    /// Circular or dangling dependencies left tasks unreachable
    Unreachable { remaining: Vec<String> },
}

/// Drives one board through one drain
#[derive(Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
    runner: Arc<dyn AttemptRunner>,
    provider: Arc<dyn Provider>,
    prompts: Arc<PromptBuilder>,
    store: BoardStore,
    events: Arc<EventBus>,
}

/// Data collected under the mutex for an out-of-mutex integration check
struct WaveCheckRequest {
    contract: String,
    wave: usize,
    tasks: Vec<Task>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        runner: Arc<dyn AttemptRunner>,
        provider: Arc<dyn Provider>,
        prompts: Arc<PromptBuilder>,
        store: BoardStore,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            runner,
            provider,
            prompts,
            store,
            events,
        }
    }

    /// Drain the board: completes when no task is in progress and none is
    /// eligible for admission
    pub async fn run(&self, board: Arc<Mutex<Board>>) -> Result<SprintOutcome> {
        let wave_map = self.start_sprint(&board).await?;
        let wave_map = Arc::new(wave_map);

        let max_parallel = self.config.max_parallel.max(1);
        let (done_tx, mut done_rx) = mpsc::channel::<String>(max_parallel * 2);
        let mut running: HashMap<String, JoinHandle<()>> = HashMap::new();

        loop {
            let to_start = self.admit(&board, &running, max_parallel).await?;

            for (task, spec) in to_start {
                let scheduler = self.clone();
                let board = board.clone();
                let wave_map = wave_map.clone();
                let done_tx = done_tx.clone();
                let task_id = task.id.clone();

                let handle = tokio::spawn(async move {
                    let id = task.id.clone();
                    let outcome = scheduler.runner.run_attempt(task, spec).await;
                    scheduler.process_outcome(&board, &wave_map, &id, outcome).await;
                    let _ = done_tx.send(id).await;
                });
                running.insert(task_id, handle);
            }

            if running.is_empty() {
                if let Some(outcome) = self.exit_check(&board).await {
                    info!(?outcome, "run: drain finished");
                    return Ok(outcome);
                }
                // Eligible work appeared (resurrected tasks); admit it on
                // the next pass
                continue;
            }

            match tokio::time::timeout(self.config.wait_slice, done_rx.recv()).await {
                Ok(Some(id)) => {
                    if let Some(handle) = running.remove(&id) {
                        let _ = handle.await;
                    }
                    // Drain any further completions without blocking
                    while let Ok(id) = done_rx.try_recv() {
                        if let Some(handle) = running.remove(&id) {
                            let _ = handle.await;
                        }
                    }
                }
                Ok(None) => {}
                Err(_) => {
                    // Bounded wait elapsed; loop to observe state changes.
                    // Also sweep for workers that ended without reporting
                    // (a panic skips the done send) so their tasks are not
                    // stranded InProgress.
                    let finished: Vec<String> = running
                        .iter()
                        .filter(|(_, handle)| handle.is_finished())
                        .map(|(id, _)| id.clone())
                        .collect();
                    for id in finished {
                        if let Some(handle) = running.remove(&id) {
                            if let Err(e) = handle.await {
                                warn!(task_id = %id, error = %e, "run: worker panicked");
                                let mut b = board.lock().await;
                                if let Some(task) = b.get_task_mut(&id) {
                                    if task.status == TaskStatus::InProgress {
                                        task.reset_for_retry();
                                    }
                                }
                                self.save(&b).await;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Lock scope, emit the wave plan, persist. Returns the wave index map.
    async fn start_sprint(&self, board: &Arc<Mutex<Board>>) -> Result<HashMap<String, usize>> {
        let mut b = board.lock().await;
        if b.mode == Mode::Sprint && !b.sprint.scope_locked {
            b.lock_scope();
        }

        // Recovery: InProgress tasks with no supervisor are leftovers from
        // a crashed run; put them back in line
        for task in &mut b.tasks {
            if task.status == TaskStatus::InProgress {
                debug!(task_id = %task.id, "start_sprint: recovering orphaned in-progress task");
                task.reset_for_retry();
            }
        }

        let completed = b.completed_ids();
        let pending: Vec<&Task> = b.tasks.iter().filter(|t| !t.is_terminal()).collect();
        let plan = compute_waves(&pending, &completed);
        debug!(waves = plan.waves.len(), unreachable = plan.unreachable.len(), "start_sprint: wave plan");

        self.events.emit(EngineEvent::SprintStarted {
            total_tasks: pending.len(),
            waves: plan.waves.clone(),
            tasks: b
                .tasks
                .iter()
                .map(|t| TaskSummary {
                    id: t.id.clone(),
                    title: t.title.clone(),
                    dependencies: t.dependencies.clone(),
                    status: t.status.to_string(),
                })
                .collect(),
        });
        self.events.emit(EngineEvent::WavePlanCreated {
            waves: plan.waves.clone(),
        });

        self.store.save(&b).await?;
        Ok(plan.index())
    }

    /// Pick and transition the next batch of tasks under the mutex
    async fn admit(
        &self,
        board: &Arc<Mutex<Board>>,
        running: &HashMap<String, JoinHandle<()>>,
        max_parallel: usize,
    ) -> Result<Vec<(Task, AttemptSpec)>> {
        let mut b = board.lock().await;

        let mut slots = max_parallel.saturating_sub(running.len());
        if b.mode == Mode::Kanban {
            let wip = b.kanban.wip_limit.max(1);
            slots = slots.min(wip.saturating_sub(b.in_progress_count()));
        }
        if slots == 0 {
            return Ok(Vec::new());
        }

        let mut eligible: Vec<(String, crate::domain::Priority)> = b
            .eligible_tasks()
            .iter()
            .filter(|t| !running.contains_key(&t.id))
            .map(|t| (t.id.clone(), t.priority))
            .collect();
        // Stable: equal priority keeps insertion order
        eligible.sort_by_key(|(_, priority)| *priority);

        let chosen: Vec<String> = eligible.into_iter().take(slots).map(|(id, _)| id).collect();
        if chosen.is_empty() {
            return Ok(Vec::new());
        }

        let mut started = Vec::new();
        for id in chosen {
            let Some(task) = b.get_task(&id) else { continue };
            let system_prompt = self.prompts.task_system(&b, task)?;
            let user_prompt = self.prompts.task(task)?;
            let timeout = attempt_timeout(&b, task);

            let Some(task) = b.get_task_mut(&id) else { continue };
            task.start();
            let task = task.clone();

            self.events.emit(EngineEvent::TaskStarted {
                task_id: task.id.clone(),
                title: task.title.clone(),
                started_at: task.started_at.unwrap_or_else(Utc::now),
            });
            info!(task_id = %task.id, "admit: task started");

            started.push((
                task,
                AttemptSpec {
                    system_prompt,
                    user_prompt,
                    timeout,
                },
            ));
        }

        self.store.save(&b).await?;
        Ok(started)
    }

    /// Decide whether the drain is over. None means keep looping.
    async fn exit_check(&self, board: &Arc<Mutex<Board>>) -> Option<SprintOutcome> {
        let b = board.lock().await;

        let non_terminal: Vec<&Task> = b.tasks.iter().filter(|t| !t.is_terminal()).collect();
        if non_terminal.is_empty() {
            return Some(SprintOutcome::Completed);
        }
        if !b.eligible_tasks().is_empty() || b.in_progress_count() > 0 {
            return None;
        }

        let blocked: Vec<String> = non_terminal
            .iter()
            .filter(|t| t.status == TaskStatus::Blocked)
            .map(|t| t.id.clone())
            .collect();
        if !blocked.is_empty() {
            warn!(count = blocked.len(), "exit_check: tasks blocked");
            return Some(SprintOutcome::TasksBlocked { blocked });
        }

        let remaining: Vec<String> = non_terminal.iter().map(|t| t.id.clone()).collect();
        warn!(count = remaining.len(), "exit_check: circular or dangling dependency");
        Some(SprintOutcome::Unreachable { remaining })
    }

    /// Apply one attempt outcome. Runs on the worker task, so everything
    /// slow here happens outside the mutex.
    async fn process_outcome(
        &self,
        board: &Arc<Mutex<Board>>,
        wave_map: &HashMap<String, usize>,
        task_id: &str,
        outcome: AttemptOutcome,
    ) {
        match outcome {
            AttemptOutcome::Completed {
                artifacts,
                actual_complexity,
                notes,
            } => {
                self.handle_completed(board, wave_map, task_id, artifacts, actual_complexity, notes)
                    .await;
            }
            AttemptOutcome::Failed { error } => {
                let mut b = board.lock().await;
                if let Some(task) = b.get_task_mut(task_id) {
                    task.block(error.clone());
                }
                self.events.emit(EngineEvent::TaskBlocked {
                    task_id: task_id.to_string(),
                    reason: error,
                });
                self.save(&b).await;
            }
            AttemptOutcome::Killed {
                reason,
                elapsed_seconds,
                silence_kill,
            } => {
                self.handle_kill(board, task_id, reason, elapsed_seconds, silence_kill).await;
            }
        }
    }

    async fn handle_completed(
        &self,
        board: &Arc<Mutex<Board>>,
        wave_map: &HashMap<String, usize>,
        task_id: &str,
        artifacts: Vec<String>,
        actual_complexity: crate::domain::Complexity,
        notes: String,
    ) {
        let check = {
            let mut b = board.lock().await;
            let Some(task) = b.get_task_mut(task_id) else { return };
            task.complete(artifacts.clone(), Some(actual_complexity));
            if !notes.is_empty() {
                task.notes = notes;
            }
            let completed_at = task.completed_at.unwrap_or_else(Utc::now);

            self.events.emit(EngineEvent::TaskCompleted {
                task_id: task_id.to_string(),
                artifacts,
                actual_complexity: Some(actual_complexity),
                completed_at,
            });
            info!(task_id = %task_id, "handle_completed: task completed");
            self.save(&b).await;
            wave_check_request(&b, wave_map, task_id)
        };

        // The integration check reads files and calls the LLM; the mutex is
        // long released by now
        if let Some(request) = check {
            if let Some(deviations) = integration::check_wave(
                self.provider.as_ref(),
                &self.prompts,
                &self.store.project_dir(),
                &request.contract,
                &request.tasks,
            )
            .await
            {
                let mut b = board.lock().await;
                b.integration_notes
                    .push_str(&format!("\n\n--- Wave {} ---\n{}", request.wave, deviations));
                self.save(&b).await;
            }
        }
    }

    async fn handle_kill(
        &self,
        board: &Arc<Mutex<Board>>,
        task_id: &str,
        reason: String,
        elapsed_seconds: i64,
        silence_kill: bool,
    ) {
        // Record the corpse and decide the branch under the mutex
        let (kill_count, snapshot, last_record) = {
            let mut b = board.lock().await;
            let Some(task) = b.get_task_mut(task_id) else { return };

            let partial_notes = if task.notes.is_empty() {
                "(no output before death)".to_string()
            } else {
                task.notes.chars().take(500).collect()
            };
            let record = ResurrectionRecord::new(
                task.kill_count + 1,
                if task.assigned_to.is_empty() {
                    "Unknown"
                } else {
                    task.assigned_to.as_str()
                },
                reason.clone(),
                partial_notes,
                elapsed_seconds,
            );
            task.record_kill(record.clone());
            let kill_count = task.kill_count;

            self.events.emit(EngineEvent::TaskKilled {
                task_id: task_id.to_string(),
                reason: reason.clone(),
                attempt: kill_count,
            });

            if kill_count >= self.config.kill_cap {
                let blocked_reason = format!("killed {}x - needs replan", kill_count);
                task.block(blocked_reason.clone());
                self.events.emit(EngineEvent::TaskBlocked {
                    task_id: task_id.to_string(),
                    reason: blocked_reason,
                });
                warn!(task_id = %task_id, kill_count, "handle_kill: kill cap reached, blocking");
                self.save(&b).await;
                return;
            }

            let snapshot = task.clone();
            self.save(&b).await;
            (kill_count, snapshot, record)
        };

        let should_resize = (silence_kill && kill_count >= self.config.silence_resize_threshold)
            || (!silence_kill && kill_count >= self.config.activity_resize_threshold);

        if should_resize {
            info!(task_id = %task_id, kill_count, "handle_kill: starting re-estimation");
            let verdict =
                deliberation::deliberate(self.provider.as_ref(), &self.prompts, &snapshot, &last_record).await;

            let mut b = board.lock().await;
            if let Some(task) = b.get_task_mut(task_id) {
                if let Some(verdict) = verdict {
                    if verdict.consensus {
                        if let Some(new_complexity) = verdict.new_complexity {
                            let from = task.complexity;
                            if new_complexity != from {
                                info!(task_id = %task_id, %from, to = %new_complexity, "handle_kill: resized");
                                task.complexity = new_complexity;
                            }
                            self.events.emit(EngineEvent::ReEstimationDecided {
                                task_id: task_id.to_string(),
                                from,
                                to: new_complexity,
                                consensus: true,
                            });
                        }
                    } else {
                        debug!(task_id = %task_id, "handle_kill: no consensus, keeping estimate");
                    }
                }
                task.reset_for_retry();
            }
            self.save(&b).await;
        } else {
            let adjustment = deliberation::negotiate(
                self.provider.as_ref(),
                &self.prompts,
                &snapshot,
                &reason,
                self.config.negotiation_max_rounds,
            )
            .await;

            let note = match adjustment {
                Ok(adjustment) => format!("RESURRECTION ADJUSTMENT:\n{}\n\n", adjustment),
                Err(e) => {
                    debug!(task_id = %task_id, error = %e, "handle_kill: negotiation failed, generic adjustment");
                    "RESURRECTION: previous approaches failed; try differently.\n\n".to_string()
                }
            };

            let mut b = board.lock().await;
            if let Some(task) = b.get_task_mut(task_id) {
                task.notes = note;
                task.reset_for_retry();
            }
            self.save(&b).await;
        }
    }

    /// Persist; failures are logged, not fatal to the worker
    async fn save(&self, board: &Board) {
        if let Err(e) = self.store.save(board).await {
            warn!(error = %e, "save: failed to persist board");
        }
    }
}

/// Read-only copy of the board taken under its mutex
///
/// Observers (dashboards, the critic) work from snapshots; they never see
/// a half-applied transition.
pub async fn snapshot(board: &Arc<Mutex<Board>>) -> Board {
    board.lock().await.clone()
}

/// Per-attempt timeout from board policy
fn attempt_timeout(board: &Board, task: &Task) -> Option<AttemptTimeout> {
    if let Some(secs) = board.task_timeout {
        return Some(AttemptTimeout::fixed(Duration::from_secs(secs)));
    }
    if board.use_default_timeouts {
        return Some(for_complexity(task.complexity));
    }
    None
}

/// When completing `task_id` finishes its entire wave and a contract
/// exists, bundle what the integration check needs
fn wave_check_request(board: &Board, wave_map: &HashMap<String, usize>, task_id: &str) -> Option<WaveCheckRequest> {
    if board.architecture_contract.is_empty() {
        return None;
    }
    let wave = *wave_map.get(task_id)?;

    let wave_ids: HashSet<&str> = wave_map
        .iter()
        .filter(|(_, w)| **w == wave)
        .map(|(id, _)| id.as_str())
        .collect();
    let wave_tasks: Vec<&Task> = board.tasks.iter().filter(|t| wave_ids.contains(t.id.as_str())).collect();
    if !wave_tasks.iter().all(|t| t.is_terminal()) {
        return None;
    }

    let tasks: Vec<Task> = wave_tasks
        .into_iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .cloned()
        .collect();
    if tasks.is_empty() {
        return None;
    }
    Some(WaveCheckRequest {
        contract: board.architecture_contract.clone(),
        wave,
        tasks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Complexity, Priority};
    use crate::llm::mock::MockProvider;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Runner replaying scripted outcomes per task id; completes by default
    struct ScriptedRunner {
        outcomes: StdMutex<HashMap<String, VecDeque<AttemptOutcome>>>,
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedRunner {
        fn new(outcomes: Vec<(&str, Vec<AttemptOutcome>)>) -> Self {
            Self {
                outcomes: StdMutex::new(
                    outcomes
                        .into_iter()
                        .map(|(id, list)| (id.to_string(), list.into_iter().collect()))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay: Duration::from_millis(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AttemptRunner for ScriptedRunner {
        async fn run_attempt(&self, task: Task, _spec: AttemptSpec) -> AttemptOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now_active, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            let next = self.outcomes.lock().unwrap().get_mut(&task.id).and_then(VecDeque::pop_front);
            next.unwrap_or(AttemptOutcome::Completed {
                artifacts: Vec::new(),
                actual_complexity: Complexity::Trivial,
                notes: String::new(),
            })
        }
    }

    fn killed(silence: bool) -> AttemptOutcome {
        AttemptOutcome::Killed {
            reason: if silence {
                "no heartbeat; silent > 15 min".to_string()
            } else {
                "loop: 'x' repeating excessively".to_string()
            },
            elapsed_seconds: 10,
            silence_kill: silence,
        }
    }

    struct Fixture {
        scheduler: Scheduler,
        board: Arc<Mutex<Board>>,
        events: Arc<EventBus>,
        _dir: tempfile::TempDir,
    }

    fn fixture(tasks: Vec<Task>, runner: ScriptedRunner, provider: MockProvider) -> Fixture {
        let dir = tempdir().unwrap();
        let store = BoardStore::new(dir.path().join(".swell.yaml"));
        let events = Arc::new(EventBus::new(1024));
        let mut board = Board::new("goal", "", Mode::Sprint);
        board.tasks = tasks;

        let scheduler = Scheduler::new(
            SchedulerConfig {
                wait_slice: Duration::from_millis(20),
                ..SchedulerConfig::default()
            },
            Arc::new(runner),
            Arc::new(provider),
            Arc::new(PromptBuilder::new()),
            store,
            events.clone(),
        );
        Fixture {
            scheduler,
            board: Arc::new(Mutex::new(board)),
            events,
            _dir: dir,
        }
    }

    fn collect_events(rx: &mut tokio::sync::broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_empty_board_completes_immediately() {
        let f = fixture(vec![], ScriptedRunner::new(vec![]), MockProvider::new(vec![]));
        let mut rx = f.events.subscribe();

        let outcome = f.scheduler.run(f.board.clone()).await.unwrap();
        assert_eq!(outcome, SprintOutcome::Completed);

        let events = collect_events(&mut rx);
        assert!(matches!(events[0], EngineEvent::SprintStarted { total_tasks: 0, .. }));
    }

    #[tokio::test]
    async fn test_single_task_completes() {
        let f = fixture(
            vec![Task::new("a", "A")],
            ScriptedRunner::new(vec![]),
            MockProvider::new(vec![]),
        );
        let outcome = f.scheduler.run(f.board.clone()).await.unwrap();
        assert_eq!(outcome, SprintOutcome::Completed);

        let b = f.board.lock().await;
        assert_eq!(b.get_task("a").unwrap().status, TaskStatus::Completed);
        assert!(b.get_task("a").unwrap().completed_at.is_some());
    }

    #[tokio::test]
    async fn test_dependencies_run_in_order() {
        let order: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));

        struct OrderRunner(Arc<StdMutex<Vec<String>>>);
        #[async_trait]
        impl AttemptRunner for OrderRunner {
            async fn run_attempt(&self, task: Task, _spec: AttemptSpec) -> AttemptOutcome {
                self.0.lock().unwrap().push(task.id.clone());
                AttemptOutcome::Completed {
                    artifacts: Vec::new(),
                    actual_complexity: Complexity::Trivial,
                    notes: String::new(),
                }
            }
        }

        let dir = tempdir().unwrap();
        let mut board = Board::new("goal", "", Mode::Sprint);
        board.tasks = vec![
            Task::new("r", "Root"),
            Task::new("a", "A").with_deps(&["r"]),
            Task::new("b", "B").with_deps(&["r"]),
            Task::new("j", "Join").with_deps(&["a", "b"]),
        ];
        let scheduler = Scheduler::new(
            SchedulerConfig {
                wait_slice: Duration::from_millis(20),
                ..SchedulerConfig::default()
            },
            Arc::new(OrderRunner(order.clone())),
            Arc::new(MockProvider::new(vec![])),
            Arc::new(PromptBuilder::new()),
            BoardStore::new(dir.path().join(".swell.yaml")),
            Arc::new(EventBus::new(256)),
        );

        let outcome = scheduler.run(Arc::new(Mutex::new(board))).await.unwrap();
        assert_eq!(outcome, SprintOutcome::Completed);

        let order = order.lock().unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("r") < pos("a"));
        assert!(pos("r") < pos("b"));
        assert!(pos("a") < pos("j"));
        assert!(pos("b") < pos("j"));
    }

    #[tokio::test]
    async fn test_failed_attempt_blocks_task() {
        let f = fixture(
            vec![Task::new("a", "A")],
            ScriptedRunner::new(vec![("a", vec![AttemptOutcome::Failed {
                error: "exit code 2".to_string(),
            }])]),
            MockProvider::new(vec![]),
        );
        let outcome = f.scheduler.run(f.board.clone()).await.unwrap();
        assert_eq!(
            outcome,
            SprintOutcome::TasksBlocked {
                blocked: vec!["a".to_string()]
            }
        );

        let b = f.board.lock().await;
        assert_eq!(b.get_task("a").unwrap().status, TaskStatus::Blocked);
        assert_eq!(b.get_task("a").unwrap().blocked_reason, "exit code 2");
    }

    #[tokio::test]
    async fn test_kill_negotiates_and_retries() {
        let f = fixture(
            vec![Task::new("a", "A")],
            ScriptedRunner::new(vec![("a", vec![killed(true)])]),
            MockProvider::new(vec!["Use the cached index instead", "APPROVED: concrete"]),
        );
        let outcome = f.scheduler.run(f.board.clone()).await.unwrap();
        assert_eq!(outcome, SprintOutcome::Completed);

        let b = f.board.lock().await;
        let task = b.get_task("a").unwrap();
        assert_eq!(task.kill_count, 1);
        assert_eq!(task.resurrection_history.len(), 1);
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.notes.contains("Use the cached index instead"));
    }

    #[tokio::test]
    async fn test_kill_cap_blocks_permanently() {
        let always_kill: Vec<AttemptOutcome> = (0..20).map(|_| killed(true)).collect();
        let f = fixture(
            vec![Task::new("a", "A")],
            ScriptedRunner::new(vec![("a", always_kill)]),
            // No scripted responses: every deliberation fails soft
            MockProvider::new(vec![]),
        );
        let outcome = f.scheduler.run(f.board.clone()).await.unwrap();
        assert_eq!(
            outcome,
            SprintOutcome::TasksBlocked {
                blocked: vec!["a".to_string()]
            }
        );

        let b = f.board.lock().await;
        let task = b.get_task("a").unwrap();
        assert_eq!(task.kill_count, 10);
        assert_eq!(task.resurrection_history.len(), 10);
        assert_eq!(task.status, TaskStatus::Blocked);
        assert!(task.blocked_reason.contains("10"));
    }

    #[tokio::test]
    async fn test_cycle_reports_unreachable_without_admission() {
        let runner = ScriptedRunner::new(vec![]);
        let f = fixture(
            vec![Task::new("a", "A").with_deps(&["b"]), Task::new("b", "B").with_deps(&["a"])],
            runner,
            MockProvider::new(vec![]),
        );
        let outcome = f.scheduler.run(f.board.clone()).await.unwrap();
        match outcome {
            SprintOutcome::Unreachable { remaining } => {
                assert_eq!(remaining.len(), 2);
            }
            other => panic!("expected Unreachable, got {:?}", other),
        }

        let b = f.board.lock().await;
        assert!(b.tasks.iter().all(|t| t.started_at.is_none()));
    }

    #[tokio::test]
    async fn test_kanban_wip_limit_caps_concurrency() {
        let dir = tempdir().unwrap();
        let mut board = Board::new("goal", "", Mode::Kanban);
        board.kanban.wip_limit = 1;
        board.tasks = vec![Task::new("a", "A"), Task::new("b", "B"), Task::new("c", "C")];

        let runner = Arc::new(ScriptedRunner::new(vec![]).with_delay(Duration::from_millis(50)));
        let scheduler = Scheduler::new(
            SchedulerConfig {
                wait_slice: Duration::from_millis(10),
                ..SchedulerConfig::default()
            },
            runner.clone(),
            Arc::new(MockProvider::new(vec![])),
            Arc::new(PromptBuilder::new()),
            BoardStore::new(dir.path().join(".swell.yaml")),
            Arc::new(EventBus::new(256)),
        );

        let outcome = scheduler.run(Arc::new(Mutex::new(board))).await.unwrap();
        assert_eq!(outcome, SprintOutcome::Completed);
        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
        assert_eq!(runner.calls(), 3);
    }

    #[tokio::test]
    async fn test_priority_picks_slot_winner() {
        let order: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));

        struct OrderRunner(Arc<StdMutex<Vec<String>>>);
        #[async_trait]
        impl AttemptRunner for OrderRunner {
            async fn run_attempt(&self, task: Task, _spec: AttemptSpec) -> AttemptOutcome {
                self.0.lock().unwrap().push(task.id.clone());
                tokio::time::sleep(Duration::from_millis(20)).await;
                AttemptOutcome::Completed {
                    artifacts: Vec::new(),
                    actual_complexity: Complexity::Trivial,
                    notes: String::new(),
                }
            }
        }

        let dir = tempdir().unwrap();
        let mut board = Board::new("goal", "", Mode::Sprint);
        board.tasks = vec![
            Task::new("low", "L").with_priority(Priority::Low),
            Task::new("crit", "C").with_priority(Priority::Critical),
        ];

        let scheduler = Scheduler::new(
            SchedulerConfig {
                max_parallel: 1,
                wait_slice: Duration::from_millis(10),
                ..SchedulerConfig::default()
            },
            Arc::new(OrderRunner(order.clone())),
            Arc::new(MockProvider::new(vec![])),
            Arc::new(PromptBuilder::new()),
            BoardStore::new(dir.path().join(".swell.yaml")),
            Arc::new(EventBus::new(256)),
        );

        scheduler.run(Arc::new(Mutex::new(board))).await.unwrap();
        let order = order.lock().unwrap();
        assert_eq!(*order, vec!["crit".to_string(), "low".to_string()]);
    }

    #[tokio::test]
    async fn test_events_for_full_lifecycle() {
        let f = fixture(
            vec![Task::new("a", "A")],
            ScriptedRunner::new(vec![]),
            MockProvider::new(vec![]),
        );
        let mut rx = f.events.subscribe();

        f.scheduler.run(f.board.clone()).await.unwrap();
        let events = collect_events(&mut rx);
        let names: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            names,
            vec!["sprint_started", "wave_plan_created", "task_started", "task_completed"]
        );
    }

    #[tokio::test]
    async fn test_board_persisted_after_transitions() {
        let f = fixture(
            vec![Task::new("a", "A")],
            ScriptedRunner::new(vec![]),
            MockProvider::new(vec![]),
        );
        f.scheduler.run(f.board.clone()).await.unwrap();

        // The durable document reconstructs the in-memory board
        let loaded = f.scheduler.store.load().await.unwrap();
        let b = f.board.lock().await;
        assert_eq!(loaded.get_task("a").unwrap().status, b.get_task("a").unwrap().status);
        assert_eq!(loaded.id, b.id);
    }
}
