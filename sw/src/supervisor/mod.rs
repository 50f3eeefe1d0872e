//! Per-task supervisor
//!
//! Runs exactly one attempt of one task from spawn to terminal outcome.
//! Streams output to the progress sink and event bus, samples liveness on a
//! coarse tick, and kills the agent when the rules say so. Errors never
//! cross this boundary as errors - everything becomes an [`AttemptOutcome`].

mod monitor;
mod parse;
mod timeouts;

pub use monitor::{Assessment, HEARTBEAT_TOKEN, MonitorConfig, MonitorInput, assess, detect_output_loop, is_silence_kill, last_heartbeat_age};
pub use parse::{CompletionReport, parse_completion};
pub use timeouts::{AttemptTimeout, for_complexity};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::{Complexity, Task};
use crate::events::{EngineEvent, EventBus};
use crate::llm::{AgentChannel, ChannelEvent, LlmRequest, Provider};
use crate::probe::{ProbeStatus, ProcessProbe};
use crate::progress::{ProgressSink, estimate_percent};
use crate::prompts::PromptBuilder;

/// Terminal result of one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Clean exit; output parsed (or recovered) into completion metadata
    Completed {
        artifacts: Vec<String>,
        actual_complexity: Complexity,
        notes: String,
    },
    /// The agent failed on its own (non-zero exit, spawn failure)
    Failed { error: String },
    /// The supervisor terminated the attempt
    Killed {
        reason: String,
        elapsed_seconds: i64,
        silence_kill: bool,
    },
}

/// Prompts and budget for one attempt
#[derive(Debug, Clone)]
pub struct AttemptSpec {
    pub system_prompt: String,
    pub user_prompt: String,
    pub timeout: Option<AttemptTimeout>,
}

/// Seam between the scheduler and the supervisor: the scheduler only ever
/// sees this trait, which makes scripted attempt outcomes trivial in tests
#[async_trait]
pub trait AttemptRunner: Send + Sync {
    async fn run_attempt(&self, task: Task, spec: AttemptSpec) -> AttemptOutcome;
}

/// Supervisor tuning
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Liveness rule thresholds
    pub monitor: MonitorConfig,
    /// Liveness sampling cadence
    pub tick: Duration,
    /// SIGTERM-to-SIGKILL grace on kill
    pub kill_grace: Duration,
    /// Budget for the rule-7 deliberative LLM call
    pub judgement_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            tick: Duration::from_secs(30),
            kill_grace: Duration::from_secs(2),
            judgement_timeout: Duration::from_secs(120),
        }
    }
}

/// The per-attempt watchdog
pub struct Supervisor {
    config: SupervisorConfig,
    provider: Arc<dyn Provider>,
    probe: Arc<dyn ProcessProbe>,
    prompts: Arc<PromptBuilder>,
    progress: Arc<dyn ProgressSink>,
    events: Arc<EventBus>,
    cancel: watch::Receiver<bool>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        provider: Arc<dyn Provider>,
        probe: Arc<dyn ProcessProbe>,
        prompts: Arc<PromptBuilder>,
        progress: Arc<dyn ProgressSink>,
        events: Arc<EventBus>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            provider,
            probe,
            prompts,
            progress,
            events,
            cancel,
        }
    }

    /// Kill the agent, drain its remaining output, classify the result
    async fn kill_attempt(
        &self,
        channel: &mut Box<dyn AgentChannel>,
        reason: &str,
        start: Instant,
    ) -> AttemptOutcome {
        info!(%reason, "kill_attempt: terminating agent");
        channel.kill(self.config.kill_grace).await;

        // Bounded drain so a stubborn process cannot wedge the supervisor
        let drain_budget = self.config.kill_grace + Duration::from_secs(5);
        let _ = tokio::time::timeout(drain_budget, async {
            while let Some(event) = channel.recv().await {
                if matches!(event, ChannelEvent::Exited { .. }) {
                    break;
                }
            }
        })
        .await;

        AttemptOutcome::Killed {
            reason: reason.to_string(),
            elapsed_seconds: start.elapsed().as_secs() as i64,
            silence_kill: is_silence_kill(reason),
        }
    }

    /// Rule-7 deliberative check. Returns Some(reason) when the judgement
    /// is to kill; any failure of the call itself means continue.
    async fn judge(
        &self,
        task: &Task,
        pid: Option<i32>,
        elapsed: Duration,
        silence: Duration,
        status: &ProbeStatus,
        recent: &[String],
    ) -> Option<String> {
        let prompt = match self.prompts.liveness_judgement(
            task,
            pid,
            elapsed.as_secs(),
            silence.as_secs(),
            status,
            recent,
        ) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "judge: failed to build prompt");
                return None;
            }
        };

        let request = LlmRequest::new(prompt).with_timeout(self.config.judgement_timeout);
        match self.provider.run(request).await {
            Ok(response) => {
                let upper = response.to_uppercase();
                if upper.contains("KILL") {
                    let reason = response
                        .split_once("KILL:")
                        .map(|(_, r)| r.trim().to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "deliberative check judged the agent hung".to_string());
                    Some(reason)
                } else {
                    None
                }
            }
            Err(e) => {
                warn!(error = %e, "judge: deliberative check failed, continuing");
                None
            }
        }
    }
}

/// Wait until the cancel flag flips true; never resolves if it cannot
async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone; cancellation can never arrive
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl AttemptRunner for Supervisor {
    async fn run_attempt(&self, task: Task, spec: AttemptSpec) -> AttemptOutcome {
        let start = Instant::now();
        let request = LlmRequest::new(spec.user_prompt).with_system(spec.system_prompt);

        let mut channel = match self.provider.spawn(request).await {
            Ok(channel) => channel,
            Err(e) => {
                return AttemptOutcome::Failed {
                    error: format!("spawn failed: {}", e),
                };
            }
        };
        let pid = channel.pid();
        debug!(task_id = %task.id, ?pid, "run_attempt: agent spawned");

        let mut output: Vec<String> = Vec::new();
        let mut recent: VecDeque<String> = VecDeque::with_capacity(self.config.monitor.recent_window);
        let mut last_output = start;
        let mut warned = false;
        let mut cancel = self.cancel.clone();

        let mut ticker = tokio::time::interval_at(start + self.config.tick, self.config.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = channel.recv() => match event {
                    Some(ChannelEvent::Line(line)) => {
                        last_output = Instant::now();
                        self.events.emit(EngineEvent::TaskOutput {
                            task_id: task.id.clone(),
                            line: line.clone(),
                        });
                        if recent.len() == self.config.monitor.recent_window {
                            recent.pop_front();
                        }
                        recent.push_back(line.clone());
                        output.push(line);
                        let percent = estimate_percent(start.elapsed(), output.len());
                        self.progress.update(&task.id, percent, output.last().map(String::as_str).unwrap_or(""));
                    }
                    Some(ChannelEvent::Exited { success: true, .. }) => {
                        self.progress.update(&task.id, 100, "");
                        let report = parse_completion(&output.join("\n"), task.kind);
                        info!(task_id = %task.id, artifacts = report.artifacts.len(), "run_attempt: completed");
                        return AttemptOutcome::Completed {
                            artifacts: report.artifacts,
                            actual_complexity: report.actual_complexity,
                            notes: report.notes,
                        };
                    }
                    Some(ChannelEvent::Exited { success: false, detail }) => {
                        info!(task_id = %task.id, %detail, "run_attempt: agent failed");
                        return AttemptOutcome::Failed { error: detail };
                    }
                    None => {
                        return AttemptOutcome::Failed {
                            error: "agent stream ended without exit status".to_string(),
                        };
                    }
                },

                _ = ticker.tick() => {
                    let elapsed: Duration = start.elapsed();
                    let silence: Duration = last_output.elapsed();

                    if let Some(timeout) = spec.timeout {
                        if !warned && elapsed >= timeout.warn {
                            warn!(task_id = %task.id, elapsed_secs = elapsed.as_secs(), "run_attempt: over warn budget");
                            warned = true;
                        }
                        if elapsed >= timeout.kill {
                            let reason = format!(
                                "timeout: exceeded {} min budget ({})",
                                timeout.kill.as_secs() / 60,
                                task.complexity
                            );
                            return self.kill_attempt(&mut channel, &reason, start).await;
                        }
                    }

                    let status = match pid {
                        Some(p) => Some(self.probe.sample(p).await),
                        None => None,
                    };
                    let recent_lines: Vec<String> = recent.iter().cloned().collect();
                    let input = MonitorInput {
                        elapsed,
                        silence,
                        recent: &recent_lines,
                        status,
                    };

                    match assess(&self.config.monitor, &input) {
                        Assessment::Continue => {}
                        Assessment::Kill(reason) => {
                            return self.kill_attempt(&mut channel, &reason, start).await;
                        }
                        Assessment::Deliberate => {
                            let status = status.unwrap_or_else(ProbeStatus::unknown);
                            if let Some(reason) = self
                                .judge(&task, pid, elapsed, silence, &status, &recent_lines)
                                .await
                            {
                                return self.kill_attempt(&mut channel, &reason, start).await;
                            }
                        }
                    }
                }

                _ = wait_cancelled(&mut cancel) => {
                    return self.kill_attempt(&mut channel, "cancelled", start).await;
                }
            }
        }
    }
}
