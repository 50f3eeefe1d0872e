//! swell - wave-scheduled orchestrator for autonomous LLM coding agents
//!
//! A goal becomes a board (a DAG of tasks); the engine executes the DAG in
//! dependency waves across a bounded pool of supervised agent processes,
//! revives or resizes killed tasks, and iterates whole plans until a critic
//! judges the goal achieved.
//!
//! # Layers
//!
//! - [`llm`] - the subprocess/API channel to the agent backend
//! - [`supervisor`] - per-attempt watchdog: liveness rules, kill, outcome
//! - [`scheduler`] - wave derivation, admission, retry/resize/block policy
//! - [`r#loop`] - the outer iteration loop with critic and breakers
//!
//! Supporting: [`domain`] (Board/Task), [`store`] (YAML document),
//! [`events`] (broadcast bus), [`probe`] (process status), [`prompts`],
//! [`deliberation`] (negotiation, re-estimation), [`planning`], [`config`].

pub mod cli;
pub mod config;
pub mod deliberation;
pub mod domain;
pub mod events;
pub mod llm;
pub mod planning;
pub mod probe;
pub mod progress;
pub mod prompts;
pub mod scheduler;
pub mod store;
pub mod supervisor;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use config::{Config, EngineConfig, LlmConfig};
pub use domain::{Board, Complexity, CriticRecord, Mode, Priority, ResurrectionRecord, Task, TaskKind, TaskStatus};
pub use events::{EngineEvent, EventBus, create_event_bus};
pub use llm::{AgentChannel, ApiProvider, ChannelEvent, CliProvider, LlmError, LlmRequest, Provider, create_provider};
pub use planning::{PlanRevision, Planner, SinglePassPlanner};
pub use probe::{ProbeStatus, ProcProbe, ProcState, ProcessProbe};
pub use progress::{NoopSink, ProgressSink};
pub use prompts::PromptBuilder;
pub use r#loop::{CriticVerdict, IterationEngine, LoopConfig, LoopOutcome};
pub use scheduler::{Scheduler, SchedulerConfig, SprintOutcome, compute_waves};
pub use store::{BOARD_FILE_NAME, BoardStore};
pub use supervisor::{
    AttemptOutcome, AttemptRunner, AttemptSpec, AttemptTimeout, Supervisor, SupervisorConfig,
};
