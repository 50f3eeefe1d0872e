//! Provider trait - the exchangeable LLM backend
//!
//! Two entry points: `run` for one-shot calls (negotiation, re-estimation,
//! critic, integration checks) and `spawn` for supervised task attempts,
//! which need a line stream and, when the backend is a subprocess, a pid
//! for the process probe.
//!
//! Providers are plain injected dependencies. There is deliberately no
//! process-wide "current provider" - construct one and pass it down.

use std::time::Duration;

use async_trait::async_trait;

use super::error::LlmError;

/// One request to the backend
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    /// User prompt; delivered via stdin for subprocess backends
    pub prompt: String,

    /// Optional system prompt
    pub system_prompt: Option<String>,

    /// Optional wall-clock budget for one-shot calls
    pub timeout: Option<Duration>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            timeout: None,
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// One observable event from a spawned agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// One output line (stdout and stderr merged)
    Line(String),
    /// The agent finished; no further events follow
    Exited { success: bool, detail: String },
}

/// A live agent attempt: line stream, kill primitive, optional pid
///
/// The channel yields `Line` events until the process ends, then exactly one
/// `Exited`, then `None`. `kill` is idempotent and may be called while
/// another task is draining `recv`.
#[async_trait]
pub trait AgentChannel: Send {
    /// OS process id when backed by a subprocess; None for in-process
    /// backends (supervision degrades to heartbeat-only rules)
    fn pid(&self) -> Option<i32>;

    /// Next event; None once Exited has been delivered
    async fn recv(&mut self) -> Option<ChannelEvent>;

    /// Terminate the agent: polite signal first, forceful after `grace`
    async fn kill(&mut self, grace: Duration);
}

/// Exchangeable LLM backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// One-shot call returning the full response text
    async fn run(&self, request: LlmRequest) -> Result<String, LlmError>;

    /// Spawn-style variant for supervised attempts
    async fn spawn(&self, request: LlmRequest) -> Result<Box<dyn AgentChannel>, LlmError>;
}
