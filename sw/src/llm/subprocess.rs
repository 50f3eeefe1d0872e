//! Agent CLI subprocess provider
//!
//! Spawns the agent CLI (`claude -p ...` by default) and streams its output
//! line by line. The subprocess contract: inherit the working directory,
//! deliver the prompt via stdin (argv has length limits), merge stderr into
//! the same line stream, close stdin after writing. Kill is SIGTERM first,
//! SIGKILL after a short grace.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::error::LlmError;
use super::provider::{AgentChannel, ChannelEvent, LlmRequest, Provider};
use crate::config::LlmConfig;

/// Line channel capacity per spawned agent
const LINE_CHANNEL_CAPACITY: usize = 1024;

/// Poll interval while waiting out the kill grace period
const KILL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Provider that runs the agent as an external CLI process
pub struct CliProvider {
    bin: String,
    base_args: Vec<String>,
}

impl CliProvider {
    pub fn new(bin: impl Into<String>, base_args: Vec<String>) -> Self {
        Self {
            bin: bin.into(),
            base_args,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(&config.bin, config.args.clone())
    }
}

#[async_trait]
impl Provider for CliProvider {
    async fn run(&self, request: LlmRequest) -> Result<String, LlmError> {
        let timeout = request.timeout;
        let mut channel = self.spawn(request).await?;

        let collect = async {
            let mut lines = Vec::new();
            while let Some(event) = channel.recv().await {
                match event {
                    ChannelEvent::Line(line) => lines.push(line),
                    ChannelEvent::Exited { success: true, .. } => return Ok(lines.join("\n")),
                    ChannelEvent::Exited { success: false, detail } => {
                        return Err(LlmError::Process { detail });
                    }
                }
            }
            Err(LlmError::InvalidResponse("agent stream ended without exit".to_string()))
        };

        match timeout {
            Some(limit) => match tokio::time::timeout(limit, collect).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(bin = %self.bin, ?limit, "run: timeout, killing agent");
                    channel.kill(Duration::from_secs(2)).await;
                    Err(LlmError::Timeout(limit))
                }
            },
            None => collect.await,
        }
    }

    async fn spawn(&self, request: LlmRequest) -> Result<Box<dyn AgentChannel>, LlmError> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(&self.base_args);
        if let Some(system_prompt) = &request.system_prompt {
            cmd.arg("--system-prompt").arg(system_prompt);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(bin = %self.bin, "spawn: launching agent");
        let mut child = cmd.spawn()?;
        let pid = child.id().map(|p| p as i32);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LlmError::InvalidResponse("agent stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LlmError::InvalidResponse("agent stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LlmError::InvalidResponse("agent stderr not captured".to_string()))?;

        // Write the prompt and close stdin so the agent sees EOF
        let prompt = request.prompt;
        tokio::spawn(async move {
            let mut stdin = stdin;
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                warn!(error = %e, "spawn: failed writing prompt to agent stdin");
            }
            // stdin dropped here, closing the pipe
        });

        let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let out_pump = tokio::spawn(pump_lines(stdout, tx.clone()));
        let err_pump = tokio::spawn(pump_lines(stderr, tx.clone()));

        let exited = Arc::new(AtomicBool::new(false));
        let exited_flag = exited.clone();
        tokio::spawn(async move {
            let _ = out_pump.await;
            let _ = err_pump.await;
            let detail = match child.wait().await {
                Ok(status) => {
                    exited_flag.store(true, Ordering::SeqCst);
                    match status.code() {
                        Some(code) => {
                            let _ = tx
                                .send(ChannelEvent::Exited {
                                    success: status.success(),
                                    detail: format!("exit code {}", code),
                                })
                                .await;
                            return;
                        }
                        None => "killed by signal".to_string(),
                    }
                }
                Err(e) => format!("wait failed: {}", e),
            };
            exited_flag.store(true, Ordering::SeqCst);
            let _ = tx.send(ChannelEvent::Exited { success: false, detail }).await;
        });

        Ok(Box::new(CliChannel {
            pid,
            rx,
            exited,
            done: false,
        }))
    }
}

/// Forward every line from a reader into the merged event stream
async fn pump_lines<R: AsyncRead + Unpin>(reader: R, tx: mpsc::Sender<ChannelEvent>) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(ChannelEvent::Line(line)).await.is_err() {
            break;
        }
    }
}

/// Channel over one spawned agent CLI process
struct CliChannel {
    pid: Option<i32>,
    rx: mpsc::Receiver<ChannelEvent>,
    exited: Arc<AtomicBool>,
    done: bool,
}

#[async_trait]
impl AgentChannel for CliChannel {
    fn pid(&self) -> Option<i32> {
        self.pid
    }

    async fn recv(&mut self) -> Option<ChannelEvent> {
        if self.done {
            return None;
        }
        let event = self.rx.recv().await;
        if matches!(event, Some(ChannelEvent::Exited { .. }) | None) {
            self.done = true;
        }
        event
    }

    async fn kill(&mut self, grace: Duration) {
        let Some(pid) = self.pid else { return };
        if self.exited.load(Ordering::SeqCst) {
            return;
        }

        debug!(pid, "kill: sending SIGTERM");
        let _ = signal::kill(Pid::from_raw(pid), Signal::SIGTERM);

        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            if self.exited.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(KILL_POLL_INTERVAL).await;
        }

        if !self.exited.load(Ordering::SeqCst) {
            warn!(pid, "kill: grace expired, sending SIGKILL");
            let _ = signal::kill(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }
}
