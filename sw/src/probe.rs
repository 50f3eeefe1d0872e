//! Process probe
//!
//! Answers one question for the supervisor: what is this agent process
//! doing right now? CPU usage (sampled over a short interval), scheduler
//! state, and the number of open network sockets (an agent waiting on an
//! API response holds at least one).
//!
//! Failure is always soft: any error yields `ProcState::Unknown` with zero
//! values, and the supervisor skips the rules that depend on cpu/net
//! rather than treating the process as idle.

use std::time::Duration;

use async_trait::async_trait;
use procfs::process::{FDTarget, Process};
use tracing::debug;

/// CPU sampling window
const CPU_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Process scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Running,
    Sleeping,
    /// Uninterruptible sleep, usually stuck I/O
    DiskSleep,
    Zombie,
    Stopped,
    Dead,
    /// Probe unavailable; cpu/net numbers are meaningless
    Unknown,
}

impl ProcState {
    pub fn from_stat_char(c: char) -> Self {
        match c {
            'R' => Self::Running,
            'S' => Self::Sleeping,
            'D' => Self::DiskSleep,
            'Z' => Self::Zombie,
            'T' | 't' => Self::Stopped,
            'X' | 'x' => Self::Dead,
            _ => Self::Unknown,
        }
    }

    /// Whether the probe produced a real answer
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// States from which a process will not recover
    pub fn is_bad(&self) -> bool {
        matches!(self, Self::Zombie | Self::DiskSleep)
    }
}

impl std::fmt::Display for ProcState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Sleeping => write!(f, "sleeping"),
            Self::DiskSleep => write!(f, "disk-sleep"),
            Self::Zombie => write!(f, "zombie"),
            Self::Stopped => write!(f, "stopped"),
            Self::Dead => write!(f, "dead"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One probe sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeStatus {
    pub cpu_percent: f64,
    pub state: ProcState,
    pub net_connections: u32,
}

impl ProbeStatus {
    /// The value returned when the probe cannot answer
    pub fn unknown() -> Self {
        Self {
            cpu_percent: 0.0,
            state: ProcState::Unknown,
            net_connections: 0,
        }
    }
}

/// Source of process status samples
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    async fn sample(&self, pid: i32) -> ProbeStatus;
}

/// /proc-backed probe
pub struct ProcProbe;

impl ProcProbe {
    fn cpu_ticks(process: &Process) -> Option<u64> {
        let stat = process.stat().ok()?;
        Some(stat.utime + stat.stime)
    }

    fn socket_count(process: &Process) -> u32 {
        // Permission errors on fd listing are common; report zero sockets
        // rather than failing the whole sample
        match process.fd() {
            Ok(fds) => fds
                .filter_map(Result::ok)
                .filter(|fd| matches!(fd.target, FDTarget::Socket(_)))
                .count() as u32,
            Err(_) => 0,
        }
    }
}

#[async_trait]
impl ProcessProbe for ProcProbe {
    async fn sample(&self, pid: i32) -> ProbeStatus {
        let Ok(process) = Process::new(pid) else {
            debug!(pid, "sample: process not found");
            return ProbeStatus::unknown();
        };

        let Some(ticks_before) = Self::cpu_ticks(&process) else {
            return ProbeStatus::unknown();
        };
        tokio::time::sleep(CPU_SAMPLE_INTERVAL).await;
        let Ok(stat) = process.stat() else {
            // Process went away between samples
            return ProbeStatus::unknown();
        };
        let ticks_after = stat.utime + stat.stime;

        let ticks_per_second = procfs::ticks_per_second() as f64;
        let delta_seconds = (ticks_after.saturating_sub(ticks_before)) as f64 / ticks_per_second;
        let cpu_percent = delta_seconds / CPU_SAMPLE_INTERVAL.as_secs_f64() * 100.0;

        let status = ProbeStatus {
            cpu_percent,
            state: ProcState::from_stat_char(stat.state),
            net_connections: Self::socket_count(&process),
        };
        debug!(pid, cpu = status.cpu_percent, state = %status.state, conns = status.net_connections, "sample");
        status
    }
}
