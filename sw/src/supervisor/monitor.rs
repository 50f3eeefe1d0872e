//! Liveness rules for a running attempt
//!
//! Pure decision logic: given the elapsed/silence clocks, the recent output
//! window and a process probe sample, decide whether the attempt continues,
//! dies, or needs a deliberative judgement call. Rules are evaluated in a
//! fixed order and the first one that fires wins.
//!
//! When the probe reports Unknown the cpu/net rules are skipped entirely,
//! never defaulted to "idle".

use std::collections::HashMap;
use std::time::Duration;

use crate::probe::ProbeStatus;

/// Reserved literal agents print during legitimate silent work
pub const HEARTBEAT_TOKEN: &str = "[HEARTBEAT]";

/// Tunable thresholds for the liveness rules
///
/// Defaults match production cadence; tests compress them.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Zero-output grace: no kill before this much wall time with no output
    pub warmup_no_output: Duration,
    /// Early grace window for attempts with minimal output
    pub early_window: Duration,
    /// Fewer lines than this still counts as "minimal output"
    pub early_min_lines: usize,
    /// Silence beyond this engages the silence rules
    pub silence_threshold: Duration,
    /// A trailing heartbeat buys silence up to this long
    pub heartbeat_extended: Duration,
    /// A line repeating this often in the window is an output loop
    pub loop_line_threshold: usize,
    /// How many recent lines the rules look at
    pub recent_window: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            warmup_no_output: Duration::from_secs(1800),
            early_window: Duration::from_secs(60),
            early_min_lines: 3,
            silence_threshold: Duration::from_secs(900),
            heartbeat_extended: Duration::from_secs(1800),
            loop_line_threshold: 30,
            recent_window: 50,
        }
    }
}

/// What the monitor saw this tick
#[derive(Debug)]
pub struct MonitorInput<'a> {
    pub elapsed: Duration,
    pub silence: Duration,
    /// Most recent output lines, oldest first, at most `recent_window`
    pub recent: &'a [String],
    /// None when the channel has no pid to probe
    pub status: Option<ProbeStatus>,
}

/// Monitor decision for one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assessment {
    /// Nothing to do this tick
    Continue,
    /// Terminate with this reason
    Kill(String),
    /// Deterministic rules cannot classify; ask the LLM
    Deliberate,
}

/// How many lines ago the last heartbeat appeared; None if none in window
pub fn last_heartbeat_age(recent: &[String]) -> Option<usize> {
    recent
        .iter()
        .rev()
        .position(|line| line.contains(HEARTBEAT_TOKEN))
}

/// The most-repeated line in the window, if it crosses the threshold
pub fn detect_output_loop(recent: &[String], threshold: usize) -> Option<&str> {
    if recent.len() < threshold {
        return None;
    }
    let window = &recent[recent.len().saturating_sub(50)..];
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for line in window {
        *counts.entry(line.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count >= threshold)
        .max_by_key(|(_, count)| *count)
        .map(|(line, _)| line)
}

/// Evaluate the rule table for one tick
pub fn assess(config: &MonitorConfig, input: &MonitorInput) -> Assessment {
    let probed = input.status.filter(|s| s.state.is_known());

    // 1. Warm-up grace: initialisation, installs and API connects can
    // legitimately take minutes
    if input.recent.is_empty() && input.elapsed < config.warmup_no_output {
        return Assessment::Continue;
    }
    if input.elapsed < config.early_window && input.recent.len() < config.early_min_lines {
        return Assessment::Continue;
    }

    // 2. Output loop: same line repeating excessively
    if let Some(line) = detect_output_loop(input.recent, config.loop_line_threshold) {
        let mut sample = line.trim().to_string();
        if sample.len() > 50 {
            sample.truncate(50);
        }
        return Assessment::Kill(format!("loop: '{}' repeating excessively", sample));
    }

    let silent = input.silence > config.silence_threshold;

    if let Some(status) = probed {
        // 3. Waiting on network I/O (an API response) is normal
        if silent && status.net_connections > 0 {
            return Assessment::Continue;
        }
        // 4. Computing without output is fine
        if silent && status.cpu_percent > 50.0 {
            return Assessment::Continue;
        }
        // 5. Unrecoverable process states
        if silent && status.state.is_bad() {
            return Assessment::Kill(format!("bad state: {}", status.state));
        }
    }

    // 6. Heartbeat protocol. With a probe available and zero output the
    // situation stays ambiguous (rule 7); without a probe this rule is the
    // only detection left, so an empty window counts as "no heartbeat".
    if silent && (!input.recent.is_empty() || probed.is_none()) {
        match last_heartbeat_age(input.recent) {
            Some(0) if input.silence < config.heartbeat_extended => return Assessment::Continue,
            Some(0) => return Assessment::Kill("silent > 30 min despite heartbeat".to_string()),
            Some(age) => {
                return Assessment::Kill(format!("last heartbeat {} lines ago; silent > 15 min", age));
            }
            None => return Assessment::Kill("no heartbeat; silent > 15 min".to_string()),
        }
    }

    // 7. Truly ambiguous: long silence, idle CPU, no sockets, nothing to
    // read. Hand it to the deliberative check.
    if silent {
        if let Some(status) = probed {
            if status.cpu_percent == 0.0 && status.net_connections == 0 {
                return Assessment::Deliberate;
            }
        }
    }

    // 8. Default
    Assessment::Continue
}

/// Classify a kill reason for the re-estimation policy: silence-style kills
/// use a higher resize threshold than activity-style kills
pub fn is_silence_kill(reason: &str) -> bool {
    let lower = reason.to_lowercase();
    ["silence", "silent", "hung", "hang", "unresponsive", "no output", "no-output"]
        .iter()
        .any(|word| lower.contains(word))
}
