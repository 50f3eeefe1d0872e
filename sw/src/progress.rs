//! Progress signalling for running attempts
//!
//! Supervisors forward each output line, plus an estimated percentage, to a
//! sink. The sink is an optional observer (dashboard, TUI): updates must
//! never block the supervisor, and the no-op sink is the default.

use std::time::Duration;

/// Receives progress updates from supervisors
///
/// Implementations must return quickly; anything slow belongs behind a
/// channel on the implementor's side.
pub trait ProgressSink: Send + Sync {
    fn update(&self, task_id: &str, percent: u8, line: &str);
}

/// Default sink: discards everything
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn update(&self, _task_id: &str, _percent: u8, _line: &str) {}
}

/// Estimate attempt progress from elapsed time and output volume
///
/// Monotone in both inputs, capped at 90 until the attempt is terminal.
/// 100 is reported by the supervisor itself on success.
pub fn estimate_percent(elapsed: Duration, line_count: usize) -> u8 {
    let time_part = (10 + elapsed.as_secs() / 10).min(85) as usize;
    let output_part = (line_count * 2).min(20);
    (time_part + output_part).min(90) as u8
}
