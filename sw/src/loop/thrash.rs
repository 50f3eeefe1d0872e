//! Thrashing and goal-loop detection
//!
//! Two circuit breakers for the outer loop: thrashing (the same plan shape
//! keeps failing in recognizable ways) annotates the follow-up context so
//! the next planning pass changes approach; a goal loop (the critic keeps
//! asking for the same thing) aborts outright.

use crate::domain::{Board, TaskStatus};

/// Minimum estimate samples before a persona's accuracy counts as evidence
const MIN_ESTIMATE_SAMPLES: u32 = 3;

/// Detect thrashing patterns. Only meaningful from iteration 2 on; returns
/// a description of every pattern that fired, or None.
pub fn detect_thrashing(board: &Board, iteration: u32) -> Option<String> {
    if iteration < 2 {
        return None;
    }
    let mut patterns = Vec::new();

    // Repeated supervisor kills on the same tasks
    let kill_prone: Vec<&str> = board
        .tasks
        .iter()
        .filter(|t| t.kill_count >= 3)
        .map(|t| t.id.as_str())
        .collect();
    if !kill_prone.is_empty() {
        patterns.push(format!(
            "Tasks killed 3+ times: {}. These tasks are timing out or hanging - the current approach isn't working.",
            kill_prone[..kill_prone.len().min(3)].join(", ")
        ));
    }

    // The same obstacles blocking multiple tasks
    let blocked: Vec<&str> = board
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Blocked)
        .map(|t| t.id.as_str())
        .collect();
    if blocked.len() >= 2 && iteration >= 3 {
        patterns.push(format!(
            "{} tasks blocked: {}. The team is stuck on the same obstacles.",
            blocked.len(),
            blocked[..blocked.len().min(3)].join(", ")
        ));
    }

    // A persona whose estimates are mostly wrong
    let mut bad_estimators: Vec<(&str, u32)> = board
        .persona_stats
        .iter()
        .filter(|(_, stats)| stats.estimates_given >= MIN_ESTIMATE_SAMPLES)
        .filter(|(_, stats)| stats.estimates_wrong() > stats.estimates_accurate)
        .map(|(name, stats)| (name.as_str(), stats.estimates_wrong()))
        .collect();
    bad_estimators.sort_by_key(|(_, wrong)| std::cmp::Reverse(*wrong));
    if !bad_estimators.is_empty() {
        let list: Vec<String> = bad_estimators
            .iter()
            .take(2)
            .map(|(name, wrong)| format!("{} ({} wrong)", name, wrong))
            .collect();
        patterns.push(format!(
            "Personas with poor estimates: {}. Need a different perspective.",
            list.join(", ")
        ));
    }

    // Many iterations with minimal progress
    if iteration >= 4 && !board.tasks.is_empty() {
        let ratio = board.completion_ratio();
        if ratio < 0.3 {
            patterns.push(format!(
                "After {} iterations, only {:.0}% complete. The current plan isn't making progress.",
                iteration,
                ratio * 100.0
            ));
        }
    }

    if patterns.is_empty() { None } else { Some(patterns.join(" ")) }
}

/// Detect a goal loop: the new follow-up goal is substring-similar (either
/// direction, case-insensitive) to at least two of the previous two goals.
/// Only meaningful from iteration 3 on.
pub fn goal_loop_detected(previous_goals: &[String], new_goal: &str, iteration: u32) -> bool {
    if iteration < 3 || new_goal.is_empty() {
        return false;
    }
    let new_lower = new_goal.to_lowercase();
    let similar = previous_goals
        .iter()
        .rev()
        .take(2)
        .filter(|prev| {
            let prev_lower = prev.to_lowercase();
            !prev_lower.is_empty() && (prev_lower.contains(&new_lower) || new_lower.contains(&prev_lower))
        })
        .count();
    similar >= 2
}
