//! Persona estimate accounting
//!
//! After each iteration, compare estimated and actual complexity on every
//! completed task and fold the result into the board's per-persona stats.
//! Thrashing detection consumes these numbers.

use crate::domain::{Board, Complexity, TaskStatus};

/// Update the board's persona stats from completed tasks in this iteration
///
/// Only tasks completed since the previous call should be counted; callers
/// pass the ids of tasks that completed during the iteration just run.
pub fn update_persona_stats(board: &mut Board, completed_ids: &[String]) {
    for id in completed_ids {
        let Some(task) = board.get_task(id) else { continue };
        if task.status != TaskStatus::Completed || task.assigned_to.is_empty() {
            continue;
        }
        let Some(actual) = task.actual_complexity else { continue };
        let estimated = task.complexity;
        // Unknown on either side is not evidence of anything
        let (Some(est_rank), Some(act_rank)) = (estimated.rank(), actual.rank()) else {
            continue;
        };

        let persona = task.assigned_to.clone();
        let stats = board.persona_stats.entry(persona).or_default();
        stats.estimates_given += 1;
        if est_rank == act_rank {
            stats.estimates_accurate += 1;
        } else if act_rank > est_rank {
            stats.estimates_low += 1;
        } else {
            stats.estimates_high += 1;
        }
    }
}

/// Ids of tasks currently completed, for diffing across an iteration
pub fn completed_task_ids(board: &Board) -> Vec<String> {
    board
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .map(|t| t.id.clone())
        .collect()
}
