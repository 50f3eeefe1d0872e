//! Iteration loop module
//!
//! After the scheduler drains, validation runs, the critic judges, and the
//! engine either finishes or re-plans and goes again.

mod critic;
mod engine;
mod stats;
mod thrash;
mod validation;

pub use critic::{CriticVerdict, evaluate};
pub use engine::{IterationEngine, LoopConfig, LoopOutcome};
pub use stats::{completed_task_ids, update_persona_stats};
pub use thrash::{detect_thrashing, goal_loop_detected};
pub use validation::{StepResult, ValidationRun, run_validate_steps};
