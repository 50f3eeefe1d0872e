//! Domain types for swell
//!
//! Plain data: the Board, its Tasks, and the records the engine appends as
//! it works. All task relationships are id-based - no owning cycles.

mod board;
mod id;
mod record;
mod task;

pub use board::{Board, BoardProgress, KanbanConfig, Mode, PersonaStats, SprintConfig};
pub use id::generate_id;
pub use record::{CriticRecord, ResurrectionRecord};
pub use task::{Complexity, Priority, Task, TaskKind, TaskStatus};
