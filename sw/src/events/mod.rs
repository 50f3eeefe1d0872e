//! Engine event streaming
//!
//! Typed events on a broadcast bus. Best-effort by design: observers can
//! come and go, lag, or not exist at all.

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, create_event_bus};
pub use types::{EngineEvent, TaskSummary};
