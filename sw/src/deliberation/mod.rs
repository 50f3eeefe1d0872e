//! Deliberative control paths
//!
//! The LLM conversations the engine runs about its own work: resurrection
//! negotiation before a retry, and re-estimation after repeated kills.
//! Both run strictly outside the board mutex.

pub mod negotiation;
pub mod resize;

pub use negotiation::negotiate;
pub use resize::{ResizeVerdict, deliberate};
