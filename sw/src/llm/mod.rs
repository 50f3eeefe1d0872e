//! LLM backend module
//!
//! The provider abstraction plus the two shipped backends: the agent CLI
//! subprocess (primary - yields a pid the supervisor can probe) and the
//! direct HTTP API (pid-less, degraded supervision).

use std::sync::Arc;

mod api;
mod error;
pub mod extract;
mod provider;
mod subprocess;

pub use api::ApiProvider;
pub use error::LlmError;
pub use provider::{AgentChannel, ChannelEvent, LlmRequest, Provider};
pub use subprocess::CliProvider;

#[cfg(test)]
pub use provider::mock;

use crate::config::LlmConfig;

/// Create a provider from configuration
///
/// Supports "cli" and "api" providers.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn Provider>, LlmError> {
    match config.provider.as_str() {
        "cli" => Ok(Arc::new(CliProvider::from_config(config))),
        "api" => Ok(Arc::new(ApiProvider::from_config(config)?)),
        other => Err(LlmError::InvalidResponse(format!(
            "Unknown LLM provider: '{}'. Supported: cli, api",
            other
        ))),
    }
}
