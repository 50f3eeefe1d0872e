//! Direct HTTP API provider
//!
//! In-process alternative to the agent CLI for environments without one.
//! There is no subprocess, so `spawn` yields a pid-less channel: the
//! supervisor cannot probe CPU or sockets and degrades to heartbeat and
//! silence rules only.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::debug;

use super::error::LlmError;
use super::provider::{AgentChannel, ChannelEvent, LlmRequest, Provider};
use crate::config::LlmConfig;

/// Messages-API client provider
#[derive(Clone)]
pub struct ApiProvider {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl ApiProvider {
    /// Create a provider from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::InvalidResponse(format!("Environment variable {} not set", config.api_key_env)))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    async fn call(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{"role": "user", "content": request.prompt}],
        });
        if let Some(system) = &request.system_prompt {
            body["system"] = serde_json::json!(system);
        }

        let mut http_request = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body);
        if let Some(timeout) = request.timeout {
            http_request = http_request.timeout(timeout);
        }

        debug!(model = %self.model, "call: sending messages request");
        let response = http_request.send().await.map_err(LlmError::Network)?;
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(60));
            return Err(LlmError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
            })
            .collect::<Vec<_>>()
            .join("");
        Ok(text)
    }
}

#[async_trait]
impl Provider for ApiProvider {
    async fn run(&self, request: LlmRequest) -> Result<String, LlmError> {
        self.call(&request).await
    }

    async fn spawn(&self, request: LlmRequest) -> Result<Box<dyn AgentChannel>, LlmError> {
        let provider = self.clone();
        let handle = tokio::spawn(async move { provider.call(&request).await });
        Ok(Box::new(ApiChannel {
            handle: Some(handle),
            pending: VecDeque::new(),
            done: false,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text { text: String },
}

/// Pid-less channel over one in-flight API call
struct ApiChannel {
    handle: Option<JoinHandle<Result<String, LlmError>>>,
    pending: VecDeque<ChannelEvent>,
    done: bool,
}

#[async_trait]
impl AgentChannel for ApiChannel {
    fn pid(&self) -> Option<i32> {
        None
    }

    async fn recv(&mut self) -> Option<ChannelEvent> {
        if let Some(event) = self.pending.pop_front() {
            if matches!(event, ChannelEvent::Exited { .. }) {
                self.done = true;
            }
            return Some(event);
        }
        if self.done {
            return None;
        }

        // Await by reference so a cancelled recv (dropped mid-poll by the
        // supervisor's select loop) does not lose the in-flight call
        let handle = self.handle.as_mut()?;
        let joined = handle.await;
        self.handle = None;
        match joined {
            Ok(Ok(text)) => {
                for line in text.lines() {
                    self.pending.push_back(ChannelEvent::Line(line.to_string()));
                }
                self.pending.push_back(ChannelEvent::Exited {
                    success: true,
                    detail: "api call complete".to_string(),
                });
            }
            Ok(Err(e)) => {
                self.pending.push_back(ChannelEvent::Exited {
                    success: false,
                    detail: e.to_string(),
                });
            }
            Err(_) => {
                self.pending.push_back(ChannelEvent::Exited {
                    success: false,
                    detail: "cancelled".to_string(),
                });
            }
        }

        let event = self.pending.pop_front();
        if matches!(event, Some(ChannelEvent::Exited { .. })) {
            self.done = true;
        }
        event
    }

    async fn kill(&mut self, _grace: Duration) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}
