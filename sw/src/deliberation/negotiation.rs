//! Resurrection negotiation
//!
//! Before a killed task is retried, its agent must propose a concrete
//! adjustment and a guardian must approve it. This keeps retries from
//! re-running the exact approach that just died. At most `max_rounds`
//! proposal/verdict pairs; failure to agree falls back to a generic
//! adjustment at the call site.

use eyre::{Result, eyre};
use tracing::{debug, info};

use crate::domain::Task;
use crate::llm::{LlmRequest, Provider};
use crate::prompts::PromptBuilder;

const AGENT_ROLE: &str = "You are the engineering agent assigned to this task. You propose concrete, specific adjustments when an approach fails.";

const GUARDIAN_ROLE: &str = "You are the guardian: a skeptical reviewer of retry plans. You approve only adjustments that concretely address the failure, and reject vague or repeated approaches.";

/// Negotiate an adjustment for a killed task
///
/// Returns the approved adjustment text, or an error when no agreement was
/// reached (including LLM failures - the caller retries with a generic
/// adjustment either way).
pub async fn negotiate(
    provider: &dyn Provider,
    prompts: &PromptBuilder,
    task: &Task,
    kill_reason: &str,
    max_rounds: u32,
) -> Result<String> {
    let mut rejections = String::new();

    for round in 1..=max_rounds {
        let agent_prompt = prompts.negotiation_agent(task, kill_reason, &rejections)?;
        let proposal = provider
            .run(LlmRequest::new(agent_prompt).with_system(AGENT_ROLE))
            .await?
            .trim()
            .to_string();

        let guardian_prompt = prompts.negotiation_guardian(task, kill_reason, &proposal)?;
        let verdict = provider
            .run(LlmRequest::new(guardian_prompt).with_system(GUARDIAN_ROLE))
            .await?;
        let verdict_head = verdict.trim_start().to_uppercase();

        if verdict_head.starts_with("APPROVED") {
            info!(task_id = %task.id, round, "negotiate: adjustment approved");
            return Ok(proposal);
        }

        // Anything that is not an approval counts as a rejection
        debug!(task_id = %task.id, round, "negotiate: proposal rejected");
        rejections.push_str(&format!("Round {} rejected: {}\n", round, verdict.trim()));
    }

    Err(eyre!("could not reach agreement after {} negotiation rounds", max_rounds))
}
