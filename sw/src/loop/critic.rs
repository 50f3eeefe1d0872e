//! Critic - judges whether an iteration achieved the goal
//!
//! Skeptical by instruction, forgiving by construction: a critic whose
//! verdict cannot be parsed counts as success-unknown, finishing the
//! iteration rather than looping on garbage.

use tracing::{info, warn};

use crate::domain::Board;
use crate::llm::{LlmRequest, Provider, extract};
use crate::prompts::PromptBuilder;

const CRITIC_ROLE: &str = "You are a critical code reviewer evaluating sprint results. \
Be skeptical. Don't assume success just because tasks were marked complete. \
Check if the goal was actually achieved. Focus on whether the OUTCOME was \
achieved, not HOW. Output ONLY valid YAML, no explanations outside the yaml block.";

/// The critic's ruling on one finished iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticVerdict {
    pub success: bool,
    pub reasoning: String,
    pub follow_up_goal: String,
    pub follow_up_context: String,
}

impl CriticVerdict {
    /// The default when the critic cannot be consulted or parsed
    fn success_unknown(reasoning: impl Into<String>) -> Self {
        Self {
            success: true,
            reasoning: reasoning.into(),
            follow_up_goal: String::new(),
            follow_up_context: String::new(),
        }
    }
}

/// Evaluate the finished board
pub async fn evaluate(
    provider: &dyn Provider,
    prompts: &PromptBuilder,
    board: &Board,
    validation_summary: &str,
) -> CriticVerdict {
    let prompt = match prompts.critic(board, validation_summary) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "evaluate: failed to build critic prompt");
            return CriticVerdict::success_unknown("Could not build evaluation prompt");
        }
    };

    let response = match provider.run(LlmRequest::new(prompt).with_system(CRITIC_ROLE)).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "evaluate: critic call failed");
            return CriticVerdict::success_unknown("Evaluation call failed");
        }
    };

    let value = match extract::yaml_block(&response) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "evaluate: could not parse critic verdict");
            return CriticVerdict::success_unknown("Could not parse evaluation");
        }
    };

    let success = extract::bool_field(&value, "success", true);
    let reasoning = extract::str_field(&value, "reasoning");
    // Follow-ups only make sense for failed iterations
    let (follow_up_goal, follow_up_context) = if success {
        (String::new(), String::new())
    } else {
        (
            extract::str_field(&value, "follow_up_goal"),
            extract::str_field(&value, "follow_up_context"),
        )
    };

    info!(success, "evaluate: critic ruled");
    CriticVerdict {
        success,
        reasoning,
        follow_up_goal,
        follow_up_context,
    }
}
