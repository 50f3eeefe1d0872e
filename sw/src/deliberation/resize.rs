//! Re-estimation deliberation
//!
//! After thresholded repeated kills, a short multi-persona conversation
//! decides whether the task's complexity estimate was wrong. Personas
//! respond in a fixed round-robin over a shared transcript; the facilitator
//! closes with a structured verdict. Everything here runs outside the board
//! mutex - these calls take tens of seconds.

use tracing::{debug, warn};

use crate::domain::{Complexity, ResurrectionRecord, Task};
use crate::llm::{LlmRequest, Provider, extract};
use crate::prompts::PromptBuilder;

/// Fixed round-robin: each persona sees the transcript so far. The last one
/// must produce the verdict block.
const PERSONAS: [(&str, &str); 3] = [
    (
        "Estimator",
        "You size software tasks. Judge whether the kill evidence means the work is bigger than estimated.",
    ),
    (
        "Skeptic",
        "You challenge resizing. A wrong approach is not a bigger task; argue for keeping the estimate unless the evidence is strong.",
    ),
    (
        "Facilitator",
        "You synthesize the discussion and issue the final verdict. End with the requested YAML block.",
    ),
];

/// Outcome of one deliberation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeVerdict {
    pub consensus: bool,
    pub new_complexity: Option<Complexity>,
    pub reasoning: String,
}

/// Run the deliberation. None means the conversation failed or its verdict
/// did not parse - both non-fatal, the estimate simply stands.
pub async fn deliberate(
    provider: &dyn Provider,
    prompts: &PromptBuilder,
    task: &Task,
    last_kill: &ResurrectionRecord,
) -> Option<ResizeVerdict> {
    let base_prompt = match prompts.resize(task, last_kill) {
        Ok(p) => p,
        Err(e) => {
            warn!(task_id = %task.id, error = %e, "deliberate: failed to build prompt");
            return None;
        }
    };

    let mut transcript = String::new();
    let mut last_response = String::new();

    for (name, role) in PERSONAS {
        let prompt = if transcript.is_empty() {
            base_prompt.clone()
        } else {
            format!("{}\n\n## Discussion so far\n{}", base_prompt, transcript)
        };

        match provider.run(LlmRequest::new(prompt).with_system(role)).await {
            Ok(response) => {
                transcript.push_str(&format!("\n**{}:** {}\n", name, response.trim()));
                last_response = response;
            }
            Err(e) => {
                warn!(task_id = %task.id, persona = name, error = %e, "deliberate: persona call failed");
                return None;
            }
        }
    }

    parse_verdict(&task.id, &last_response)
}

fn parse_verdict(task_id: &str, response: &str) -> Option<ResizeVerdict> {
    let value = match extract::yaml_block(response) {
        Ok(v) => v,
        Err(e) => {
            warn!(%task_id, error = %e, "parse_verdict: could not parse re-estimation result");
            return None;
        }
    };

    let consensus = extract::bool_field(&value, "consensus", false);
    let reasoning = extract::str_field(&value, "reasoning");
    // Only sized complexities are acceptable resize targets
    let new_complexity = Complexity::parse(&extract::str_field(&value, "new_complexity")).filter(|c| c.rank().is_some());

    debug!(%task_id, consensus, ?new_complexity, "parse_verdict");
    Some(ResizeVerdict {
        consensus,
        new_complexity,
        reasoning,
    })
}
