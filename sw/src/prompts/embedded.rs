//! Embedded prompt templates
//!
//! Compiled into the binary from .hbs files at build time.

pub const TASK_SYSTEM: &str = include_str!("../../prompts/task_system.hbs");
pub const TASK: &str = include_str!("../../prompts/task.hbs");
pub const NEGOTIATION_AGENT: &str = include_str!("../../prompts/negotiation_agent.hbs");
pub const NEGOTIATION_GUARDIAN: &str = include_str!("../../prompts/negotiation_guardian.hbs");
pub const RESIZE: &str = include_str!("../../prompts/resize.hbs");
pub const CONTRACT: &str = include_str!("../../prompts/contract.hbs");
pub const INTEGRATION_CHECK: &str = include_str!("../../prompts/integration_check.hbs");
pub const CRITIC: &str = include_str!("../../prompts/critic.hbs");
pub const CLEANUP: &str = include_str!("../../prompts/cleanup.hbs");
pub const LIVENESS_JUDGEMENT: &str = include_str!("../../prompts/liveness_judgement.hbs");
pub const PLAN: &str = include_str!("../../prompts/plan.hbs");

/// All (name, template) pairs for registration
pub fn all() -> [(&'static str, &'static str); 11] {
    [
        ("task_system", TASK_SYSTEM),
        ("task", TASK),
        ("negotiation_agent", NEGOTIATION_AGENT),
        ("negotiation_guardian", NEGOTIATION_GUARDIAN),
        ("resize", RESIZE),
        ("contract", CONTRACT),
        ("integration_check", INTEGRATION_CHECK),
        ("critic", CRITIC),
        ("cleanup", CLEANUP),
        ("liveness_judgement", LIVENESS_JUDGEMENT),
        ("plan", PLAN),
    ]
}
