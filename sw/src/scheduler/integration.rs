//! Architecture contract and wave integration check
//!
//! The contract is a binding technical spec generated once per plan when at
//! least two Implementation tasks will run (parallelism is what makes
//! coordination necessary). Between waves, completed Implementation
//! artifacts are read back and checked against it; deviations accumulate in
//! the board's integration notes and flow into every later prompt.

use std::path::Path;

use eyre::Result;
use tracing::{debug, info, warn};

use crate::domain::{Board, Task, TaskKind};
use crate::llm::{LlmRequest, Provider};
use crate::prompts::PromptBuilder;

/// Literal token meaning "no deviations found"
pub const ALL_CLEAR: &str = "ALL_CLEAR";

/// Per-file cap when bundling artifact contents into the check prompt
const FILE_TRUNCATE_CHARS: usize = 4000;

/// Generate the architecture contract for a freshly planned board
///
/// Returns an empty string when fewer than two Implementation tasks exist:
/// no parallelism means no coordination needed.
pub async fn generate_contract(provider: &dyn Provider, prompts: &PromptBuilder, board: &Board) -> Result<String> {
    // Completed history does not need coordinating; count the work ahead
    let impl_count = board
        .tasks
        .iter()
        .filter(|t| t.kind == TaskKind::Implementation && !t.is_terminal())
        .count();
    if impl_count < 2 {
        debug!(impl_count, "generate_contract: skipped, not enough implementation tasks");
        return Ok(String::new());
    }

    let prompt = prompts.contract(board)?;
    let system = "You are generating a binding technical contract for parallel agents. Be precise and specific. Output ONLY markdown.";
    let contract = provider.run(LlmRequest::new(prompt).with_system(system)).await?;
    info!(chars = contract.len(), "generate_contract: contract generated");
    Ok(contract.trim().to_string())
}

/// Check a completed wave's Implementation artifacts against the contract
///
/// Reads each artifact path relative to `project_dir` (unreadable files are
/// skipped), truncated per file. Returns Some(deviations) when the check
/// found problems, None for ALL_CLEAR or when the check itself failed.
pub async fn check_wave(
    provider: &dyn Provider,
    prompts: &PromptBuilder,
    project_dir: &Path,
    contract: &str,
    wave_tasks: &[Task],
) -> Option<String> {
    if contract.is_empty() {
        return None;
    }
    let impl_tasks: Vec<&Task> = wave_tasks
        .iter()
        .filter(|t| t.kind == TaskKind::Implementation)
        .collect();
    if impl_tasks.is_empty() {
        return None;
    }

    let mut file_sections = Vec::new();
    for task in &impl_tasks {
        for artifact in &task.artifacts {
            let full_path = project_dir.join(artifact);
            match tokio::fs::read_to_string(&full_path).await {
                Ok(mut content) => {
                    if content.len() > FILE_TRUNCATE_CHARS {
                        let mut cut = FILE_TRUNCATE_CHARS;
                        while !content.is_char_boundary(cut) {
                            cut -= 1;
                        }
                        content.truncate(cut);
                        content.push_str("\n... [truncated]");
                    }
                    file_sections.push(format!("### {}\n```\n{}\n```", artifact, content));
                }
                Err(_) => {
                    // Missing or unreadable artifacts are not the check's
                    // problem; the contract comparison works on what exists
                    debug!(path = %full_path.display(), "check_wave: skipping unreadable artifact");
                }
            }
        }
    }

    let files_section = if file_sections.is_empty() {
        "(no artifact files found)".to_string()
    } else {
        file_sections.join("\n\n")
    };

    let prompt = match prompts.integration_check(contract, &impl_tasks, &files_section) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "check_wave: failed to build prompt");
            return None;
        }
    };
    let system = "You are checking integration compliance against the architecture contract. Be precise.";

    match provider.run(LlmRequest::new(prompt).with_system(system)).await {
        Ok(response) => {
            let response = response.trim().to_string();
            if response.is_empty() || response.contains(ALL_CLEAR) {
                debug!("check_wave: all clear");
                None
            } else {
                info!(chars = response.len(), "check_wave: deviations found");
                Some(response)
            }
        }
        Err(e) => {
            warn!(error = %e, "check_wave: integration check failed, continuing");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Mode;
    use crate::llm::mock::MockProvider;
    use tempfile::tempdir;

    fn board_with_impls(n: usize) -> Board {
        let mut board = Board::new("goal", "", Mode::Sprint);
        for i in 0..n {
            board.tasks.push(Task::new(format!("impl-{}", i), "Build"));
        }
        board
    }

    #[tokio::test]
    async fn test_contract_skipped_for_single_implementation() {
        let provider = MockProvider::new(vec!["should not be called"]);
        let prompts = PromptBuilder::new();
        let board = board_with_impls(1);

        let contract = generate_contract(&provider, &prompts, &board).await.unwrap();
        assert!(contract.is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_contract_generated_for_two_implementations() {
        let provider = MockProvider::new(vec!["# Contract\nUse tokio."]);
        let prompts = PromptBuilder::new();
        let board = board_with_impls(2);

        let contract = generate_contract(&provider, &prompts, &board).await.unwrap();
        assert_eq!(contract, "# Contract\nUse tokio.");
    }

    #[tokio::test]
    async fn test_spikes_do_not_count_toward_contract() {
        let provider = MockProvider::new(vec!["unused"]);
        let prompts = PromptBuilder::new();
        let mut board = board_with_impls(1);
        board.tasks.push(Task::new("spike", "Look").with_kind(TaskKind::Spike));

        let contract = generate_contract(&provider, &prompts, &board).await.unwrap();
        assert!(contract.is_empty());
    }

    #[tokio::test]
    async fn test_check_wave_all_clear_is_none() {
        let dir = tempdir().unwrap();
        let provider = MockProvider::new(vec![ALL_CLEAR]);
        let prompts = PromptBuilder::new();
        let mut task = Task::new("a", "A");
        task.artifacts = vec!["missing.rs".to_string()];

        let result = check_wave(&provider, &prompts, dir.path(), "contract", &[task]).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_check_wave_reports_deviations_with_file_contents() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("api.rs"), "fn wrong_signature() {}").unwrap();

        let provider = MockProvider::new(vec!["api.rs: wrong_signature does not match the contract"]);
        let prompts = PromptBuilder::new();
        let mut task = Task::new("a", "A");
        task.artifacts = vec!["api.rs".to_string()];

        let result = check_wave(&provider, &prompts, dir.path(), "contract", std::slice::from_ref(&task)).await;
        assert!(result.unwrap().contains("wrong_signature"));

        // The prompt must have carried the artifact body
        let calls = provider.calls.lock().unwrap();
        assert!(calls[0].prompt.contains("fn wrong_signature"));
    }

    #[tokio::test]
    async fn test_check_wave_skips_without_contract_or_impls() {
        let dir = tempdir().unwrap();
        let provider = MockProvider::new(vec!["unused"]);
        let prompts = PromptBuilder::new();

        assert!(check_wave(&provider, &prompts, dir.path(), "", &[Task::new("a", "A")]).await.is_none());

        let spike = Task::new("s", "S").with_kind(TaskKind::Spike);
        assert!(check_wave(&provider, &prompts, dir.path(), "contract", &[spike]).await.is_none());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_check_wave_llm_failure_is_none() {
        let dir = tempdir().unwrap();
        let provider = MockProvider::new(vec![]);
        let prompts = PromptBuilder::new();

        let result = check_wave(&provider, &prompts, dir.path(), "contract", &[Task::new("a", "A")]).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_large_artifact_truncated() {
        let dir = tempdir().unwrap();
        let big = "x".repeat(10_000);
        std::fs::write(dir.path().join("big.rs"), &big).unwrap();

        let provider = MockProvider::new(vec![ALL_CLEAR]);
        let prompts = PromptBuilder::new();
        let mut task = Task::new("a", "A");
        task.artifacts = vec!["big.rs".to_string()];

        check_wave(&provider, &prompts, dir.path(), "contract", &[task]).await;
        let calls = provider.calls.lock().unwrap();
        assert!(calls[0].prompt.contains("[truncated]"));
        assert!(calls[0].prompt.len() < 10_000);
    }
}
