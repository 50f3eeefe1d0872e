//! Validation step execution
//!
//! The board may carry shell commands that prove the goal works (test
//! suites, builds, smoke scripts). They run after the scheduler drains,
//! sequentially, stopping at the first failure; the critic sees the result.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

/// Result of running one step
#[derive(Debug, Clone)]
pub struct StepResult {
    pub command: String,
    pub exit_code: i32,
    pub output: String,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Combined result of a validation run
#[derive(Debug, Clone, Default)]
pub struct ValidationRun {
    pub steps: Vec<StepResult>,
}

impl ValidationRun {
    pub fn passed(&self) -> bool {
        self.steps.iter().all(StepResult::passed)
    }

    /// Compact summary for the critic prompt
    pub fn summary(&self) -> String {
        if self.steps.is_empty() {
            return String::new();
        }
        self.steps
            .iter()
            .map(|step| {
                let tail: String = step.output.chars().rev().take(500).collect::<Vec<_>>().into_iter().rev().collect();
                if step.passed() {
                    format!("step `{}` passed", step.command)
                } else {
                    format!("step `{}` FAILED (exit {})\n{}", step.command, step.exit_code, tail)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Run each step in order, stopping on the first failure
pub async fn run_validate_steps(steps: &[String], project_dir: &Path, timeout: Duration) -> ValidationRun {
    let mut run = ValidationRun::default();

    for command in steps {
        debug!(%command, "run_validate_steps: executing");
        let start = std::time::Instant::now();

        let output = tokio::time::timeout(
            timeout,
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(project_dir)
                .output(),
        )
        .await;

        let step = match output {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                StepResult {
                    command: command.clone(),
                    exit_code: output.status.code().unwrap_or(-1),
                    output: combined,
                    duration_ms: start.elapsed().as_millis() as u64,
                }
            }
            Ok(Err(e)) => StepResult {
                command: command.clone(),
                exit_code: -1,
                output: format!("failed to run: {}", e),
                duration_ms: start.elapsed().as_millis() as u64,
            },
            Err(_) => StepResult {
                command: command.clone(),
                exit_code: -1,
                output: "validation step timed out".to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        };

        let passed = step.passed();
        info!(%command, exit_code = step.exit_code, passed, "run_validate_steps: step finished");
        run.steps.push(step);
        if !passed {
            break;
        }
    }

    run
}
