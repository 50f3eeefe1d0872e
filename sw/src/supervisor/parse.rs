//! Completion report parsing
//!
//! On clean exit the agent's stdout should end with a YAML block carrying
//! artifacts, actual complexity and notes. Parsing is forgiving: a spike's
//! whole output becomes its findings, and an implementation without valid
//! metadata still completes - the engine never discards real work over
//! formatting.

use tracing::debug;

use crate::domain::{Complexity, TaskKind};
use crate::llm::extract;

/// Parsed attempt completion metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub artifacts: Vec<String>,
    pub actual_complexity: Complexity,
    pub notes: String,
}

/// Parse the completion block out of an attempt's full output
pub fn parse_completion(output: &str, kind: TaskKind) -> CompletionReport {
    match extract::yaml_block(output) {
        Ok(value) => {
            let actual = extract::str_field(&value, "actual_complexity");
            CompletionReport {
                artifacts: extract::string_list_field(&value, "artifacts"),
                actual_complexity: Complexity::parse(&actual).unwrap_or(Complexity::Unknown),
                notes: extract::str_field(&value, "notes"),
            }
        }
        Err(e) => {
            debug!(error = %e, ?kind, "parse_completion: no structured block");
            match kind {
                // The whole response IS the findings
                TaskKind::Spike => CompletionReport {
                    artifacts: Vec::new(),
                    actual_complexity: Complexity::Trivial,
                    notes: output.trim().to_string(),
                },
                TaskKind::Implementation => CompletionReport {
                    artifacts: Vec::new(),
                    actual_complexity: Complexity::Unknown,
                    notes: "Completed (could not parse completion metadata)".to_string(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_block() {
        let output = "I built it.\n```yaml\nartifacts:\n  - src/api.rs\n  - src/api_test.rs\nactual_complexity: medium\nnotes: \"watch the retry path\"\n```";
        let report = parse_completion(output, TaskKind::Implementation);
        assert_eq!(report.artifacts.len(), 2);
        assert_eq!(report.actual_complexity, Complexity::Medium);
        assert_eq!(report.notes, "watch the retry path");
    }

    #[test]
    fn test_spike_fallback_uses_whole_output() {
        let output = "I explored the auth system and found JWT tokens in src/auth.py.";
        let report = parse_completion(output, TaskKind::Spike);
        assert!(report.artifacts.is_empty());
        assert_eq!(report.actual_complexity, Complexity::Trivial);
        assert_eq!(report.notes, output);
    }

    #[test]
    fn test_implementation_fallback_is_diagnostic() {
        let output = "Did some work but forgot the format.";
        let report = parse_completion(output, TaskKind::Implementation);
        assert!(report.artifacts.is_empty());
        assert_eq!(report.actual_complexity, Complexity::Unknown);
        assert!(report.notes.contains("could not parse"));
    }

    #[test]
    fn test_unknown_complexity_string_maps_to_unknown() {
        let output = "```yaml\nartifacts: []\nactual_complexity: enormous\nnotes: \"\"\n```";
        let report = parse_completion(output, TaskKind::Implementation);
        assert_eq!(report.actual_complexity, Complexity::Unknown);
    }

    #[test]
    fn test_spike_with_valid_block_uses_it() {
        let output = "Findings...\n```yaml\nartifacts: []\nactual_complexity: small\nnotes: \"summarized\"\n```";
        let report = parse_completion(output, TaskKind::Spike);
        assert_eq!(report.actual_complexity, Complexity::Small);
        assert_eq!(report.notes, "summarized");
    }
}
