//! Structured-block extraction from agent responses
//!
//! Agents end their responses with a fenced YAML block carrying completion
//! metadata or verdicts. LLM output is messy: the fence may be missing, the
//! body may carry markdown asterisks that YAML reads as alias syntax. This
//! module recovers a mapping from all of those shapes.

use eyre::{Result, bail, eyre};
use serde_yaml::Value;

/// Extract the YAML mapping from a response
///
/// Looks for a ```yaml fence first, then any ``` fence, then tries the full
/// text. Retries with markdown asterisks stripped before giving up.
pub fn yaml_block(response: &str) -> Result<Value> {
    let content = if let Some(start) = response.find("```yaml") {
        let body = &response[start + 7..];
        match body.find("```") {
            Some(end) => body[..end].trim(),
            None => body.trim(),
        }
    } else if let Some(start) = response.find("```") {
        let body = &response[start + 3..];
        match body.find("```") {
            Some(end) => body[..end].trim(),
            None => body.trim(),
        }
    } else {
        response.trim()
    };

    if content.len() < 5 {
        bail!("No YAML content found in response");
    }

    let value = match serde_yaml::from_str::<Value>(content) {
        Ok(v) => v,
        Err(_) => {
            // Unquoted *emphasis* parses as a YAML alias; strip and retry
            let cleaned: String = content.chars().filter(|c| *c != '*').collect();
            serde_yaml::from_str::<Value>(&cleaned).map_err(|e| eyre!("YAML parse error: {}", e))?
        }
    };

    if !value.is_mapping() {
        bail!("Expected a YAML mapping, got {:?}", value);
    }
    Ok(value)
}

/// Fetch a string field from an extracted mapping, empty if absent
pub fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

/// Fetch a bool field, with a default for absent/mistyped values
pub fn bool_field(value: &Value, key: &str, default: bool) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Fetch a list-of-strings field, empty if absent
pub fn string_list_field(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fenced_yaml() {
        let response = "Work is done.\n```yaml\nartifacts:\n  - src/main.rs\nactual_complexity: small\nnotes: \"done\"\n```\n";
        let value = yaml_block(response).unwrap();
        assert_eq!(str_field(&value, "actual_complexity"), "small");
        assert_eq!(string_list_field(&value, "artifacts"), vec!["src/main.rs".to_string()]);
    }

    #[test]
    fn test_extract_generic_fence() {
        let response = "```\nsuccess: true\nreasoning: looks good\n```";
        let value = yaml_block(response).unwrap();
        assert!(bool_field(&value, "success", false));
    }

    #[test]
    fn test_extract_bare_yaml() {
        let value = yaml_block("consensus: true\nnew_complexity: medium\n").unwrap();
        assert!(bool_field(&value, "consensus", false));
        assert_eq!(str_field(&value, "new_complexity"), "medium");
    }

    #[test]
    fn test_asterisks_stripped_on_retry() {
        let response = "```yaml\nnotes: *really* broken markdown\nsuccess: false\n```";
        let value = yaml_block(response).unwrap();
        assert!(str_field(&value, "notes").contains("broken"));
    }

    #[test]
    fn test_non_mapping_rejected() {
        assert!(yaml_block("just a plain sentence with no structure").is_err());
    }

    #[test]
    fn test_too_short_rejected() {
        assert!(yaml_block("ok").is_err());
    }

    #[test]
    fn test_missing_fields_default() {
        let value = yaml_block("success: true\nextra: 1\n").unwrap();
        assert_eq!(str_field(&value, "reasoning"), "");
        assert!(string_list_field(&value, "artifacts").is_empty());
        assert!(!bool_field(&value, "consensus", false));
    }
}
