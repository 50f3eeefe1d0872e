//! swell configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main swell configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Engine-level knobs
    pub engine: EngineConfig,

    /// Optional log level override (CLI flag wins)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with fallback chain: explicit path, then
    /// project-local `.swell.yml`, then `~/.config/swell/swell.yml`,
    /// then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".swell.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("swell").join("swell.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "cli" (agent CLI subprocess) or "api" (direct HTTP)
    pub provider: String,

    /// Agent CLI binary (cli provider)
    pub bin: String,

    /// Base arguments passed to the agent CLI before any per-call flags
    pub args: Vec<String>,

    /// Model identifier (api provider)
    pub model: String,

    /// Environment variable containing the API key (api provider)
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL (api provider)
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response (api provider)
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds for one-shot calls
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "cli".to_string(),
            bin: "claude".to_string(),
            args: vec!["-p".to_string(), "--dangerously-skip-permissions".to_string()],
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 8192,
            timeout_ms: 600_000,
        }
    }
}

/// Engine-level knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Max concurrent supervised attempts
    #[serde(rename = "max-parallel")]
    pub max_parallel: usize,

    /// Hard cap on outer iterations; None keeps looping until the critic
    /// accepts or loop detection fires
    #[serde(rename = "max-iterations")]
    pub max_iterations: Option<u32>,

    /// Run the post-sprint cleanup pass
    #[serde(rename = "cleanup-pass")]
    pub cleanup_pass: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: 8,
            max_iterations: None,
            cleanup_pass: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.provider, "cli");
        assert_eq!(config.llm.bin, "claude");
        assert_eq!(config.engine.max_parallel, 8);
        assert!(config.engine.max_iterations.is_none());
    }

    #[test]
    fn test_parse_partial_config() {
        let yaml = r#"
llm:
  provider: api
  model: claude-opus-4
engine:
  max-parallel: 4
  max-iterations: 3
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.llm.provider, "api");
        assert_eq!(config.llm.model, "claude-opus-4");
        // Unspecified fields keep defaults
        assert_eq!(config.llm.api_key_env, "ANTHROPIC_API_KEY");
        assert_eq!(config.engine.max_parallel, 4);
        assert_eq!(config.engine.max_iterations, Some(3));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swell.yml");
        std::fs::write(&path, "engine:\n  max-parallel: 2\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.engine.max_parallel, 2);
    }

    #[test]
    fn test_load_missing_explicit_path_errors() {
        let path = PathBuf::from("/nonexistent/swell.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_load_project_local_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".swell.yml"), "engine:\n  max-parallel: 3\n").unwrap();

        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let config = Config::load(None);
        std::env::set_current_dir(original).unwrap();

        assert_eq!(config.unwrap().engine.max_parallel, 3);
    }
}
