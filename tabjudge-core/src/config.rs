//! Configuration system for tabjudge.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace config -> environment -> explicit overrides. Configuration is
//! loaded from `~/.config/tabjudge/config.toml` and/or
//! `.tabjudge/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the tabjudge evaluator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JudgeConfig {
    pub llm: LlmConfig,
    pub eval: EvalConfig,
    pub data: DataConfig,
}

/// Configuration for the LLM provider used as judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai" or any OpenAI-compatible endpoint.
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o", "gpt-4o-mini").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Sampling temperature for judgments. Kept at 0.0 to bias toward
    /// reproducible verdicts; the service itself is still nondeterministic.
    pub temperature: f32,
    /// Per-request timeout, independent of the retry budget.
    pub request_timeout_secs: u64,
    /// Retry/backoff policy for structured calls.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            max_tokens: 1024,
            temperature: 0.0,
            request_timeout_secs: 120,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry policy for structured inference calls.
///
/// `max_attempts` counts total attempts: a call that never succeeds is
/// surfaced as exhausted after exactly `max_attempts` requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Configuration for the evaluation strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Bounded concurrency across evaluation units. 1 = sequential.
    pub concurrency: usize,
    /// Aggregation policy name for claim-level verification:
    /// "all", "majority", or "threshold:<fraction>".
    pub aggregation: String,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            aggregation: "all".to_string(),
        }
    }
}

/// Configuration for dataset locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory containing the input JSON files.
    pub data_dir: PathBuf,
    /// Directory where prepared datasets and results are written.
    pub output_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            output_dir: PathBuf::from("./data/outputs"),
        }
    }
}

/// Load configuration with the following precedence (highest to lowest):
///
/// 1. Explicit overrides
/// 2. Environment variables (`TABJUDGE_LLM__MODEL`, `TABJUDGE_EVAL__CONCURRENCY`, ...)
/// 3. Workspace-local config (`.tabjudge/config.toml`)
/// 4. User config (`~/.config/tabjudge/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&JudgeConfig>,
) -> Result<JudgeConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(JudgeConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "tabjudge", "tabjudge") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".tabjudge").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed("TABJUDGE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = JudgeConfig::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.llm.retry.max_attempts, 5);
        assert_eq!(config.eval.concurrency, 1);
        assert_eq!(config.eval.aggregation, "all");
    }

    #[test]
    fn test_retry_defaults_match_backoff_schedule() {
        let retry = RetryConfig::default();
        // 2s, 4s, 8s, 16s between the five attempts
        assert_eq!(retry.initial_backoff_ms, 2_000);
        assert_eq!(retry.backoff_multiplier, 2.0);
        assert!(retry.jitter);
    }

    #[test]
    fn test_load_config_defaults_without_files() {
        let tmp = tempfile::tempdir().unwrap();
        let config = load_config(Some(tmp.path()), None).unwrap();
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_load_config_workspace_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg_dir = tmp.path().join(".tabjudge");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "[llm]\nmodel = \"gpt-4o\"\n\n[eval]\nconcurrency = 8\n",
        )
        .unwrap();

        let config = load_config(Some(tmp.path()), None).unwrap();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.eval.concurrency, 8);
        // Untouched sections keep their defaults
        assert_eq!(config.llm.provider, "openai");
    }

    #[test]
    fn test_load_config_overrides_win() {
        let tmp = tempfile::tempdir().unwrap();
        let overrides = JudgeConfig {
            llm: LlmConfig {
                model: "gpt-4-turbo".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let config = load_config(Some(tmp.path()), Some(&overrides)).unwrap();
        assert_eq!(config.llm.model, "gpt-4-turbo");
    }
}
