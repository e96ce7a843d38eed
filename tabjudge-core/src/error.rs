//! Error types for the tabjudge core.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering the inference service boundary, evaluation strategies,
//! configuration, and dataset loading.

use std::path::PathBuf;

/// Top-level error type for the tabjudge core library.
#[derive(Debug, thiserror::Error)]
pub enum TabjudgeError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from a single attempt against the inference service.
///
/// All variants except `AuthFailed` are transient for retry purposes:
/// a non-conforming response from a nondeterministic service may well
/// conform on the next attempt, so schema failures are retried exactly
/// like connection failures.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("response does not conform to declared result shape: {message}")]
    SchemaMismatch { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from the evaluation strategies.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// Every attempt of a structured call failed. Carries the last
    /// underlying cause; never masked with a default score.
    #[error("structured call failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: LlmError,
    },

    /// A permanent (non-retryable) failure on a structured call.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Decomposition returned zero claims. Treated as a failure rather
    /// than a vacuously faithful insight.
    #[error("claim decomposition produced no claims")]
    EmptyDecomposition,
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from dataset loading and preparation.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("dataset file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unknown dataset: {name}")]
    UnknownDataset { name: String },
}

/// A type alias for results using the top-level `TabjudgeError`.
pub type Result<T> = std::result::Result<T, TabjudgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = TabjudgeError::Llm(LlmError::ApiRequest {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM error: API request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_schema_mismatch() {
        let err = LlmError::SchemaMismatch {
            message: "missing field `claims`".into(),
        };
        assert_eq!(
            err.to_string(),
            "response does not conform to declared result shape: missing field `claims`"
        );
    }

    #[test]
    fn test_error_display_retry_exhausted() {
        let err = EvalError::RetryExhausted {
            attempts: 5,
            source: LlmError::Connection {
                message: "dns failure".into(),
            },
        };
        assert_eq!(
            err.to_string(),
            "structured call failed after 5 attempts: Provider connection failed: dns failure"
        );
    }

    #[test]
    fn test_error_display_empty_decomposition() {
        let err = TabjudgeError::Eval(EvalError::EmptyDecomposition);
        assert_eq!(
            err.to_string(),
            "Evaluation error: claim decomposition produced no claims"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = TabjudgeError::Config(ConfigError::EnvVarMissing {
            var: "OPENAI_API_KEY".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Environment variable not set: OPENAI_API_KEY"
        );
    }

    #[test]
    fn test_error_display_data() {
        let err = DataError::UnknownDataset {
            name: "wikisql".into(),
        };
        assert_eq!(err.to_string(), "unknown dataset: wikisql");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TabjudgeError = io_err.into();
        assert!(matches!(err, TabjudgeError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: TabjudgeError = serde_err.into();
        assert!(matches!(err, TabjudgeError::Serialization(_)));
    }

    #[test]
    fn test_llm_error_variants() {
        let err = LlmError::RateLimited {
            retry_after_secs: 60,
        };
        assert_eq!(err.to_string(), "Rate limited by provider, retry after 60s");

        let err = LlmError::Timeout { timeout_secs: 30 };
        assert_eq!(err.to_string(), "Request timed out after 30s");
    }
}
