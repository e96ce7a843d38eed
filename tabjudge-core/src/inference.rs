//! Structured inference client.
//!
//! The only wire-level dependency of the evaluator: a prompt plus a declared
//! result shape go out, a validated typed value comes back. Owns the
//! retry/backoff policy shared by both evaluation strategies.

use crate::config::RetryConfig;
use crate::error::{EvalError, LlmError};
use crate::types::{CompletionRequest, CompletionResponse, Content, FunctionSpec, Message};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// Trait for LLM providers backing the structured client.
#[async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Execute an async operation with exponential backoff retry on failure.
///
/// Schema-conformance failures are retried exactly like transient service
/// errors: the same nondeterministic service may conform on the next
/// attempt. Permanent errors (auth) return immediately. Once the attempt
/// budget is exhausted the last error is surfaced as
/// [`EvalError::RetryExhausted`] — never replaced with a default value.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, EvalError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(EvalError::Llm(e));
                }
                if attempt + 1 == max_attempts {
                    return Err(EvalError::RetryExhausted {
                        attempts: max_attempts,
                        source: e,
                    });
                }

                let backoff_ms = compute_backoff(config, attempt, &e);
                warn!(
                    attempt = attempt + 1,
                    max = max_attempts,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Structured call attempt failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Check if an error is retryable.
fn is_retryable(err: &LlmError) -> bool {
    matches!(
        err,
        LlmError::ApiRequest { .. }
            | LlmError::ResponseParse { .. }
            | LlmError::SchemaMismatch { .. }
            | LlmError::RateLimited { .. }
            | LlmError::Timeout { .. }
            | LlmError::Connection { .. }
    )
}

/// Compute backoff delay, respecting rate limit retry-after headers.
fn compute_backoff(config: &RetryConfig, attempt: u32, err: &LlmError) -> u64 {
    if let LlmError::RateLimited { retry_after_secs } = err {
        let server_ms = retry_after_secs * 1000;
        let computed = compute_exponential_backoff(config, attempt);
        return server_ms.max(computed);
    }
    compute_exponential_backoff(config, attempt)
}

/// Pure exponential backoff with optional jitter.
fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        // Add up to 25% jitter
        let jitter = (capped as f64 * 0.25 * rand_simple()) as u64;
        capped + jitter
    } else {
        capped
    }
}

/// Simple deterministic pseudo-random for jitter (avoids pulling in rand crate).
fn rand_simple() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Client that issues structured calls against an LLM provider.
///
/// A structured call sends a chat-style prompt together with a
/// [`FunctionSpec`] declaring the exact result shape, forces the model to
/// call that function, and deserializes the returned arguments into a typed
/// value. A response that does not conform to the shape is a failure, not a
/// partial success.
///
/// Temperature defaults to 0.0 to bias toward reproducible judgments, but
/// identical inputs are not guaranteed identical outputs: the remote service
/// is nondeterministic even at temperature zero.
#[derive(Clone)]
pub struct StructuredClient {
    provider: Arc<dyn LlmProvider>,
    retry: RetryConfig,
    temperature: f32,
    max_tokens: Option<usize>,
}

impl StructuredClient {
    pub fn new(provider: Arc<dyn LlmProvider>, retry: RetryConfig) -> Self {
        Self {
            provider,
            retry,
            temperature: 0.0,
            max_tokens: None,
        }
    }

    /// Override the sampling temperature passed on every call.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cap the tokens generated per response.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Issue a structured call and return the value conforming to `function`'s
    /// declared shape, retrying per the configured policy.
    pub async fn call<T>(
        &self,
        system: &str,
        prompt: &str,
        function: &FunctionSpec,
    ) -> Result<T, EvalError>
    where
        T: DeserializeOwned + std::fmt::Debug,
    {
        let value = with_retry(&self.retry, || self.attempt::<T>(system, prompt, function)).await?;
        trace!(
            model = self.model_name(),
            prompt = prompt,
            value = ?value,
            "Structured call succeeded"
        );
        Ok(value)
    }

    /// One attempt: send the request, demand the forced function call back,
    /// and validate its arguments against the declared shape.
    async fn attempt<T>(
        &self,
        system: &str,
        prompt: &str,
        function: &FunctionSpec,
    ) -> Result<T, LlmError>
    where
        T: DeserializeOwned,
    {
        let request = CompletionRequest {
            messages: vec![Message::system(system), Message::user(prompt)],
            functions: vec![function.clone()],
            function_call: Some(function.name.clone()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            model: None,
        };

        let response = self.provider.complete(request).await?;
        let arguments = match response.message.content {
            Content::FunctionCall {
                name, arguments, ..
            } if name == function.name => arguments,
            Content::FunctionCall { name, .. } => {
                return Err(LlmError::SchemaMismatch {
                    message: format!("model called '{}', expected '{}'", name, function.name),
                });
            }
            Content::Text { .. } => {
                return Err(LlmError::SchemaMismatch {
                    message: format!("model returned free text instead of '{}'", function.name),
                });
            }
        };

        serde_json::from_value::<T>(arguments).map_err(|e| LlmError::SchemaMismatch {
            message: e.to_string(),
        })
    }
}

/// Mock LLM provider for tests: pops queued outcomes in FIFO order and
/// counts calls.
#[derive(Debug)]
pub struct MockLlmProvider {
    model: String,
    outcomes: std::sync::Mutex<std::collections::VecDeque<Result<CompletionResponse, LlmError>>>,
    calls: std::sync::atomic::AtomicU32,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            outcomes: std::sync::Mutex::new(std::collections::VecDeque::new()),
            calls: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Queue a successful response for the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.outcomes.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a failure for the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.outcomes.lock().unwrap().push_back(Err(error));
    }

    /// Number of `complete` calls observed so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Create a function call response for testing.
    pub fn function_call_response(name: &str, arguments: serde_json::Value) -> CompletionResponse {
        let call_id = format!("call_{}", uuid::Uuid::new_v4());
        CompletionResponse {
            message: Message::new(
                crate::types::Role::Assistant,
                Content::function_call(call_id, name, arguments),
            ),
            usage: crate::types::TokenUsage {
                input_tokens: 100,
                output_tokens: 30,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("function_call".to_string()),
        }
    }

    /// Create a plain text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: crate::types::TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::ApiRequest {
                    message: "mock provider has no queued outcomes".to_string(),
                })
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
