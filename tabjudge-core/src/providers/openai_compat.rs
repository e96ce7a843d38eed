//! OpenAI-compatible LLM provider.
//!
//! Supports OpenAI, Azure OpenAI, Ollama, vLLM, LM Studio, and any endpoint
//! that follows the OpenAI chat completions API format, using the
//! function-calling mode to obtain structured responses.

use crate::config::LlmConfig;
use crate::error::{ConfigError, LlmError};
use crate::inference::LlmProvider;
use crate::types::{
    CompletionRequest, CompletionResponse, Content, FunctionSpec, Message, Role, TokenUsage,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible LLM provider.
#[derive(Debug)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, ConfigError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            timeout_secs: config.request_timeout_secs,
        })
    }

    /// Convert internal messages to OpenAI JSON format.
    fn messages_to_json(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                };
                match &msg.content {
                    Content::Text { text } => json!({
                        "role": role,
                        "content": text,
                    }),
                    Content::FunctionCall {
                        id,
                        name,
                        arguments,
                    } => json!({
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": name,
                                "arguments": arguments.to_string(),
                            }
                        }]
                    }),
                }
            })
            .collect()
    }

    /// Convert declared result shapes to the OpenAI tools format.
    fn functions_to_json(functions: &[FunctionSpec]) -> Vec<Value> {
        functions
            .iter()
            .map(|f| {
                json!({
                    "type": "function",
                    "function": {
                        "name": f.name,
                        "description": f.description,
                        "parameters": f.parameters,
                    }
                })
            })
            .collect()
    }

    /// Parse an OpenAI-format response body into a CompletionResponse.
    fn parse_response(body: &Value, model: &str) -> Result<CompletionResponse, LlmError> {
        let choice =
            body.get("choices")
                .and_then(|c| c.get(0))
                .ok_or_else(|| LlmError::ResponseParse {
                    message: "No choices in response".to_string(),
                })?;

        let message = choice
            .get("message")
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No message in choice".to_string(),
            })?;

        let finish_reason = choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .map(|s| s.to_string());

        let content = if let Some(call) = message
            .get("tool_calls")
            .and_then(|t| t.as_array())
            .and_then(|calls| calls.first())
        {
            let id = call
                .get("id")
                .and_then(|i| i.as_str())
                .unwrap_or_default()
                .to_string();
            let func = call
                .get("function")
                .ok_or_else(|| LlmError::ResponseParse {
                    message: "tool call without function object".to_string(),
                })?;
            let name = func
                .get("name")
                .and_then(|n| n.as_str())
                .ok_or_else(|| LlmError::ResponseParse {
                    message: "tool call without function name".to_string(),
                })?
                .to_string();
            let args_str = func
                .get("arguments")
                .and_then(|a| a.as_str())
                .ok_or_else(|| LlmError::ResponseParse {
                    message: "tool call without arguments".to_string(),
                })?;
            // Malformed argument JSON is a failure, not an empty object
            let arguments: Value =
                serde_json::from_str(args_str).map_err(|e| LlmError::ResponseParse {
                    message: format!("tool call arguments are not valid JSON: {e}"),
                })?;
            Content::FunctionCall {
                id,
                name,
                arguments,
            }
        } else {
            Content::text(
                message
                    .get("content")
                    .and_then(|c| c.as_str())
                    .unwrap_or(""),
            )
        };

        let usage_obj = body.get("usage");
        let usage = TokenUsage {
            input_tokens: usage_obj
                .and_then(|u| u.get("prompt_tokens"))
                .and_then(|t| t.as_u64())
                .unwrap_or(0) as usize,
            output_tokens: usage_obj
                .and_then(|u| u.get("completion_tokens"))
                .and_then(|t| t.as_u64())
                .unwrap_or(0) as usize,
        };

        let resp_model = body
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(model)
            .to_string();

        Ok(CompletionResponse {
            message: Message::new(Role::Assistant, content),
            usage,
            model: resp_model,
            finish_reason,
        })
    }

    /// Map an HTTP status code to the appropriate LlmError.
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, "Authentication failed");
                LlmError::AuthFailed {
                    provider: "OpenAI-compatible".to_string(),
                }
            }
            429 => {
                // Try to parse retry-after from "Rate limit... try again in Xs"
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.get("error")?
                            .get("message")?
                            .as_str()
                            .map(|s| s.to_string())
                    })
                    .and_then(|msg| {
                        msg.split("in ")
                            .last()
                            .and_then(|s| s.trim_end_matches('s').parse::<u64>().ok())
                    })
                    .unwrap_or(5);
                LlmError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            status if status >= 500 => LlmError::ApiRequest {
                message: format!("Server error ({}): {}", status, body),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {}: {}", status, body),
            },
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else if e.is_connect() {
            LlmError::Connection {
                message: e.to_string(),
            }
        } else {
            LlmError::ApiRequest {
                message: format!("Request failed: {}", e),
            }
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": Self::messages_to_json(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !request.functions.is_empty() {
            body["tools"] = json!(Self::functions_to_json(&request.functions));
        }
        if let Some(name) = &request.function_call {
            body["tool_choice"] = json!({
                "type": "function",
                "function": { "name": name }
            });
        }

        debug!(url = %url, model = %self.model, "Sending OpenAI completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| LlmError::ApiRequest {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;

        Self::parse_response(&json, &self.model)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new_with_key(&LlmConfig::default(), "sk-test".to_string())
            .unwrap()
    }

    #[test]
    fn test_messages_to_json_roles() {
        let messages = vec![Message::system("be a judge"), Message::user("verify this")];
        let json = OpenAiCompatibleProvider::messages_to_json(&messages);
        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[0]["content"], "be a judge");
        assert_eq!(json[1]["role"], "user");
    }

    #[test]
    fn test_functions_to_json_wraps_in_tools_format() {
        let spec = FunctionSpec {
            name: "verify_claim".to_string(),
            description: "verdict".to_string(),
            parameters: json!({"type": "object"}),
        };
        let tools = OpenAiCompatibleProvider::functions_to_json(&[spec]);
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "verify_claim");
    }

    #[test]
    fn test_parse_response_extracts_tool_call() {
        let body = json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "verify_claim",
                            "arguments": "{\"faithfulness\": 1}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5 }
        });
        let response = OpenAiCompatibleProvider::parse_response(&body, "gpt-4o-mini").unwrap();
        match response.message.content {
            Content::FunctionCall {
                name, arguments, ..
            } => {
                assert_eq!(name, "verify_claim");
                assert_eq!(arguments["faithfulness"], 1);
            }
            other => panic!("expected function call, got {:?}", other),
        }
        assert_eq!(response.usage.input_tokens, 10);
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn test_parse_response_text_fallback() {
        let body = json!({
            "choices": [{
                "message": { "content": "plain text" },
                "finish_reason": "stop"
            }]
        });
        let response = OpenAiCompatibleProvider::parse_response(&body, "gpt-4o-mini").unwrap();
        assert_eq!(response.message.content.as_text(), Some("plain text"));
        assert_eq!(response.model, "gpt-4o-mini");
    }

    #[test]
    fn test_parse_response_no_choices_is_error() {
        let body = json!({ "choices": [] });
        let err = OpenAiCompatibleProvider::parse_response(&body, "m").unwrap_err();
        assert!(matches!(err, LlmError::ResponseParse { .. }));
    }

    #[test]
    fn test_parse_response_malformed_arguments_is_error() {
        let body = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "call_1",
                        "function": { "name": "verify_claim", "arguments": "not json" }
                    }]
                }
            }]
        });
        let err = OpenAiCompatibleProvider::parse_response(&body, "m").unwrap_err();
        assert!(matches!(err, LlmError::ResponseParse { .. }));
    }

    #[test]
    fn test_map_http_error_auth() {
        let err =
            OpenAiCompatibleProvider::map_http_error(reqwest::StatusCode::UNAUTHORIZED, "{}");
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }

    #[test]
    fn test_map_http_error_rate_limit_parses_retry_after() {
        let body = r#"{"error": {"message": "Rate limit reached, try again in 20s"}}"#;
        let err = OpenAiCompatibleProvider::map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            body,
        );
        match err {
            LlmError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 20),
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_map_http_error_server_error() {
        let err = OpenAiCompatibleProvider::map_http_error(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "oops",
        );
        assert!(matches!(err, LlmError::ApiRequest { .. }));
    }

    #[test]
    fn test_provider_reports_model_name() {
        assert_eq!(provider().model_name(), "gpt-4o-mini");
    }
}
