// Anthropic Messages API adapter
// API Reference: https://docs.anthropic.com/en/api/messages
// Tool calls come back as `tool_use` content blocks whose `input` is already JSON.

use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage, ToolCall};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
// max_tokens is mandatory on this API
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicAdapter {
    client: Client,
    api_key: String,
    api_base: String,
}

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { name: String, input: Value },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicError,
}

#[derive(Deserialize)]
struct AnthropicError {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

impl AnthropicAdapter {
    pub fn new(api_key: &str) -> Self {
        Self::with_client(Client::new(), api_key, None)
    }

    pub fn with_client(client: Client, api_key: &str, api_base: Option<&str>) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            api_base: api_base
                .unwrap_or(ANTHROPIC_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        }
    }

    /// System messages are lifted into the top-level `system` field, the
    /// Messages API only accepts user/assistant turns.
    fn build_request(request: &LLMRequest) -> MessagesRequest {
        let mut system_parts: Vec<String> = request.system_instruction.iter().cloned().collect();
        let mut messages = Vec::with_capacity(request.messages.len());
        for message in &request.messages {
            if message.role == "system" {
                system_parts.push(message.content.clone());
            } else {
                messages.push(AnthropicMessage {
                    role: message.role.clone(),
                    content: message.content.clone(),
                });
            }
        }

        let tools = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.input_schema,
                })
            })
            .collect();

        MessagesRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            temperature: request.temperature,
            tools,
            tool_choice: request
                .tool_choice
                .as_ref()
                .map(|name| json!({ "type": "tool", "name": name })),
        }
    }
}

#[async_trait]
impl LLMAdapter for AnthropicAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = format!("{}/messages", self.api_base);
        let body = Self::build_request(request);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLMApi(format!("Anthropic request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if let Ok(error_response) = serde_json::from_str::<AnthropicErrorResponse>(&error_text) {
                return Err(AppError::LLMApi(format!(
                    "Anthropic API error ({}): {} (type: {:?})",
                    status, error_response.error.message, error_response.error.error_type
                )));
            }
            return Err(AppError::LLMApi(format!(
                "Anthropic API error ({}): {}",
                status, error_text
            )));
        }

        let messages: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMApi(format!("Failed to parse Anthropic response: {}", e)))?;

        let mut text = Vec::new();
        let mut tool_calls = Vec::new();
        for block in messages.content {
            match block {
                ContentBlock::Text { text: t } => text.push(t),
                ContentBlock::ToolUse { name, input } => tool_calls.push(ToolCall {
                    name,
                    arguments: input,
                }),
                ContentBlock::Other => {}
            }
        }

        let usage = messages
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content: text.join("\n"),
            finish_reason: messages.stop_reason.unwrap_or_else(|| "end_turn".to_string()),
            usage,
            tool_calls,
        })
    }
}

/// Model identifiers used by default
pub mod models {
    pub const CLAUDE_3_5_SONNET: &str = "claude-3-5-sonnet-latest";
    pub const DEFAULT: &str = CLAUDE_3_5_SONNET;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LLMMessage, ToolDefinition};

    fn request() -> LLMRequest {
        LLMRequest {
            model: models::DEFAULT.to_string(),
            messages: vec![
                LLMMessage::system("Extra system context"),
                LLMMessage::user("Make posts shorter"),
            ],
            max_tokens: None,
            temperature: Some(0.0),
            system_instruction: Some("You update writing rules.".to_string()),
            tools: vec![ToolDefinition::new(
                "update_ruleset",
                "Return the full ruleset",
                json!({ "type": "object", "properties": { "updatedRuleset": { "type": "array" } } }),
            )],
            tool_choice: Some("update_ruleset".to_string()),
        }
    }

    #[test]
    fn test_build_request_lifts_system_messages() {
        let body = serde_json::to_value(AnthropicAdapter::build_request(&request())).unwrap();

        assert_eq!(body["system"], "You update writing rules.\n\nExtra system context");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["tool_choice"], json!({ "type": "tool", "name": "update_ruleset" }));
    }

    #[tokio::test]
    async fn test_parses_text_and_tool_use_blocks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "sk-ant-test")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "msg_1",
                    "type": "message",
                    "role": "assistant",
                    "content": [
                        { "type": "text", "text": "Updating the rules." },
                        {
                            "type": "tool_use",
                            "id": "toolu_1",
                            "name": "update_ruleset",
                            "input": { "updatedRuleset": ["Keep posts short"] }
                        }
                    ],
                    "stop_reason": "tool_use",
                    "usage": { "input_tokens": 30, "output_tokens": 12 }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let adapter =
            AnthropicAdapter::with_client(Client::new(), "sk-ant-test", Some(&server.url()));
        let response = adapter.create_chat_completion(&request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "Updating the rules.");
        assert_eq!(response.finish_reason, "tool_use");
        assert_eq!(response.usage.total_tokens, 42);
        assert_eq!(
            response.tool_call("update_ruleset").unwrap().arguments["updatedRuleset"][0],
            "Keep posts short"
        );
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/messages")
            .with_status(529)
            .with_body(
                json!({
                    "type": "error",
                    "error": { "type": "overloaded_error", "message": "Overloaded" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let adapter = AnthropicAdapter::with_client(Client::new(), "key", Some(&server.url()));
        let err = adapter.create_chat_completion(&request()).await.unwrap_err();

        match err {
            AppError::LLMApi(message) => {
                assert!(message.contains("Overloaded"));
                assert!(message.contains("overloaded_error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
