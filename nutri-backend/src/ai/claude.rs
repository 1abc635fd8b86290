//! Anthropic Messages API client with native tool use.

use crate::ai::types::{
    AiError, AiResponse, ClaudeContentBlock, ClaudeMessage, ClaudeMessageContent, ClaudeTool,
    ToolCall, ToolHistoryEntry,
};
use crate::ai::{Message, MessageRole};
use crate::tools::ToolDefinition;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Transient failures (429/502/503/504, transport errors) are retried this
/// many times, waiting 2s, 4s, 8s
const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 2000;

#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    headers: header::HeaderMap,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ToolChoice {
    Auto,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ClaudeTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl ClaudeClient {
    pub fn new(
        api_key: &str,
        endpoint: Option<&str>,
        model: Option<&str>,
        max_tokens: Option<u32>,
    ) -> Result<Self, AiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            "x-api-key",
            header::HeaderValue::from_str(api_key)
                .map_err(|e| AiError::new(format!("Invalid API key format: {}", e)))?,
        );
        headers.insert(
            "anthropic-version",
            header::HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        Ok(ClaudeClient {
            client: crate::http::shared_client().clone(),
            headers,
            endpoint: endpoint.unwrap_or(crate::config::DEFAULT_ENDPOINT).to_string(),
            model: model.unwrap_or(crate::config::DEFAULT_MODEL).to_string(),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Claude takes the system prompt as a top-level field; several system
    /// messages are joined with a blank line
    fn split_system(messages: Vec<Message>) -> (Option<String>, Vec<ClaudeMessage>) {
        let mut system: Option<String> = None;
        let mut turns = Vec::with_capacity(messages.len());
        for m in messages {
            match m.role {
                MessageRole::System => {
                    system = Some(match system {
                        Some(prev) => format!("{}\n\n{}", prev, m.content),
                        None => m.content,
                    });
                }
                _ => turns.push(ClaudeMessage {
                    role: m.role.to_string(),
                    content: ClaudeMessageContent::Text(m.content),
                }),
            }
        }
        (system, turns)
    }

    pub async fn generate_text(&self, messages: Vec<Message>) -> Result<String, AiError> {
        let (system, turns) = Self::split_system(messages);
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: turns,
            system,
            tools: Vec::new(),
            tool_choice: None,
        };

        let response = self.send(&request).await?.into_ai_response();
        if response.content.is_empty() {
            return Err(AiError::new("Claude API returned no content"));
        }
        Ok(response.content)
    }

    /// Send `messages` followed by the replayed tool rounds, offering `tools`
    pub async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tool_messages: Vec<ClaudeMessage>,
        tools: Vec<ToolDefinition>,
    ) -> Result<AiResponse, AiError> {
        let (system, mut turns) = Self::split_system(messages);
        turns.extend(tool_messages);

        let tools: Vec<ClaudeTool> = tools
            .into_iter()
            .map(|t| ClaudeTool {
                name: t.name,
                description: t.description,
                input_schema: serde_json::to_value(t.input_schema).unwrap_or_default(),
            })
            .collect();
        let tool_choice = (!tools.is_empty()).then_some(ToolChoice::Auto);

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: turns,
            system,
            tools,
            tool_choice,
        };

        Ok(self.send(&request).await?.into_ai_response())
    }

    async fn send(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse, AiError> {
        log::debug!(
            "[CLAUDE] Request: {}",
            serde_json::to_string(request).unwrap_or_default()
        );

        let mut attempt = 0;
        loop {
            let outcome = self
                .client
                .post(&self.endpoint)
                .headers(self.headers.clone())
                .json(request)
                .send()
                .await;

            let error = match outcome {
                Err(e) => AiError::new(format!("Claude API request failed: {}", e)),
                Ok(response) if response.status().is_success() => {
                    return response.json().await.map_err(|e| {
                        AiError::new(format!("Failed to parse Claude response: {}", e))
                    });
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
                        Ok(envelope) => format!("Claude API error: {}", envelope.error.message),
                        Err(_) => format!("Claude API returned status {}: {}", status, body),
                    };
                    let error = AiError::with_status(message, status);
                    if !is_retryable_status(status) {
                        if error.is_auth_error() {
                            log::error!("[CLAUDE] Authentication failed, check ANTHROPIC_API_KEY");
                        }
                        return Err(error);
                    }
                    error
                }
            };

            if attempt >= MAX_RETRIES {
                return Err(error);
            }
            attempt += 1;
            let delay_ms = BASE_DELAY_MS << (attempt - 1);
            log::warn!(
                "[CLAUDE] {} (retry {}/{} in {}ms)",
                error,
                attempt,
                MAX_RETRIES,
                delay_ms
            );
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    /// The assistant turn (its text, if any, then the tool_use blocks),
    /// followed by the user turn holding the tool results
    pub fn build_tool_result_messages(entry: &ToolHistoryEntry) -> Vec<ClaudeMessage> {
        let mut blocks = Vec::with_capacity(entry.tool_calls.len() + 1);
        if !entry.content.trim().is_empty() {
            blocks.push(ClaudeContentBlock::Text {
                text: entry.content.clone(),
            });
        }
        blocks.extend(entry.tool_calls.iter().map(|call| ClaudeContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.arguments.clone(),
        }));
        let results = entry
            .tool_responses
            .iter()
            .map(|r| ClaudeContentBlock::tool_result(r.tool_call_id.clone(), r.content.clone(), r.is_error))
            .collect();

        vec![
            ClaudeMessage::assistant_with_blocks(blocks),
            ClaudeMessage::user_with_tool_results(results),
        ]
    }
}

impl MessagesResponse {
    fn into_ai_response(self) -> AiResponse {
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in self.content {
            match block {
                ResponseBlock::Text { text } => content.push_str(&text),
                ResponseBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                ResponseBlock::Other => {}
            }
        }
        AiResponse {
            content,
            tool_calls,
            stop_reason: self.stop_reason,
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}
