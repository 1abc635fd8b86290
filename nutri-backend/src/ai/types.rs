//! Provider-neutral model types plus the Claude Messages API wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone)]
pub struct AiError {
    pub message: String,
    /// HTTP status of the failed call, when there was a response
    pub status_code: Option<u16>,
}

impl AiError {
    pub fn new(message: impl Into<String>) -> Self {
        AiError {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status_code: u16) -> Self {
        AiError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// 401/403: the key is missing or wrong, retrying will not help
    pub fn is_auth_error(&self) -> bool {
        matches!(self.status_code, Some(401) | Some(403))
    }
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "[HTTP {}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for AiError {}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Output of one tool call, sent back on the next request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResponse {
    pub fn success(tool_call_id: String, content: String) -> Self {
        ToolResponse {
            tool_call_id,
            content,
            is_error: false,
        }
    }

    pub fn error(tool_call_id: String, error: String) -> Self {
        ToolResponse {
            tool_call_id,
            content: error,
            is_error: true,
        }
    }
}

/// One round of tool calls and their responses, replayed on the next model call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolHistoryEntry {
    /// Text the model wrote alongside its tool calls, often empty
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_responses: Vec<ToolResponse>,
}

impl ToolHistoryEntry {
    pub fn new(content: String, tool_calls: Vec<ToolCall>, tool_responses: Vec<ToolResponse>) -> Self {
        ToolHistoryEntry {
            content,
            tool_calls,
            tool_responses,
        }
    }
}

/// Model turn: text, tool calls, or both
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: Option<String>,
}

impl AiResponse {
    pub fn text(content: impl Into<String>) -> Self {
        AiResponse {
            content: content.into(),
            tool_calls: Vec::new(),
            stop_reason: Some("end_turn".to_string()),
        }
    }

    pub fn with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        AiResponse {
            content: content.into(),
            tool_calls,
            stop_reason: Some("tool_use".to_string()),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// Claude wire format

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

impl ClaudeContentBlock {
    /// `is_error` is only sent when true
    pub fn tool_result(tool_use_id: String, content: String, is_error: bool) -> Self {
        ClaudeContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error: is_error.then_some(true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessage {
    pub role: String,
    pub content: ClaudeMessageContent,
}

/// Plain string for ordinary turns, blocks for tool rounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaudeMessageContent {
    Text(String),
    Blocks(Vec<ClaudeContentBlock>),
}

impl ClaudeMessage {
    pub fn assistant_with_blocks(blocks: Vec<ClaudeContentBlock>) -> Self {
        ClaudeMessage {
            role: "assistant".to_string(),
            content: ClaudeMessageContent::Blocks(blocks),
        }
    }

    pub fn user_with_tool_results(results: Vec<ClaudeContentBlock>) -> Self {
        ClaudeMessage {
            role: "user".to_string(),
            content: ClaudeMessageContent::Blocks(results),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_constructors() {
        let response = AiResponse::text("165 kcal");
        assert!(!response.has_tool_calls());
        assert_eq!(response.stop_reason.as_deref(), Some("end_turn"));

        let call = ToolCall {
            id: "toolu_123".to_string(),
            name: "google_search".to_string(),
            arguments: serde_json::json!({"query": "chicken nutrition"}),
        };
        let response = AiResponse::with_tools("", vec![call]);
        assert!(response.has_tool_calls());
        assert_eq!(response.stop_reason.as_deref(), Some("tool_use"));
    }

    #[test]
    fn test_error_display_and_auth() {
        assert_eq!(AiError::with_status("nope", 401).to_string(), "[HTTP 401] nope");
        assert!(AiError::with_status("nope", 401).is_auth_error());
        assert!(!AiError::with_status("overloaded", 529).is_auth_error());
        assert_eq!(AiError::new("offline").to_string(), "offline");
    }

    #[test]
    fn test_blocks_serialize_with_snake_case_tags() {
        let block = ClaudeContentBlock::tool_result("toolu_1".into(), "ok".into(), false);
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert!(json.get("is_error").is_none());

        let block = ClaudeContentBlock::ToolUse {
            id: "toolu_1".into(),
            name: "think".into(),
            input: serde_json::json!({}),
        };
        assert_eq!(serde_json::to_value(&block).unwrap()["type"], "tool_use");
    }
}
