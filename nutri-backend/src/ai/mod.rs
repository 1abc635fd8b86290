pub mod claude;
#[cfg(test)]
pub mod mock;
pub mod types;

pub use claude::ClaudeClient;
#[cfg(test)]
pub use mock::MockAiClient;
pub use types::{AiError, AiResponse, ToolCall, ToolHistoryEntry, ToolResponse};

use crate::config::Config;
use crate::tools::ToolDefinition;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Model client used by agents, the team leader and the accuracy judge
#[derive(Clone)]
pub enum AiClient {
    Claude(ClaudeClient),
    #[cfg(test)]
    Mock(std::sync::Arc<MockAiClient>),
}

impl AiClient {
    /// Create a Claude client for the given model id using the configured credentials
    pub fn from_config(config: &Config, model: &str) -> Result<Self, AiError> {
        let client = ClaudeClient::new(
            &config.anthropic_api_key,
            Some(&config.anthropic_endpoint),
            Some(model),
            Some(config.max_tokens),
        )?;
        Ok(AiClient::Claude(client))
    }

    pub fn model_id(&self) -> &str {
        match self {
            AiClient::Claude(client) => client.model(),
            #[cfg(test)]
            AiClient::Mock(client) => client.model(),
        }
    }

    /// Generate plain text (no tools)
    pub async fn generate_text(&self, messages: Vec<Message>) -> Result<String, AiError> {
        match self {
            AiClient::Claude(client) => client.generate_text(messages).await,
            #[cfg(test)]
            AiClient::Mock(client) => client.generate_text(messages),
        }
    }

    /// Generate a response with tool support, replaying previous tool rounds
    pub async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tool_history: &[ToolHistoryEntry],
        tools: Vec<ToolDefinition>,
    ) -> Result<AiResponse, AiError> {
        match self {
            AiClient::Claude(client) => {
                let tool_messages: Vec<_> = tool_history
                    .iter()
                    .flat_map(ClaudeClient::build_tool_result_messages)
                    .collect();
                client.generate_with_tools(messages, tool_messages, tools).await
            }
            #[cfg(test)]
            AiClient::Mock(client) => client.generate_with_tools(messages, tool_history, tools),
        }
    }
}
