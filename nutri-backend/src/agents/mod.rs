//! LLM-backed agents
//!
//! An agent is a named role bound to a model client, a tool registry and
//! free-text instructions. `Agent::run` drives the native tool-calling loop:
//!
//! ```text
//! input → model → tool calls? ──yes──→ execute tools → model → ...
//!                      └──no──→ final answer
//! ```

pub mod factory;

pub use factory::{create_csv_agent, create_reasoning_agent, create_web_agent};

use crate::ai::{AiClient, AiError, Message, ToolHistoryEntry, ToolResponse};
use crate::tools::{ReasoningStep, Tool, ToolContext, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Maximum model round-trips per agent run
pub const MAX_TOOL_ITERATIONS: usize = 10;

#[derive(Debug)]
pub enum AgentError {
    Model(AiError),
    EmptyResponse,
    IterationLimit(usize),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Model(e) => write!(f, "model call failed: {}", e),
            AgentError::EmptyResponse => write!(f, "model returned an empty response"),
            AgentError::IterationLimit(n) => {
                write!(f, "tool loop did not finish within {} iterations", n)
            }
        }
    }
}

impl std::error::Error for AgentError {}

impl From<AiError> for AgentError {
    fn from(e: AiError) -> Self {
        AgentError::Model(e)
    }
}

/// Serializable description of an agent's configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub role: String,
    pub model: String,
    pub tools: Vec<String>,
    pub instructions: String,
}

/// A tool invocation made during an agent run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub success: bool,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunOutput {
    pub agent_name: String,
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub iterations: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasoning_steps: Vec<ReasoningStep>,
}

pub struct Agent {
    name: String,
    role: String,
    instructions: String,
    tools: ToolRegistry,
    client: AiClient,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        client: AiClient,
        tools: Vec<Arc<dyn Tool>>,
        instructions: impl Into<String>,
    ) -> Self {
        Agent {
            name: name.into(),
            role: role.into(),
            instructions: instructions.into(),
            tools: ToolRegistry::with_tools(tools),
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn model(&self) -> &str {
        self.client.model_id()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Stable identifier derived from the name ("Web Agent" → "web-agent")
    pub fn id(&self) -> String {
        crate::util::slugify(&self.name)
    }

    pub fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor {
            name: self.name.clone(),
            role: self.role.clone(),
            model: self.model().to_string(),
            tools: self.tools.names(),
            instructions: self.instructions.clone(),
        }
    }

    /// System prompt: identity, role, instructions, then tool guidance
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}.\nYour role: {}\n", self.name, self.role);
        if !self.instructions.trim().is_empty() {
            prompt.push_str(&format!(
                "\n<instructions>\n{}\n</instructions>\n",
                self.instructions.trim()
            ));
        }
        for guidance in self.tools.instructions() {
            prompt.push('\n');
            prompt.push_str(&guidance);
            prompt.push('\n');
        }
        prompt
    }

    /// Run the agent on `input` until it produces a final text answer.
    ///
    /// Tool failures are fed back to the model as error results; only model
    /// errors, empty answers and the iteration limit end the run with an error.
    pub async fn run(&self, input: &str, context: &ToolContext) -> Result<AgentRunOutput, AgentError> {
        let context = context.fork();
        let messages = vec![Message::system(self.system_prompt()), Message::user(input)];
        let definitions = self.tools.definitions();

        let mut tool_history: Vec<ToolHistoryEntry> = Vec::new();
        let mut records: Vec<ToolCallRecord> = Vec::new();

        log::info!(
            "[AGENT] {} starting (run {}, {} tools)",
            self.name,
            context.run_id,
            definitions.len()
        );

        for iteration in 1..=MAX_TOOL_ITERATIONS {
            let response = self
                .client
                .generate_with_tools(messages.clone(), &tool_history, definitions.clone())
                .await?;

            if !response.has_tool_calls() {
                let content = response.content.trim().to_string();
                if content.is_empty() {
                    return Err(AgentError::EmptyResponse);
                }
                log::info!(
                    "[AGENT] {} finished after {} iteration(s), {} tool call(s)",
                    self.name,
                    iteration,
                    records.len()
                );
                return Ok(AgentRunOutput {
                    agent_name: self.name.clone(),
                    content,
                    tool_calls: records,
                    iterations: iteration,
                    reasoning_steps: context.reasoning_steps(),
                });
            }

            let mut responses = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                let start = Instant::now();
                let result = self
                    .tools
                    .execute(&call.name, call.arguments.clone(), &context)
                    .await;
                let duration_ms = start.elapsed().as_millis() as i64;

                log::info!(
                    "[AGENT] {} tool '{}' executed in {}ms, success: {}",
                    self.name,
                    call.name,
                    duration_ms,
                    result.success
                );

                records.push(ToolCallRecord {
                    tool_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    success: result.success,
                    duration_ms,
                });
                responses.push(if result.success {
                    ToolResponse::success(call.id.clone(), result.content)
                } else {
                    ToolResponse::error(call.id.clone(), result.content)
                });
            }

            tool_history.push(ToolHistoryEntry::new(
                response.content,
                response.tool_calls,
                responses,
            ));
        }

        log::warn!(
            "[AGENT] {} exceeded max iterations ({})",
            self.name,
            MAX_TOOL_ITERATIONS
        );
        Err(AgentError::IterationLimit(MAX_TOOL_ITERATIONS))
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model())
            .field("tools", &self.tools.names())
            .finish()
    }
}
