//! Scripted model client for tests.
//!
//! Responses are popped in order; every request is recorded so tests can
//! check what an agent actually sent to the model.

use crate::ai::types::{AiError, AiResponse, ToolHistoryEntry};
use crate::ai::Message;
use crate::tools::ToolDefinition;
use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub messages: Vec<Message>,
    pub tool_rounds: usize,
    /// Assistant text of each replayed tool round
    pub round_texts: Vec<String>,
    pub tool_names: Vec<String>,
}

pub struct MockAiClient {
    model: String,
    responses: Mutex<VecDeque<Result<AiResponse, AiError>>>,
    trace: Mutex<Vec<TraceEntry>>,
}

impl MockAiClient {
    pub fn new(responses: Vec<Result<AiResponse, AiError>>) -> Self {
        MockAiClient {
            model: "mock-model".to_string(),
            responses: Mutex::new(responses.into()),
            trace: Mutex::new(Vec::new()),
        }
    }

    /// Shorthand for a client that answers every call with the same text
    pub fn replying(text: &str, times: usize) -> Self {
        Self::new((0..times).map(|_| Ok(AiResponse::text(text))).collect())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn trace(&self) -> Vec<TraceEntry> {
        self.trace.lock().clone()
    }

    fn next(&self) -> Result<AiResponse, AiError> {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AiError::new("mock: no scripted response left")))
    }

    pub fn generate_text(&self, messages: Vec<Message>) -> Result<String, AiError> {
        self.trace.lock().push(TraceEntry {
            messages,
            tool_rounds: 0,
            round_texts: Vec::new(),
            tool_names: Vec::new(),
        });
        self.next().map(|r| r.content)
    }

    pub fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tool_history: &[ToolHistoryEntry],
        tools: Vec<ToolDefinition>,
    ) -> Result<AiResponse, AiError> {
        self.trace.lock().push(TraceEntry {
            messages,
            tool_rounds: tool_history.len(),
            round_texts: tool_history.iter().map(|e| e.content.clone()).collect(),
            tool_names: tools.into_iter().map(|t| t.name).collect(),
        });
        self.next()
    }
}
