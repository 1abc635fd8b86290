use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Tool groups, used to describe what an agent is equipped with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolGroup {
    /// Web search and fetching
    Web,
    /// Local tabular data (CSV files)
    Data,
    /// Reasoning scratchpad
    Reasoning,
    /// Team coordination (delegation to members)
    Team,
}

impl ToolGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolGroup::Web => "web",
            ToolGroup::Data => "data",
            ToolGroup::Reasoning => "reasoning",
            ToolGroup::Team => "team",
        }
    }
}

/// JSON schema of a single tool parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl PropertySchema {
    pub fn string(description: impl Into<String>) -> Self {
        PropertySchema {
            schema_type: "string".to_string(),
            description: description.into(),
            default: None,
            items: None,
            enum_values: None,
        }
    }

    pub fn integer(description: impl Into<String>, default: Option<i64>) -> Self {
        PropertySchema {
            schema_type: "integer".to_string(),
            description: description.into(),
            default: default.map(Value::from),
            items: None,
            enum_values: None,
        }
    }

    pub fn number(description: impl Into<String>) -> Self {
        PropertySchema {
            schema_type: "number".to_string(),
            description: description.into(),
            default: None,
            items: None,
            enum_values: None,
        }
    }
}

/// Input schema for a tool (JSON Schema object)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: HashMap<String, PropertySchema>,
    pub required: Vec<String>,
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: Vec::new(),
        }
    }
}

/// Tool definition sent to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
    pub group: ToolGroup,
}

/// Result of executing a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        ToolResult {
            success: true,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ToolResult {
            success: false,
            content: message.into(),
            metadata: None,
        }
    }

    /// Serialize a value as pretty JSON content
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string_pretty(value) {
            Ok(content) => ToolResult::success(content),
            Err(e) => ToolResult::error(format!("Failed to serialize result: {}", e)),
        }
    }
}

/// One entry in a run's reasoning log (written by `think` / `analyze`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningStep {
    pub kind: String,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Per-run context handed to every tool execution
#[derive(Clone)]
pub struct ToolContext {
    pub run_id: String,
    pub session_id: Option<String>,
    http_client: Client,
    reasoning: Arc<Mutex<Vec<ReasoningStep>>>,
}

impl ToolContext {
    pub fn new(run_id: impl Into<String>, session_id: Option<String>) -> Self {
        ToolContext {
            run_id: run_id.into(),
            session_id,
            http_client: crate::http::shared_client().clone(),
            reasoning: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Same run and session, fresh reasoning log (one per agent)
    pub fn fork(&self) -> Self {
        ToolContext {
            run_id: self.run_id.clone(),
            session_id: self.session_id.clone(),
            http_client: self.http_client.clone(),
            reasoning: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    pub fn push_reasoning(&self, step: ReasoningStep) -> Vec<ReasoningStep> {
        let mut log = self.reasoning.lock();
        log.push(step);
        log.clone()
    }

    pub fn reasoning_steps(&self) -> Vec<ReasoningStep> {
        self.reasoning.lock().clone()
    }
}
