use crate::agents::ToolCallRecord;
use crate::tools::ReasoningStep;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(format!("Unknown run status: {}", s)),
        }
    }
}

/// Outcome of one step within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub agent_name: String,
    pub content: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: i64,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    /// `think` / `analyze` entries the step's agent recorded
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasoning_steps: Vec<ReasoningStep>,
}

/// A single execution of a workflow, stored inside its session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: String,
    pub session_id: String,
    pub workflow_id: String,
    pub input: String,
    pub status: RunStatus,
    pub content: Option<String>,
    #[serde(default)]
    pub step_results: Vec<StepResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn new(session_id: impl Into<String>, workflow_id: impl Into<String>, input: impl Into<String>) -> Self {
        WorkflowRun {
            run_id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            workflow_id: workflow_id.into(),
            input: input.into(),
            status: RunStatus::Pending,
            content: None,
            step_results: Vec::new(),
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn complete(&mut self, content: String) {
        self.status = RunStatus::Completed;
        self.content = Some(content);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: String) {
        self.status = RunStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::Failed)
    }
}
