//! Step-sequenced workflows over agents
//!
//! A workflow is an ordered list of stages. A stage is either a single
//! [`Step`] or a [`Parallel`] group whose steps run concurrently and whose
//! outputs are joined before the next stage starts:
//!
//! ```text
//! message ─┬─ CSV File Analysis Phase ─┐
//!          └─ Web Search Phase ────────┴─→ Response Generation Phase ─→ content
//! ```
//!
//! Every run is appended to its session when storage is attached, whether it
//! completed or failed.

pub mod nutri;
pub mod types;

pub use nutri::{build_nutri_workflow, WORKFLOW_NAME};
pub use types::{RunStatus, StepResult, WorkflowRun};

use crate::agents::Agent;
use crate::db::{SqliteStorage, StorageError};
use crate::tools::ToolContext;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
pub enum WorkflowError {
    /// A sequential step failed
    StepFailed { step: String, error: String },
    /// Every step of a parallel group failed
    AllParallelStepsFailed { stage: String, errors: Vec<String> },
    Storage(StorageError),
    InvalidDefinition(String),
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowError::StepFailed { step, error } => {
                write!(f, "step '{}' failed: {}", step, error)
            }
            WorkflowError::AllParallelStepsFailed { stage, errors } => {
                write!(f, "all steps of '{}' failed: {}", stage, errors.join("; "))
            }
            WorkflowError::Storage(e) => write!(f, "storage error: {}", e),
            WorkflowError::InvalidDefinition(msg) => write!(f, "invalid workflow: {}", msg),
        }
    }
}

impl std::error::Error for WorkflowError {}

impl From<StorageError> for WorkflowError {
    fn from(e: StorageError) -> Self {
        WorkflowError::Storage(e)
    }
}

/// A named unit of work executed by one agent
#[derive(Clone)]
pub struct Step {
    pub name: String,
    pub agent: Arc<Agent>,
}

impl Step {
    pub fn new(name: impl Into<String>, agent: Arc<Agent>) -> Self {
        Step {
            name: name.into(),
            agent,
        }
    }

    async fn execute(&self, input: &str, context: &ToolContext) -> StepResult {
        let start = Instant::now();
        log::info!("[WORKFLOW] Step '{}' started ({})", self.name, self.agent.name());

        let outcome = self.agent.run(input, context).await;
        let duration_ms = start.elapsed().as_millis() as i64;

        match outcome {
            Ok(output) => {
                log::info!("[WORKFLOW] Step '{}' completed in {}ms", self.name, duration_ms);
                StepResult {
                    step_name: self.name.clone(),
                    agent_name: output.agent_name,
                    content: Some(output.content),
                    success: true,
                    error: None,
                    duration_ms,
                    tool_calls: output.tool_calls,
                    reasoning_steps: output.reasoning_steps,
                }
            }
            Err(e) => {
                log::error!("[WORKFLOW] Step '{}' failed after {}ms: {}", self.name, duration_ms, e);
                StepResult {
                    step_name: self.name.clone(),
                    agent_name: self.agent.name().to_string(),
                    content: None,
                    success: false,
                    error: Some(e.to_string()),
                    duration_ms,
                    tool_calls: Vec::new(),
                    reasoning_steps: Vec::new(),
                }
            }
        }
    }
}

/// Steps that run concurrently; the stage output joins their contents
#[derive(Clone)]
pub struct Parallel {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Parallel {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Parallel {
            name: name.into(),
            steps,
        }
    }
}

#[derive(Clone)]
pub enum Stage {
    Step(Step),
    Parallel(Parallel),
}

impl Stage {
    pub fn name(&self) -> &str {
        match self {
            Stage::Step(step) => &step.name,
            Stage::Parallel(group) => &group.name,
        }
    }
}

/// Serializable view of a stage for the playground API
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageDescriptor {
    Step { name: String, agent: String },
    Parallel { name: String, steps: Vec<StageDescriptor> },
}

impl From<&Step> for StageDescriptor {
    fn from(step: &Step) -> Self {
        StageDescriptor::Step {
            name: step.name.clone(),
            agent: step.agent.name().to_string(),
        }
    }
}

impl From<&Stage> for StageDescriptor {
    fn from(stage: &Stage) -> Self {
        match stage {
            Stage::Step(step) => step.into(),
            Stage::Parallel(group) => StageDescriptor::Parallel {
                name: group.name.clone(),
                steps: group.steps.iter().map(StageDescriptor::from).collect(),
            },
        }
    }
}

pub struct Workflow {
    workflow_id: String,
    name: String,
    description: String,
    stages: Vec<Stage>,
    storage: Option<Arc<SqliteStorage>>,
}

impl Workflow {
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder {
            name: name.into(),
            description: String::new(),
            stages: Vec::new(),
            storage: None,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn storage(&self) -> Option<&Arc<SqliteStorage>> {
        self.storage.as_ref()
    }

    /// Distinct agents in stage order
    pub fn agents(&self) -> Vec<Arc<Agent>> {
        let mut seen = HashSet::new();
        let mut agents = Vec::new();
        for stage in &self.stages {
            let steps: Vec<&Step> = match stage {
                Stage::Step(step) => vec![step],
                Stage::Parallel(group) => group.steps.iter().collect(),
            };
            for step in steps {
                if seen.insert(step.agent.name().to_string()) {
                    agents.push(step.agent.clone());
                }
            }
        }
        agents
    }

    pub fn stage_descriptors(&self) -> Vec<StageDescriptor> {
        self.stages.iter().map(StageDescriptor::from).collect()
    }

    /// Run the workflow on `input`.
    ///
    /// A new session id is generated when none is given. A session that
    /// belongs to another workflow is rejected before any step runs. The
    /// finished run is persisted before returning, so a failed run is still
    /// visible in its session.
    pub async fn run(
        &self,
        input: &str,
        session_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<WorkflowRun, WorkflowError> {
        let session_id = session_id
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if let Some(storage) = &self.storage {
            storage.ensure_session_owner(&session_id, &self.workflow_id)?;
        }

        let mut run = WorkflowRun::new(session_id.clone(), self.workflow_id.clone(), input);
        run.status = RunStatus::Running;
        log::info!(
            "[WORKFLOW] {} run {} started (session {})",
            self.name,
            run.run_id,
            session_id
        );

        let context = ToolContext::new(run.run_id.clone(), Some(session_id));
        let outcome = self.execute(input, &context, &mut run.step_results).await;

        match &outcome {
            Ok(content) => run.complete(content.clone()),
            Err(e) => run.fail(e.to_string()),
        }

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.append_run(&self.name, user_id, &run) {
                log::error!("[WORKFLOW] Failed to persist run {}: {}", run.run_id, e);
                // the step error is more useful to the caller than the storage one
                outcome?;
                return Err(e.into());
            }
        }

        match outcome {
            Ok(_) => {
                log::info!("[WORKFLOW] {} run {} completed", self.name, run.run_id);
                Ok(run)
            }
            Err(e) => {
                log::error!("[WORKFLOW] {} run {} failed: {}", self.name, run.run_id, e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        input: &str,
        context: &ToolContext,
        results: &mut Vec<StepResult>,
    ) -> Result<String, WorkflowError> {
        let mut previous: Option<String> = None;

        for stage in &self.stages {
            let stage_input = match &previous {
                Some(prev) => compose_step_input(input, prev),
                None => input.to_string(),
            };

            let content = match stage {
                Stage::Step(step) => {
                    let result = step.execute(&stage_input, context).await;
                    let outcome = match (&result.content, &result.error) {
                        (Some(content), None) if result.success => Ok(content.clone()),
                        _ => Err(WorkflowError::StepFailed {
                            step: step.name.clone(),
                            error: result.error.clone().unwrap_or_default(),
                        }),
                    };
                    results.push(result);
                    outcome?
                }
                Stage::Parallel(group) => {
                    let stage_results = join_all(
                        group.steps.iter().map(|step| step.execute(&stage_input, context)),
                    )
                    .await;
                    let outcome = join_parallel_outputs(&group.name, &stage_results);
                    results.extend(stage_results);
                    outcome?
                }
            };

            previous = Some(content);
        }

        previous.ok_or_else(|| WorkflowError::InvalidDefinition("workflow has no stages".to_string()))
    }
}

/// Input for a stage after the first: the user's message followed by the
/// previous stage's output
fn compose_step_input(message: &str, previous: &str) -> String {
    format!(
        "{}\n\n--- Output from previous steps ---\n\n{}",
        message, previous
    )
}

/// Join successful parallel outputs as sections titled by step name. Fails only
/// when no step succeeded.
fn join_parallel_outputs(stage: &str, results: &[StepResult]) -> Result<String, WorkflowError> {
    let sections: Vec<String> = results
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| r.content.as_ref().map(|c| format!("## {}\n\n{}", r.step_name, c)))
        .collect();

    if sections.is_empty() {
        return Err(WorkflowError::AllParallelStepsFailed {
            stage: stage.to_string(),
            errors: results
                .iter()
                .map(|r| format!("{}: {}", r.step_name, r.error.as_deref().unwrap_or("no output")))
                .collect(),
        });
    }

    let failed = results.len() - sections.len();
    if failed > 0 {
        log::warn!(
            "[WORKFLOW] {} of {} steps in '{}' failed, continuing with the rest",
            failed,
            results.len(),
            stage
        );
    }
    Ok(sections.join("\n\n"))
}

pub struct WorkflowBuilder {
    name: String,
    description: String,
    stages: Vec<Stage>,
    storage: Option<Arc<SqliteStorage>>,
}

impl WorkflowBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.stages.push(Stage::Step(step));
        self
    }

    pub fn parallel(mut self, group: Parallel) -> Self {
        self.stages.push(Stage::Parallel(group));
        self
    }

    pub fn storage(mut self, storage: Arc<SqliteStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let workflow_id = crate::util::slugify(&self.name);
        if workflow_id.is_empty() {
            return Err(WorkflowError::InvalidDefinition(format!(
                "workflow name {:?} yields an empty id",
                self.name
            )));
        }
        if self.stages.is_empty() {
            return Err(WorkflowError::InvalidDefinition("workflow has no stages".to_string()));
        }

        for stage in &self.stages {
            if let Stage::Parallel(group) = stage {
                if group.steps.is_empty() {
                    return Err(WorkflowError::InvalidDefinition(format!(
                        "parallel group '{}' has no steps",
                        group.name
                    )));
                }
                let mut names = HashSet::new();
                for step in &group.steps {
                    if !names.insert(step.name.as_str()) {
                        return Err(WorkflowError::InvalidDefinition(format!(
                            "duplicate step '{}' in parallel group '{}'",
                            step.name, group.name
                        )));
                    }
                }
            }
        }

        Ok(Workflow {
            workflow_id,
            name: self.name,
            description: self.description,
            stages: self.stages,
            storage: self.storage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiClient, AiError, AiResponse, MockAiClient, ToolCall};
    use crate::tools::builtin::reasoning_toolkit;
    use crate::tools::{Tool, ToolDefinition, ToolGroup, ToolInputSchema, ToolResult};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Waits until every holder of the barrier has called it
    struct RendezvousTool(Arc<tokio::sync::Barrier>);

    #[async_trait]
    impl Tool for RendezvousTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "rendezvous".to_string(),
                description: "wait for the other step".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties: Default::default(),
                    required: vec![],
                },
                group: ToolGroup::Data,
            }
        }

        async fn execute(&self, _params: serde_json::Value, _context: &ToolContext) -> ToolResult {
            self.0.wait().await;
            ToolResult::success("met")
        }
    }

    fn agent(name: &str, responses: Vec<Result<AiResponse, AiError>>) -> (Arc<Agent>, Arc<MockAiClient>) {
        let mock = Arc::new(MockAiClient::new(responses));
        let agent = Agent::new(name, "test role", AiClient::Mock(mock.clone()), vec![], "be brief");
        (Arc::new(agent), mock)
    }

    fn replying(name: &str, text: &str) -> (Arc<Agent>, Arc<MockAiClient>) {
        agent(name, vec![Ok(AiResponse::text(text))])
    }

    fn failing(name: &str) -> (Arc<Agent>, Arc<MockAiClient>) {
        agent(name, vec![Err(AiError::with_status("overloaded", 529))])
    }

    fn storage() -> Arc<SqliteStorage> {
        Arc::new(SqliteStorage::open(":memory:", "test_sessions").unwrap())
    }

    fn fan_in(
        csv: Arc<Agent>,
        web: Arc<Agent>,
        reasoning: Arc<Agent>,
        storage: Option<Arc<SqliteStorage>>,
    ) -> Workflow {
        let mut builder = Workflow::builder("Test Flow")
            .parallel(Parallel::new(
                "Gather",
                vec![Step::new("CSV", csv), Step::new("Web", web)],
            ))
            .step(Step::new("Answer", reasoning));
        if let Some(storage) = storage {
            builder = builder.storage(storage);
        }
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_parallel_outputs_reach_final_step() {
        let (csv, _) = replying("CsvTool Agent", "165 kcal");
        let (web, _) = replying("Web Agent", "try tofu");
        let (reasoning, reasoning_mock) = replying("Reasoning Agent", "| kcal | 165 |\n- tofu");
        let storage = storage();
        let workflow = fan_in(csv, web, reasoning, Some(storage.clone()));

        let run = workflow.run("chicken", Some("s1"), Some("u1")).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.content.as_deref(), Some("| kcal | 165 |\n- tofu"));
        assert_eq!(run.step_results.len(), 3);
        assert!(run.step_results.iter().all(|r| r.success));

        let final_input = &reasoning_mock.trace()[0].messages[1].content;
        assert!(final_input.starts_with("chicken"));
        assert!(final_input.contains("## CSV\n\n165 kcal"));
        assert!(final_input.contains("## Web\n\ntry tofu"));

        let session = storage.get_session("s1").unwrap().unwrap();
        assert_eq!(session.workflow_id, "test-flow");
        assert_eq!(session.runs.len(), 1);
        assert_eq!(session.runs[0].status, RunStatus::Completed);
        assert_eq!(session.user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_one_parallel_failure_is_tolerated() {
        let (csv, _) = failing("CsvTool Agent");
        let (web, _) = replying("Web Agent", "try tofu");
        let (reasoning, reasoning_mock) = replying("Reasoning Agent", "done");
        let workflow = fan_in(csv, web, reasoning, None);

        let run = workflow.run("chicken", None, None).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(!run.step_results[0].success);
        assert!(run.step_results[0].error.as_deref().unwrap().contains("overloaded"));

        let final_input = &reasoning_mock.trace()[0].messages[1].content;
        assert!(!final_input.contains("## CSV"));
        assert!(final_input.contains("## Web"));
    }

    #[tokio::test]
    async fn test_failed_run_is_persisted() {
        let (csv, _) = replying("CsvTool Agent", "165 kcal");
        let (web, _) = replying("Web Agent", "try tofu");
        let (reasoning, _) = failing("Reasoning Agent");
        let storage = storage();
        let workflow = fan_in(csv, web, reasoning, Some(storage.clone()));

        let err = workflow.run("chicken", Some("s2"), None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StepFailed { ref step, .. } if step == "Answer"));

        let session = storage.get_session("s2").unwrap().unwrap();
        assert_eq!(session.runs.len(), 1);
        assert_eq!(session.runs[0].status, RunStatus::Failed);
        assert!(session.runs[0].error.as_deref().unwrap().contains("Answer"));
        assert_eq!(session.runs[0].step_results.len(), 3);
    }

    #[tokio::test]
    async fn test_all_parallel_failures_stop_the_run() {
        let (csv, _) = failing("CsvTool Agent");
        let (web, _) = failing("Web Agent");
        let (reasoning, reasoning_mock) = replying("Reasoning Agent", "unused");
        let workflow = fan_in(csv, web, reasoning, None);

        let err = workflow.run("chicken", None, None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::AllParallelStepsFailed { .. }));
        assert!(reasoning_mock.trace().is_empty());
    }

    #[tokio::test]
    async fn test_missing_session_id_generates_one() {
        let (csv, _) = replying("CsvTool Agent", "a");
        let (web, _) = replying("Web Agent", "b");
        let (reasoning, _) = replying("Reasoning Agent", "c");
        let storage = storage();
        let workflow = fan_in(csv, web, reasoning, Some(storage.clone()));

        let run = workflow.run("chicken", None, None).await.unwrap();
        assert!(uuid::Uuid::parse_str(&run.session_id).is_ok());
        assert!(storage.get_session(&run.session_id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_parallel_steps_run_concurrently() {
        // each step blocks until the other has started; run one after the
        // other they would never finish
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let rendezvous = |name: &str| {
            let mock = Arc::new(MockAiClient::new(vec![
                Ok(AiResponse::with_tools(
                    "",
                    vec![ToolCall {
                        id: "toolu_1".to_string(),
                        name: "rendezvous".to_string(),
                        arguments: serde_json::json!({}),
                    }],
                )),
                Ok(AiResponse::text(format!("{} done", name))),
            ]));
            let tool: Arc<dyn Tool> = Arc::new(RendezvousTool(barrier.clone()));
            Arc::new(Agent::new(name, "test role", AiClient::Mock(mock), vec![tool], "be brief"))
        };
        let (reasoning, _) = replying("Reasoning Agent", "answer");
        let workflow = fan_in(rendezvous("CsvTool Agent"), rendezvous("Web Agent"), reasoning, None);

        let run = tokio::time::timeout(Duration::from_secs(5), workflow.run("chicken", None, None))
            .await
            .expect("parallel steps should not wait on each other")
            .unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.step_results[..2].iter().all(|r| r.success && r.tool_calls[0].success));
    }

    #[tokio::test]
    async fn test_reasoning_steps_are_kept_with_step_results() {
        let (csv, _) = replying("CsvTool Agent", "165 kcal");
        let (web, _) = replying("Web Agent", "try tofu");
        let mock = Arc::new(MockAiClient::new(vec![
            Ok(AiResponse::with_tools(
                "",
                vec![ToolCall {
                    id: "toolu_1".to_string(),
                    name: "think".to_string(),
                    arguments: serde_json::json!({"title": "Plan", "thought": "chart first"}),
                }],
            )),
            Ok(AiResponse::text("| kcal | 165 |")),
        ]));
        let reasoning = Arc::new(Agent::new(
            "Reasoning Agent",
            "test role",
            AiClient::Mock(mock),
            reasoning_toolkit(false),
            "be brief",
        ));
        let storage = storage();
        let workflow = fan_in(csv, web, reasoning, Some(storage.clone()));

        let run = workflow.run("chicken", Some("s1"), None).await.unwrap();
        assert_eq!(run.step_results[2].reasoning_steps.len(), 1);
        assert_eq!(run.step_results[2].reasoning_steps[0].title, "Plan");
        assert!(run.step_results[0].reasoning_steps.is_empty());

        let session = storage.get_session("s1").unwrap().unwrap();
        assert_eq!(session.runs[0].step_results[2].reasoning_steps.len(), 1);
    }

    #[tokio::test]
    async fn test_session_of_other_workflow_is_rejected_before_running() {
        let storage = storage();
        let mut foreign = WorkflowRun::new("s1", "other-flow", "tofu");
        foreign.complete("x".to_string());
        storage.append_run("Other Flow", None, &foreign).unwrap();

        let (csv, csv_mock) = replying("CsvTool Agent", "a");
        let (web, _) = replying("Web Agent", "b");
        let (reasoning, _) = replying("Reasoning Agent", "c");
        let workflow = fan_in(csv, web, reasoning, Some(storage.clone()));

        let err = workflow.run("chicken", Some("s1"), None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Storage(StorageError::WorkflowMismatch { .. })));
        assert!(csv_mock.trace().is_empty());
        assert_eq!(storage.get_session("s1").unwrap().unwrap().runs.len(), 1);
    }

    #[test]
    fn test_builder_rejects_invalid_definitions() {
        let (a, _) = replying("A", "x");
        let dup = Workflow::builder("Dup")
            .parallel(Parallel::new(
                "Group",
                vec![Step::new("Same", a.clone()), Step::new("Same", a.clone())],
            ))
            .build();
        assert!(matches!(dup, Err(WorkflowError::InvalidDefinition(_))));

        assert!(Workflow::builder("Empty").build().is_err());
        assert!(Workflow::builder("!!!").step(Step::new("S", a.clone())).build().is_err());
        assert!(Workflow::builder("Hollow")
            .parallel(Parallel::new("Group", vec![]))
            .build()
            .is_err());
    }

    #[test]
    fn test_stage_descriptors_and_agents() {
        let (csv, _) = replying("CsvTool Agent", "a");
        let (web, _) = replying("Web Agent", "b");
        let (reasoning, _) = replying("Reasoning Agent", "c");
        let workflow = fan_in(csv, web, reasoning, None);

        let json = serde_json::to_value(workflow.stage_descriptors()).unwrap();
        assert_eq!(json[0]["type"], "parallel");
        assert_eq!(json[0]["steps"][1]["agent"], "Web Agent");
        assert_eq!(json[1]["type"], "step");
        assert_eq!(workflow.agents().len(), 3);
    }
}
