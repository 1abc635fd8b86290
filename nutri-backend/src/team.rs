//! Coordinator team used for offline evaluation.
//!
//! In coordinate mode a leader model receives the request, delegates subtasks
//! to members through the `transfer_task_to_member` tool and writes the final
//! answer from their replies. The leader is an ordinary [`Agent`] whose tool
//! set is the team's shared tools plus the delegation tool.

use crate::agents::{Agent, AgentError, AgentRunOutput};
use crate::ai::{AiClient, AiError};
use crate::config::Config;
use crate::context::AppContext;
use crate::tools::builtin::{csv_toolkit, GoogleSearchTool};
use crate::tools::{
    PropertySchema, Tool, ToolContext, ToolDefinition, ToolGroup, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub const TEAM_CSV_FILES: [&str; 3] = ["food.csv", "food_nutrient.csv", "nutrient.csv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamMode {
    Coordinate,
}

pub struct Team {
    name: String,
    mode: TeamMode,
    members: Vec<Arc<Agent>>,
    leader: Agent,
}

impl Team {
    /// Build a coordinate-mode team. `tools` are shared tools the leader may
    /// call directly in addition to delegating.
    pub fn coordinate(
        name: impl Into<String>,
        members: Vec<Arc<Agent>>,
        tools: Vec<Arc<dyn Tool>>,
        client: AiClient,
    ) -> Self {
        let name = name.into();
        let mut leader_tools = tools;
        leader_tools.push(Arc::new(TransferTaskTool::new(members.clone())));

        let leader = Agent::new(
            format!("{} Leader", name),
            "Coordinate the team members to answer the user's request",
            client,
            leader_tools,
            coordinator_instructions(&members),
        );

        Team {
            name,
            mode: TeamMode::Coordinate,
            members,
            leader,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> TeamMode {
        self.mode
    }

    pub fn members(&self) -> &[Arc<Agent>] {
        &self.members
    }

    pub fn leader(&self) -> &Agent {
        &self.leader
    }

    pub async fn run(&self, input: &str, context: &ToolContext) -> Result<AgentRunOutput, AgentError> {
        log::info!("[TEAM] {} running with {} members", self.name, self.members.len());
        self.leader.run(input, context).await
    }
}

fn coordinator_instructions(members: &[Arc<Agent>]) -> String {
    let mut text = String::from(
        "You are the leader of a team of agents. Break the user's request into subtasks, \
         delegate each one to the best suited member with `transfer_task_to_member`, \
         then combine the members' answers into one complete response.\n\nTeam members:\n",
    );
    for member in members {
        text.push_str(&format!(
            "- member_id: {} | name: {} | role: {}\n",
            member.id(),
            member.name(),
            member.role()
        ));
    }
    text
}

/// Delegation tool: runs a member agent on a subtask and returns its answer
pub struct TransferTaskTool {
    members: Vec<Arc<Agent>>,
}

impl TransferTaskTool {
    pub fn new(members: Vec<Arc<Agent>>) -> Self {
        TransferTaskTool { members }
    }

    fn find(&self, member_id: &str) -> Option<&Arc<Agent>> {
        let wanted = crate::util::slugify(member_id);
        self.members.iter().find(|m| m.id() == wanted)
    }
}

#[derive(Debug, Deserialize)]
struct TransferParams {
    member_id: String,
    task_description: String,
    expected_output: Option<String>,
}

#[async_trait]
impl Tool for TransferTaskTool {
    fn definition(&self) -> ToolDefinition {
        let mut properties = HashMap::new();
        properties.insert(
            "member_id".to_string(),
            PropertySchema {
                enum_values: Some(self.members.iter().map(|m| m.id()).collect()),
                ..PropertySchema::string("ID of the member to transfer the task to")
            },
        );
        properties.insert(
            "task_description".to_string(),
            PropertySchema::string("Clear description of the subtask for the member"),
        );
        properties.insert(
            "expected_output".to_string(),
            PropertySchema::string("What the member's answer should contain. Optional."),
        );

        ToolDefinition {
            name: "transfer_task_to_member".to_string(),
            description: "Delegate a subtask to a team member and receive their answer.".to_string(),
            input_schema: ToolInputSchema {
                schema_type: "object".to_string(),
                properties,
                required: vec!["member_id".to_string(), "task_description".to_string()],
            },
            group: ToolGroup::Team,
        }
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: TransferParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };

        let member = match self.find(&params.member_id) {
            Some(m) => m,
            None => {
                let ids: Vec<String> = self.members.iter().map(|m| m.id()).collect();
                return ToolResult::error(format!(
                    "Unknown member '{}'. Members: {}",
                    params.member_id,
                    ids.join(", ")
                ));
            }
        };

        let mut task = params.task_description;
        if let Some(expected) = params.expected_output.filter(|e| !e.trim().is_empty()) {
            task.push_str(&format!("\n\nExpected output: {}", expected));
        }

        log::info!("[TEAM] Delegating to {}", member.name());
        match member.run(&task, context).await {
            Ok(output) => ToolResult::success(output.content),
            Err(e) => ToolResult::error(format!("{} failed: {}", member.name(), e)),
        }
    }
}

/// Shared tools of the evaluation team: web search and the CSV toolkit over all
/// three nutrition files
fn team_tools(config: &Config) -> Vec<Arc<dyn Tool>> {
    let mut tools: Vec<Arc<dyn Tool>> = vec![Arc::new(GoogleSearchTool::new(
        config.google_api_key.clone(),
        config.google_cse_id.clone(),
    ))];
    tools.extend(csv_toolkit(
        TEAM_CSV_FILES.iter().map(|f| config.data_file(f)).collect(),
    ));
    tools
}

/// Build the evaluation team from the agents owned by `context`
pub fn create_team(context: &AppContext) -> Result<Team, AiError> {
    let config = context.config();
    Ok(Team::coordinate(
        "Nutri-AI Team",
        vec![
            context.web_agent(),
            context.csv_agent(),
            context.reasoning_agent(),
        ],
        team_tools(config),
        AiClient::from_config(config, &config.model)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiResponse, MockAiClient, ToolCall};

    fn member(name: &str, reply: &str) -> Arc<Agent> {
        Arc::new(Agent::new(
            name,
            format!("{} role", name),
            AiClient::Mock(Arc::new(MockAiClient::replying(reply, 1))),
            vec![],
            "help",
        ))
    }

    fn transfer(member_id: &str) -> ToolCall {
        ToolCall {
            id: "toolu_t".to_string(),
            name: "transfer_task_to_member".to_string(),
            arguments: serde_json::json!({
                "member_id": member_id,
                "task_description": "Nutrition of chicken",
                "expected_output": "a table"
            }),
        }
    }

    #[tokio::test]
    async fn test_leader_delegates_and_answers() {
        let csv = member("CsvTool Agent", "165 kcal per 100g");
        let leader_mock = Arc::new(MockAiClient::new(vec![
            Ok(AiResponse::with_tools("", vec![transfer("csvtool-agent")])),
            Ok(AiResponse::text("Chicken: 165 kcal. Alternatives: tofu")),
        ]));
        let team = Team::coordinate(
            "Test Team",
            vec![csv],
            vec![],
            AiClient::Mock(leader_mock.clone()),
        );

        let output = team.run("chicken", &ToolContext::new("run-1", None)).await.unwrap();
        assert_eq!(output.tool_calls.len(), 1);
        assert!(output.tool_calls[0].success);
        assert!(output.content.contains("tofu"));
        assert!(leader_mock.trace()[0].messages[0].content.contains("member_id: csvtool-agent"));
    }

    #[tokio::test]
    async fn test_unknown_member_is_tool_error() {
        let tool = TransferTaskTool::new(vec![member("Web Agent", "x")]);
        let result = tool
            .execute(
                serde_json::json!({"member_id": "chef", "task_description": "cook"}),
                &ToolContext::new("run-1", None),
            )
            .await;
        assert!(!result.success);
        assert!(result.content.contains("web-agent"));
    }

    #[test]
    fn test_member_lookup_accepts_display_name() {
        let tool = TransferTaskTool::new(vec![member("Web Agent", "x")]);
        assert!(tool.find("Web Agent").is_some());
        assert!(tool.find("web-agent").is_some());
    }

    #[test]
    fn test_create_team_shares_context_agents() {
        let config = Config {
            anthropic_api_key: "sk-test".to_string(),
            ..Default::default()
        };
        let context = AppContext::new(config).unwrap();
        let team = create_team(&context).unwrap();

        assert_eq!(team.mode(), TeamMode::Coordinate);
        assert_eq!(team.members().len(), 3);
        assert!(Arc::ptr_eq(&team.members()[0], &context.web_agent()));

        let leader_tools = team.leader().tools();
        assert!(leader_tools.has_tool("google_search"));
        assert!(leader_tools.has_tool("search_csv_file"));
        assert!(leader_tools.has_tool("transfer_task_to_member"));
        let listing = leader_tools.get("list_csv_files").unwrap().definition();
        assert!(listing.description.contains("food_nutrient"));
        assert!(listing.description.contains("nutrient"));
    }
}
