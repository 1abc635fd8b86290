use crate::tools::types::{ToolContext, ToolDefinition, ToolGroup, ToolResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool definition for the AI API
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool with the given parameters
    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult;

    /// Returns the tool's name
    fn name(&self) -> String {
        self.definition().name
    }

    /// Returns the tool's group
    fn group(&self) -> ToolGroup {
        self.definition().group
    }

    /// Usage guidance appended to the system prompt of agents carrying this tool
    fn instructions(&self) -> Option<String> {
        None
    }
}

/// The set of tools one agent (or team leader) may call.
/// Uses interior mutability so a registry can be shared behind an `Arc`.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Build a registry from a list of tools
    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        let registry = Self::new();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        if self.tools.write().insert(name.clone(), tool).is_some() {
            log::warn!("[REGISTRY] Tool '{}' registered twice, keeping the latest", name);
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// List all registered tools, sorted by name
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<Arc<dyn Tool>> = self.tools.read().values().cloned().collect();
        tools.sort_by_key(|t| t.name());
        tools
    }

    /// Tool names, sorted
    pub fn names(&self) -> Vec<String> {
        self.list().iter().map(|t| t.name()).collect()
    }

    /// Tool definitions to send to the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.list().iter().map(|tool| tool.definition()).collect()
    }

    /// Collected usage instructions from tools that provide them (deduplicated)
    pub fn instructions(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for tool in self.list() {
            if let Some(text) = tool.instructions() {
                if !out.contains(&text) {
                    out.push(text);
                }
            }
        }
        out
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, params: Value, context: &ToolContext) -> ToolResult {
        let tool = match self.get(name) {
            Some(t) => t,
            None => return ToolResult::error(format!("Tool '{}' not found", name)),
        };

        tool.execute(params, context).await
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    pub fn has_group(&self, group: ToolGroup) -> bool {
        self.tools.read().values().any(|t| t.group() == group)
    }

    /// Get count of registered tools
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::types::ToolInputSchema;

    struct MockTool {
        definition: ToolDefinition,
        instructions: Option<String>,
    }

    impl MockTool {
        fn new(name: &str, group: ToolGroup) -> Self {
            MockTool {
                definition: ToolDefinition {
                    name: name.to_string(),
                    description: format!("Mock {} tool", name),
                    input_schema: ToolInputSchema::default(),
                    group,
                },
                instructions: None,
            }
        }
    }

    #[async_trait]
    impl Tool for MockTool {
        fn definition(&self) -> ToolDefinition {
            self.definition.clone()
        }

        async fn execute(&self, params: Value, _context: &ToolContext) -> ToolResult {
            ToolResult::success(format!("mock result for {}", params))
        }

        fn instructions(&self) -> Option<String> {
            self.instructions.clone()
        }
    }

    #[test]
    fn test_registry_register_and_get() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(MockTool::new("google_search", ToolGroup::Web)));

        assert!(registry.has_tool("google_search"));
        assert!(!registry.has_tool("nonexistent"));
        assert!(registry.has_group(ToolGroup::Web));
        assert!(!registry.has_group(ToolGroup::Data));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_names_are_sorted() {
        let registry = ToolRegistry::with_tools(vec![
            Arc::new(MockTool::new("think", ToolGroup::Reasoning)),
            Arc::new(MockTool::new("analyze", ToolGroup::Reasoning)),
        ]);
        assert_eq!(registry.names(), vec!["analyze", "think"]);
    }

    #[test]
    fn test_instructions_deduplicated() {
        let mut a = MockTool::new("think", ToolGroup::Reasoning);
        a.instructions = Some("reason first".to_string());
        let mut b = MockTool::new("analyze", ToolGroup::Reasoning);
        b.instructions = Some("reason first".to_string());
        let registry = ToolRegistry::with_tools(vec![Arc::new(a), Arc::new(b)]);
        assert_eq!(registry.instructions(), vec!["reason first".to_string()]);
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_is_error_result() {
        let registry = ToolRegistry::new();
        let context = ToolContext::new("run-1", None);
        let result = registry
            .execute("missing", serde_json::json!({}), &context)
            .await;
        assert!(!result.success);
        assert!(result.content.contains("not found"));
    }

    #[tokio::test]
    async fn test_execute_dispatches_to_tool() {
        let registry = ToolRegistry::with_tools(vec![Arc::new(MockTool::new(
            "get_columns",
            ToolGroup::Data,
        ))]);
        let context = ToolContext::new("run-1", None);
        let result = registry
            .execute("get_columns", serde_json::json!({"csv_name": "food"}), &context)
            .await;
        assert!(result.success);
        assert!(result.content.contains("food"));
    }
}
