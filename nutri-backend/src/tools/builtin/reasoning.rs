//! Reasoning toolkit: `think` and `analyze`.
//!
//! Neither tool has side effects outside the run: each call appends a step to
//! the run's reasoning log (held by the `ToolContext`) and returns the log so
//! far, giving the model a scratchpad it can build on.

use crate::tools::registry::Tool;
use crate::tools::types::{
    PropertySchema, ReasoningStep, ToolContext, ToolDefinition, ToolGroup, ToolInputSchema,
    ToolResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub const REASONING_INSTRUCTIONS: &str = "\
You have access to the `think` and `analyze` tools to work through problems step by step.
- Use `think` as a scratchpad before answering: break the task down, note what the previous steps provided and plan the structure of your answer.
- Use `analyze` after gathering or comparing information to evaluate it and decide the next action.
- Reason iteratively. Each call returns your full reasoning log so far.
- Once your reasoning is complete, stop calling tools and write the final answer for the user.";

/// Build the reasoning toolkit. With `add_instructions`, the tools contribute a
/// usage guide to the system prompt of the agent carrying them.
pub fn reasoning_toolkit(add_instructions: bool) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ThinkTool { add_instructions }),
        Arc::new(AnalyzeTool { add_instructions }),
    ]
}

fn format_log(steps: &[ReasoningStep]) -> String {
    let mut out = String::from("Reasoning log:\n");
    for (i, step) in steps.iter().enumerate() {
        out.push_str(&format!("\n{}. [{}] {}\n{}\n", i + 1, step.kind, step.title, step.body));
        if let Some(action) = &step.next_action {
            out.push_str(&format!("Next: {}\n", action));
        }
        if let Some(confidence) = step.confidence {
            out.push_str(&format!("Confidence: {:.2}\n", confidence));
        }
    }
    out
}

fn valid_confidence(confidence: Option<f64>) -> Result<Option<f64>, String> {
    match confidence {
        Some(c) if !(0.0..=1.0).contains(&c) => {
            Err(format!("confidence must be between 0 and 1, got {}", c))
        }
        other => Ok(other),
    }
}

pub struct ThinkTool {
    add_instructions: bool,
}

#[derive(Debug, Deserialize)]
struct ThinkParams {
    title: String,
    thought: String,
    action: Option<String>,
    confidence: Option<f64>,
}

#[async_trait]
impl Tool for ThinkTool {
    fn definition(&self) -> ToolDefinition {
        let mut properties = HashMap::new();
        properties.insert("title".to_string(), PropertySchema::string("Short title for this thought"));
        properties.insert("thought".to_string(), PropertySchema::string("Your detailed reasoning"));
        properties.insert(
            "action".to_string(),
            PropertySchema::string("What you intend to do next. Optional."),
        );
        properties.insert(
            "confidence".to_string(),
            PropertySchema::number("Confidence in this thought, 0.0 to 1.0. Optional."),
        );

        ToolDefinition {
            name: "think".to_string(),
            description: "Scratchpad for step-by-step reasoning. Record a thought before answering; returns the reasoning log so far.".to_string(),
            input_schema: ToolInputSchema {
                schema_type: "object".to_string(),
                properties,
                required: vec!["title".to_string(), "thought".to_string()],
            },
            group: ToolGroup::Reasoning,
        }
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: ThinkParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };
        let confidence = match valid_confidence(params.confidence) {
            Ok(c) => c,
            Err(e) => return ToolResult::error(e),
        };

        let log = context.push_reasoning(ReasoningStep {
            kind: "think".to_string(),
            title: params.title,
            body: params.thought,
            next_action: params.action,
            confidence,
        });
        ToolResult::success(format_log(&log))
    }

    fn instructions(&self) -> Option<String> {
        self.add_instructions.then(|| REASONING_INSTRUCTIONS.to_string())
    }
}

pub struct AnalyzeTool {
    add_instructions: bool,
}

#[derive(Debug, Deserialize)]
struct AnalyzeParams {
    title: String,
    result: String,
    analysis: String,
    next_action: Option<String>,
    confidence: Option<f64>,
}

#[async_trait]
impl Tool for AnalyzeTool {
    fn definition(&self) -> ToolDefinition {
        let mut properties = HashMap::new();
        properties.insert("title".to_string(), PropertySchema::string("Short title for this analysis"));
        properties.insert(
            "result".to_string(),
            PropertySchema::string("The information or outcome being analyzed"),
        );
        properties.insert(
            "analysis".to_string(),
            PropertySchema::string("Your evaluation of the result"),
        );
        properties.insert(
            "next_action".to_string(),
            PropertySchema {
                enum_values: Some(vec![
                    "continue".to_string(),
                    "validate".to_string(),
                    "final_answer".to_string(),
                ]),
                ..PropertySchema::string("What to do next. Optional.")
            },
        );
        properties.insert(
            "confidence".to_string(),
            PropertySchema::number("Confidence in this analysis, 0.0 to 1.0. Optional."),
        );

        ToolDefinition {
            name: "analyze".to_string(),
            description: "Evaluate information gathered so far and decide the next action. Returns the reasoning log so far.".to_string(),
            input_schema: ToolInputSchema {
                schema_type: "object".to_string(),
                properties,
                required: vec![
                    "title".to_string(),
                    "result".to_string(),
                    "analysis".to_string(),
                ],
            },
            group: ToolGroup::Reasoning,
        }
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: AnalyzeParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };
        let confidence = match valid_confidence(params.confidence) {
            Ok(c) => c,
            Err(e) => return ToolResult::error(e),
        };

        let log = context.push_reasoning(ReasoningStep {
            kind: "analyze".to_string(),
            title: params.title,
            body: format!("Result: {}\nAnalysis: {}", params.result, params.analysis),
            next_action: params.next_action,
            confidence,
        });
        ToolResult::success(format_log(&log))
    }

    fn instructions(&self) -> Option<String> {
        self.add_instructions.then(|| REASONING_INSTRUCTIONS.to_string())
    }
}
