pub mod builtin;
pub mod registry;
pub mod types;

pub use registry::{Tool, ToolRegistry};
pub use types::{
    PropertySchema, ReasoningStep, ToolContext, ToolDefinition, ToolGroup, ToolInputSchema,
    ToolResult,
};
