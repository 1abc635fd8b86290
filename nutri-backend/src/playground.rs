use crate::workflow::Workflow;
use std::sync::Arc;

pub const PLAYGROUND_NAME: &str = "Nutri-AI";
pub const PLAYGROUND_DESCRIPTION: &str =
    "Interactive UI for providing nutritional facts and alternative options";
pub const APP_ID: &str = "nutri-ai";

/// Workflows exposed over the playground HTTP API
pub struct Playground {
    pub name: String,
    pub description: String,
    pub app_id: String,
    workflows: Vec<Arc<Workflow>>,
}

impl Playground {
    pub fn new(workflows: Vec<Arc<Workflow>>) -> Self {
        Playground {
            name: PLAYGROUND_NAME.to_string(),
            description: PLAYGROUND_DESCRIPTION.to_string(),
            app_id: APP_ID.to_string(),
            workflows,
        }
    }

    pub fn workflows(&self) -> &[Arc<Workflow>] {
        &self.workflows
    }

    pub fn workflow(&self, workflow_id: &str) -> Option<Arc<Workflow>> {
        self.workflows
            .iter()
            .find(|w| w.workflow_id() == workflow_id)
            .cloned()
    }
}
