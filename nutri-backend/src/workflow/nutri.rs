//! The Nutri-AI workflow: CSV lookup and web search in parallel, then a
//! reasoning step that writes the final chart and alternatives.

use super::{Parallel, Step, Workflow, WorkflowError};
use crate::context::AppContext;
use crate::db::SqliteStorage;
use std::sync::Arc;

pub const WORKFLOW_NAME: &str = "Nutri-AI";
pub const WORKFLOW_DESCRIPTION: &str = "\
    An intelligent agentic AI system that responds to your input of food with its nutritional information. \
    It provides a chart with values, an indepth summary, and future steps. \
    Please enter a food you would like to review its nutritional information.";

pub const CSV_STEP: &str = "CSV File Analysis Phase";
pub const WEB_STEP: &str = "Web Search Phase";
pub const RESPONSE_STEP: &str = "Response Generation Phase";
const GATHER_STAGE: &str = "Information Gathering Phase";

pub fn build_nutri_workflow(
    context: &AppContext,
    storage: Option<Arc<SqliteStorage>>,
) -> Result<Workflow, WorkflowError> {
    let mut builder = Workflow::builder(WORKFLOW_NAME)
        .description(WORKFLOW_DESCRIPTION)
        .parallel(Parallel::new(
            GATHER_STAGE,
            vec![
                Step::new(CSV_STEP, context.csv_agent()),
                Step::new(WEB_STEP, context.web_agent()),
            ],
        ))
        .step(Step::new(RESPONSE_STEP, context.reasoning_agent()));

    if let Some(storage) = storage {
        builder = builder.storage(storage);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::workflow::Stage;

    fn context() -> AppContext {
        AppContext::new(Config {
            anthropic_api_key: "sk-test".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_workflow_shape() {
        let context = context();
        let storage = Arc::new(SqliteStorage::open(":memory:", "nutri-ai_sessions").unwrap());
        let workflow = build_nutri_workflow(&context, Some(storage)).unwrap();

        assert_eq!(workflow.workflow_id(), "nutri-ai");
        assert!(workflow
            .description()
            .starts_with("An intelligent agentic AI system that responds to your input of food"));
        assert!(workflow.description().contains("a chart with values, an indepth summary, and future steps"));
        assert_eq!(workflow.stages().len(), 2);

        match &workflow.stages()[0] {
            Stage::Parallel(group) => {
                let names: Vec<&str> = group.steps.iter().map(|s| s.name.as_str()).collect();
                assert_eq!(names, vec![CSV_STEP, WEB_STEP]);
                assert!(Arc::ptr_eq(&group.steps[0].agent, &context.csv_agent()));
                assert!(Arc::ptr_eq(&group.steps[1].agent, &context.web_agent()));
            }
            Stage::Step(_) => panic!("first stage should be parallel"),
        }
        match &workflow.stages()[1] {
            Stage::Step(step) => {
                assert_eq!(step.name, RESPONSE_STEP);
                assert_eq!(step.agent.name(), "Reasoning Agent");
            }
            Stage::Parallel(_) => panic!("second stage should be a single step"),
        }

        let storage = workflow.storage().unwrap();
        assert_eq!(storage.table_name(), "nutri-ai_sessions");
        assert_eq!(storage.mode(), "workflow_v2");
    }
}
