//! Factories for the three Nutri-AI agents.
//!
//! Each factory is pure: it reads configuration, builds tools and a model
//! client, and touches neither the network nor the filesystem. Calling one
//! twice yields two independent agents with identical configuration.

use super::Agent;
use crate::ai::{AiClient, AiError};
use crate::config::Config;
use crate::tools::builtin::{csv_toolkit, reasoning_toolkit, GoogleSearchTool};
use std::sync::Arc;

pub const WEB_AGENT_NAME: &str = "Web Agent";
pub const CSV_AGENT_NAME: &str = "CsvTool Agent";
pub const REASONING_AGENT_NAME: &str = "Reasoning Agent";

/// CSV file the CSV agent is bound to
pub const FOOD_CSV: &str = "food.csv";

const WEB_AGENT_INSTRUCTIONS: &str = "\
You are responsible for finding healthy alternatives to the user's input (desired food).
If needed, you will also search the Internet for the nutritional value of the food if the CsvTool Agent cannot find it through the given files.
Provide links to where you got the information from.";

const CSV_AGENT_INSTRUCTIONS: &str = "\
You are responsible for returning information about the nutritional value for the user's input.
If you are unable to find information based on the files given, give this task to the Web Agent.";

const REASONING_AGENT_INSTRUCTIONS: &str = "\
You are responsible for compiling the information from the previous steps into a comprehensible summary and conclusion as the output.
Please organize the nutritional information as a chart and provide a bullet list of possible alternative healthy options.";

pub fn create_web_agent(config: &Config) -> Result<Agent, AiError> {
    Ok(Agent::new(
        WEB_AGENT_NAME,
        "Search the web for information",
        AiClient::from_config(config, &config.model)?,
        vec![Arc::new(GoogleSearchTool::new(
            config.google_api_key.clone(),
            config.google_cse_id.clone(),
        ))],
        WEB_AGENT_INSTRUCTIONS,
    ))
}

pub fn create_csv_agent(config: &Config) -> Result<Agent, AiError> {
    Ok(Agent::new(
        CSV_AGENT_NAME,
        "Read a CSV file and comprehend the information.",
        AiClient::from_config(config, &config.model)?,
        csv_toolkit(vec![config.data_file(FOOD_CSV)]),
        CSV_AGENT_INSTRUCTIONS,
    ))
}

pub fn create_reasoning_agent(config: &Config) -> Result<Agent, AiError> {
    Ok(Agent::new(
        REASONING_AGENT_NAME,
        "Compile the information from the previous information. Create a comprehensible summary and conclusion for future plans.",
        AiClient::from_config(config, &config.model)?,
        reasoning_toolkit(true),
        REASONING_AGENT_INSTRUCTIONS,
    ))
}
