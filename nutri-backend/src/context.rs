//! Application context: configuration plus the shared agent instances.
//!
//! Built once at startup and handed to the workflow and team builders, so
//! every consumer works with the same `Arc<Agent>`s.

use crate::agents::{create_csv_agent, create_reasoning_agent, create_web_agent, Agent};
use crate::ai::AiError;
use crate::config::Config;
use std::sync::Arc;

pub struct AppContext {
    config: Config,
    web_agent: Arc<Agent>,
    csv_agent: Arc<Agent>,
    reasoning_agent: Arc<Agent>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self, AiError> {
        let web_agent = Arc::new(create_web_agent(&config)?);
        let csv_agent = Arc::new(create_csv_agent(&config)?);
        let reasoning_agent = Arc::new(create_reasoning_agent(&config)?);

        if !config.api_key_configured() {
            log::warn!("ANTHROPIC_API_KEY is not set; agent runs will fail until it is configured");
        }

        Ok(AppContext {
            config,
            web_agent,
            csv_agent,
            reasoning_agent,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn web_agent(&self) -> Arc<Agent> {
        self.web_agent.clone()
    }

    pub fn csv_agent(&self) -> Arc<Agent> {
        self.csv_agent.clone()
    }

    pub fn reasoning_agent(&self) -> Arc<Agent> {
        self.reasoning_agent.clone()
    }

    pub fn agents(&self) -> Vec<Arc<Agent>> {
        vec![self.web_agent(), self.csv_agent(), self.reasoning_agent()]
    }
}
