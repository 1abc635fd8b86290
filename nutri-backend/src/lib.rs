//! Nutri-AI backend: nutrition agents, the Nutri-AI workflow, its SQLite
//! session store and the playground HTTP API.

pub mod agents;
pub mod ai;
pub mod config;
pub mod context;
pub mod controllers;
pub mod db;
pub mod eval;
pub mod http;
pub mod playground;
pub mod team;
pub mod tools;
pub mod util;
pub mod workflow;

use config::Config;
use playground::Playground;
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub playground: Arc<Playground>,
}
