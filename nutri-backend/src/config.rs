use std::env;
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";
pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_DATABASE_URL: &str = "tmp/nutri-ai.db";
pub const DEFAULT_SESSION_TABLE: &str = "nutri-ai_sessions";

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub session_table: String,
    pub anthropic_api_key: String,
    pub anthropic_endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    /// Directory holding food.csv, food_nutrient.csv and nutrient.csv
    pub data_dir: PathBuf,
    pub google_api_key: Option<String>,
    pub google_cse_id: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or_default("PORT", 7777),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            session_table: env::var("SESSION_TABLE")
                .unwrap_or_else(|_| DEFAULT_SESSION_TABLE.to_string()),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            anthropic_endpoint: env::var("ANTHROPIC_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            model: env::var("NUTRI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            max_tokens: parse_or_default("NUTRI_MAX_TOKENS", 4096),
            data_dir: env::var("NUTRI_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            google_api_key: non_empty_var("GOOGLE_API_KEY"),
            google_cse_id: non_empty_var("GOOGLE_CSE_ID"),
        }
    }

    /// Path of a data file inside the configured data directory
    pub fn data_file(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(file_name)
    }

    pub fn api_key_configured(&self) -> bool {
        !self.anthropic_api_key.trim().is_empty()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7777,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            session_table: DEFAULT_SESSION_TABLE.to_string(),
            anthropic_api_key: String::new(),
            anthropic_endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            data_dir: PathBuf::from("."),
            google_api_key: None,
            google_cse_id: None,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or_default<T: std::str::FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("{} is not a valid number ({}), using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
