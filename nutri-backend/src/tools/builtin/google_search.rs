//! Google web search tool
//!
//! Queries the Google Custom Search JSON API and returns a compact JSON list of
//! results (title, url, description) so the model can cite its sources.

use crate::tools::registry::Tool;
use crate::tools::types::{
    PropertySchema, ToolContext, ToolDefinition, ToolGroup, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

const API_BASE: &str = "https://www.googleapis.com/customsearch/v1";
const DEFAULT_MAX_RESULTS: u32 = 5;

pub struct GoogleSearchTool {
    definition: ToolDefinition,
    api_key: Option<String>,
    cse_id: Option<String>,
    endpoint: String,
}

impl GoogleSearchTool {
    pub fn new(api_key: Option<String>, cse_id: Option<String>) -> Self {
        let mut properties = HashMap::new();

        properties.insert(
            "query".to_string(),
            PropertySchema::string("The search query, e.g. 'chicken breast nutrition per 100g'"),
        );
        properties.insert(
            "max_results".to_string(),
            PropertySchema::integer(
                "Maximum number of results to return (1-10)",
                Some(DEFAULT_MAX_RESULTS as i64),
            ),
        );
        properties.insert(
            "language".to_string(),
            PropertySchema::string("Two-letter language code for results. Optional, default 'en'."),
        );

        GoogleSearchTool {
            definition: ToolDefinition {
                name: "google_search".to_string(),
                description: "Search Google for a query. Returns a JSON list of results with title, url and description. Use the urls as sources when you report facts.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["query".to_string()],
                },
                group: ToolGroup::Web,
            },
            api_key,
            cse_id,
            endpoint: API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

#[derive(Debug, Deserialize)]
struct Params {
    query: String,
    max_results: Option<u32>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
struct SearchHit {
    title: String,
    url: String,
    description: String,
}

fn clamp_results(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_MAX_RESULTS).clamp(1, 10)
}

fn to_hits(response: SearchResponse) -> Vec<SearchHit> {
    response
        .items
        .into_iter()
        .filter_map(|item| {
            let url = item.link?;
            Some(SearchHit {
                title: item.title.unwrap_or_default(),
                url,
                description: item.snippet.unwrap_or_default().replace('\n', " "),
            })
        })
        .collect()
}

#[async_trait]
impl Tool for GoogleSearchTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: Params = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };

        let query = params.query.trim();
        if query.is_empty() {
            return ToolResult::error("'query' is required");
        }

        let (api_key, cse_id) = match (&self.api_key, &self.cse_id) {
            (Some(k), Some(c)) => (k, c),
            _ => {
                return ToolResult::error(
                    "Web search is not configured (GOOGLE_API_KEY and GOOGLE_CSE_ID are required)",
                );
            }
        };

        let url = format!(
            "{}?key={}&cx={}&q={}&num={}&hl={}",
            self.endpoint,
            urlencoding::encode(api_key),
            urlencoding::encode(cse_id),
            urlencoding::encode(query),
            clamp_results(params.max_results),
            urlencoding::encode(params.language.as_deref().unwrap_or("en")),
        );

        log::info!("[SEARCH] Google search for '{}'", query);

        let resp = match context
            .http_client()
            .get(&url)
            .timeout(std::time::Duration::from_secs(15))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Google search request failed: {}", e)),
        };

        if !resp.status().is_success() {
            return ToolResult::error(format!("Google search API error: {}", resp.status()));
        }

        let data: SearchResponse = match resp.json().await {
            Ok(d) => d,
            Err(e) => return ToolResult::error(format!("Failed to parse response: {}", e)),
        };

        let hits = to_hits(data);
        if hits.is_empty() {
            return ToolResult::error(format!("No results found for '{}'", query));
        }

        ToolResult::json(&hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_results() {
        assert_eq!(clamp_results(None), 5);
        assert_eq!(clamp_results(Some(0)), 1);
        assert_eq!(clamp_results(Some(3)), 3);
        assert_eq!(clamp_results(Some(50)), 10);
    }

    #[test]
    fn test_to_hits_skips_items_without_link() {
        let response: SearchResponse = serde_json::from_value(serde_json::json!({
            "items": [
                {"title": "Chicken, broiler", "link": "https://fdc.nal.usda.gov/x", "snippet": "Protein\n31g"},
                {"title": "No link here"}
            ]
        }))
        .unwrap();
        let hits = to_hits(response);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://fdc.nal.usda.gov/x");
        assert_eq!(hits[0].description, "Protein 31g");
    }

    #[test]
    fn test_empty_response_has_no_items() {
        let response: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(to_hits(response).is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials_is_tool_error() {
        let tool = GoogleSearchTool::new(None, None).with_endpoint("http://127.0.0.1:9");
        let context = ToolContext::new("run-1", None);
        let result = tool
            .execute(serde_json::json!({"query": "tofu"}), &context)
            .await;
        assert!(!result.success);
        assert!(result.content.contains("GOOGLE_API_KEY"));
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let tool = GoogleSearchTool::new(Some("k".into()), Some("c".into()));
        let context = ToolContext::new("run-1", None);
        let result = tool.execute(serde_json::json!({"query": "  "}), &context).await;
        assert!(!result.success);
    }
}
