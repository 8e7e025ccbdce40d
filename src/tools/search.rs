//! Web search through a SerpAPI-compatible endpoint.
//!
//! `GET {base_url}?q=<query>&api_key=<key>&engine=<engine>&num=<n>`. The
//! provider's `organic_results` are rendered as title / link / snippet blocks.
//! An `error` field or an empty result list is a failure.

use serde::Deserialize;

use crate::config::SearchToolConfig;
use crate::models::{ToolKind, ToolResult};
use crate::tools::ToolAdapter;

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
pub struct OrganicResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// Formats up to `limit` results, or explains why there are none.
pub fn format_results(response: &SearchResponse, limit: usize) -> Result<String, String> {
    if let Some(error) = &response.error {
        return Err(format!("search failed: {}", error));
    }
    if response.organic_results.is_empty() {
        return Err("no search results found".to_string());
    }

    let blocks: Vec<String> = response
        .organic_results
        .iter()
        .take(limit)
        .map(|r| format!("Title: {}\nLink: {}\nSnippet: {}\n", r.title, r.link, r.snippet))
        .collect();
    Ok(format!("Search results:\n\n{}", blocks.join("\n")))
}

pub struct WebSearch {
    config: SearchToolConfig,
}

impl WebSearch {
    pub fn new(config: SearchToolConfig) -> Self {
        Self { config }
    }

    fn fetch(&self, query: &str) -> Result<String, String> {
        let num = self.config.num_results.to_string();
        let client = reqwest::blocking::Client::new();
        let response = client
            .get(&self.config.base_url)
            .query(&[
                ("q", query),
                ("api_key", self.config.api_key.as_str()),
                ("engine", self.config.provider.engine()),
                ("num", num.as_str()),
            ])
            .send()
            .map_err(|e| format!("search request error: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| format!("search response error: {}", e))?;
        let parsed: Option<SearchResponse> = serde_json::from_str(&body).ok();

        match parsed {
            Some(parsed) if status.is_success() || parsed.error.is_some() => {
                format_results(&parsed, self.config.num_results)
            }
            _ if !status.is_success() => Err(format!(
                "search request failed (HTTP {})",
                status.as_u16()
            )),
            _ => Err("unexpected search response".to_string()),
        }
    }
}

impl ToolAdapter for WebSearch {
    fn kind(&self) -> ToolKind {
        ToolKind::Search
    }

    fn description(&self) -> &str {
        "Search the web and summarize the top results"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn invoke(&self, argument: &str) -> ToolResult {
        if !self.config.enabled {
            return ToolResult::failed(ToolKind::Search, "web search is disabled");
        }
        if self.config.api_key.trim().is_empty() {
            return ToolResult::failed(
                ToolKind::Search,
                "search API key is not configured (set [tools.search] api_key)",
            );
        }
        let query = argument.trim();
        if query.is_empty() {
            return ToolResult::failed(ToolKind::Search, "search query is empty");
        }

        match self.fetch(query) {
            Ok(text) => ToolResult::ok(ToolKind::Search, text),
            Err(reason) => ToolResult::failed(ToolKind::Search, reason),
        }
    }
}
