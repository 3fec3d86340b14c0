//! Optional web search: ranked snippets that search-enabled steps can cite.
//!
//! Search is best-effort. The orchestrator logs a [`SearchError`] and runs the
//! step without reference material; it never fails a request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(String),
    #[error("search backend returned HTTP {status}")]
    Status { status: u16 },
    #[error("search response could not be decoded: {0}")]
    Decode(String),
}

/// Query in, ranked snippets out.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Snippet>, SearchError>;
}

/// [`SearchBackend`] over the Serper.dev Google search API.
#[derive(Debug, Clone)]
pub struct SerperSearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl SerperSearch {
    pub fn new(api_key: impl Into<String>) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| SearchError::Request(e.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: SERPER_ENDPOINT.to_string(),
        })
    }

    /// Build from `SERPER_API_KEY`; `None` when the variable is unset or empty.
    pub fn from_env() -> Option<Result<Self, SearchError>> {
        std::env::var("SERPER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(Self::new)
    }

    /// Point at a different endpoint (self-hosted proxy, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    position: Option<u32>,
}

#[async_trait]
impl SearchBackend for SerperSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Snippet>, SearchError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&SerperRequest {
                q: query,
                num: limit,
            })
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Status {
                status: response.status().as_u16(),
            });
        }

        let body: SerperResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;

        let snippets = rank_organic(body.organic, limit);
        debug!("Search '{}': {} snippets", query, snippets.len());
        Ok(snippets)
    }
}

fn rank_organic(mut organic: Vec<SerperOrganic>, limit: usize) -> Vec<Snippet> {
    organic.sort_by_key(|o| o.position.unwrap_or(u32::MAX));
    organic
        .into_iter()
        .filter(|o| !o.snippet.trim().is_empty())
        .take(limit)
        .map(|o| Snippet {
            title: o.title,
            link: o.link,
            snippet: o.snippet,
        })
        .collect()
}

/// Render snippets as the bullet list appended to a step prompt.
pub fn format_references(snippets: &[Snippet]) -> String {
    snippets
        .iter()
        .map(|s| format!("- {}: {}", s.title.trim(), s.snippet.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organic_results_are_ranked_and_limited() {
        let body: SerperResponse = serde_json::from_str(
            r#"{"organic":[
                {"title":"B","link":"https://b","snippet":"second","position":2},
                {"title":"A","link":"https://a","snippet":"first","position":1},
                {"title":"E","link":"https://e","snippet":"","position":3},
                {"title":"C","link":"https://c","snippet":"third","position":4}
            ]}"#,
        )
        .unwrap();

        let ranked = rank_organic(body.organic, 2);
        let titles: Vec<&str> = ranked.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn missing_organic_block_is_empty() {
        let body: SerperResponse = serde_json::from_str(r#"{"knowledgeGraph":{}}"#).unwrap();
        assert!(body.organic.is_empty());
    }

    #[test]
    fn references_are_bulleted() {
        let refs = format_references(&[
            Snippet {
                title: "Ferritin ".into(),
                link: "https://x".into(),
                snippet: " Iron store marker.".into(),
            },
            Snippet {
                title: "B12".into(),
                link: "https://y".into(),
                snippet: "Vitamin.".into(),
            },
        ]);
        assert_eq!(refs, "- Ferritin: Iron store marker.\n- B12: Vitamin.");
    }
}
