use super::{RawItem, SourceConnector, SourceQuery};
use crate::secrets::SecretString;
use crate::upstream::{check_status, UpstreamError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const DEFAULT_QUERY: &str = "latest AI agents news";

/// Tavily web search, steered by the run's topic hint
pub struct TavilySource {
    base_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilySource {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UpstreamError::from_reqwest)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl SourceConnector for TavilySource {
    fn id(&self) -> &str {
        "tavily"
    }

    fn needs_relevance_filter(&self) -> bool {
        false
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawItem>, UpstreamError> {
        let search = query
            .topic
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_QUERY);

        let body = json!({
            "api_key": self.api_key.unsecure(),
            "query": search,
            "search_depth": "basic",
            "include_answer": true,
            "max_results": query.limit.max(1),
        });

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let parsed: SearchResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .filter(|r| !r.title.trim().is_empty())
            .map(|r| RawItem {
                title: r.title,
                url: r.url,
                summary: r.content,
                published_at: None,
            })
            .collect())
    }
}
