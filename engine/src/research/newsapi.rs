use super::{RawItem, SourceConnector, SourceQuery};
use crate::secrets::SecretString;
use crate::upstream::{check_status, UpstreamError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// NewsAPI technology headlines
pub struct NewsApiSource {
    base_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct HeadlinesResponse {
    status: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

impl NewsApiSource {
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

/// NewsAPI reports some failures in the body with a 200
fn body_error(code: Option<&str>, message: &str) -> UpstreamError {
    match code {
        Some("rateLimited") => UpstreamError::RateLimited(message.to_string()),
        Some("apiKeyInvalid") | Some("apiKeyMissing") | Some("apiKeyDisabled") => {
            UpstreamError::Auth(message.to_string())
        }
        Some("unexpectedError") => UpstreamError::Server {
            status: 500,
            body: message.to_string(),
        },
        _ => UpstreamError::InvalidRequest(message.to_string()),
    }
}

#[async_trait]
impl SourceConnector for NewsApiSource {
    fn id(&self) -> &str {
        "newsapi"
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawItem>, UpstreamError> {
        // Over-fetch so the relevance filter has something to choose from
        let page_size = (query.limit * 4).clamp(10, 100).to_string();

        let response = self
            .client
            .get(format!("{}/v2/top-headlines", self.base_url))
            .header("X-Api-Key", self.api_key.unsecure())
            .query(&[
                ("category", "technology"),
                ("language", "en"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let body: HeadlinesResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))?;

        if body.status != "ok" {
            return Err(body_error(
                body.code.as_deref(),
                body.message.as_deref().unwrap_or("unknown NewsAPI error"),
            ));
        }

        Ok(body
            .articles
            .into_iter()
            .filter_map(|a| {
                let title = a.title.filter(|t| !t.trim().is_empty() && t != "[Removed]")?;
                Some(RawItem {
                    title,
                    url: a.url.unwrap_or_default(),
                    summary: a.description.unwrap_or_default(),
                    published_at: a.published_at,
                })
            })
            .collect())
    }
}
