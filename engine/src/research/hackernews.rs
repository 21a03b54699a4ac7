use super::{RawItem, SourceConnector, SourceQuery};
use crate::upstream::{check_status, UpstreamError};
use async_trait::async_trait;
use chrono::DateTime;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::time::Duration;

/// Item fetches in flight at once
const ITEM_CONCURRENCY: usize = 8;

/// Hacker News top stories via the Firebase API
pub struct HackerNewsSource {
    base_url: String,
    scan_depth: usize,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct HnItem {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    time: Option<i64>,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    dead: bool,
}

impl HnItem {
    fn into_raw(self) -> Option<RawItem> {
        if self.deleted || self.dead {
            return None;
        }
        let title = self.title.filter(|t| !t.trim().is_empty())?;
        let url = self
            .url
            .unwrap_or_else(|| format!("https://news.ycombinator.com/item?id={}", self.id));

        Some(RawItem {
            title,
            url,
            summary: self.text.unwrap_or_default(),
            published_at: self.time.and_then(|t| DateTime::from_timestamp(t, 0)),
        })
    }
}

impl HackerNewsSource {
    pub fn new(base_url: &str, scan_depth: usize, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UpstreamError::from_reqwest)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            scan_depth,
            client,
        })
    }

    async fn top_story_ids(&self) -> Result<Vec<u64>, UpstreamError> {
        let response = self
            .client
            .get(format!("{}/v0/topstories.json", self.base_url))
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))
    }

    async fn item(&self, id: u64) -> Result<Option<HnItem>, UpstreamError> {
        let response = self
            .client
            .get(format!("{}/v0/item/{}.json", self.base_url, id))
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        // The API answers `null` for ids it has purged
        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))
    }
}

#[async_trait]
impl SourceConnector for HackerNewsSource {
    fn id(&self) -> &str {
        "hackernews"
    }

    async fn fetch(&self, _query: &SourceQuery) -> Result<Vec<RawItem>, UpstreamError> {
        let ids = self.top_story_ids().await?;

        let results: Vec<_> = stream::iter(ids.into_iter().take(self.scan_depth))
            .map(|id| async move { (id, self.item(id).await) })
            .buffered(ITEM_CONCURRENCY)
            .collect()
            .await;

        let items = results
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(item) => item.and_then(HnItem::into_raw),
                Err(e) => {
                    tracing::debug!(id, error = %e, "Skipping Hacker News item");
                    None
                }
            })
            .collect();

        Ok(items)
    }
}
