//! Multi-source research aggregation
//!
//! The [`ResearchAggregator`] asks each configured [`SourceConnector`] for raw
//! items, one source at a time, each call wrapped by the shared
//! [`ResilientCaller`]. A source that fails is skipped. Items are filtered for
//! relevance and capped per source before [`ResearchBrief::merge`] dedups them
//! in source-priority order. The run only fails when nothing survives.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use sdk::errors::EngineError;
use sdk::types::{Finding, ResearchBrief};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ResearchConfig;
use crate::retry::ResilientCaller;
use crate::secrets::{CredentialKey, Credentials};
use crate::upstream::{classify, UpstreamError};

pub mod arxiv;
pub mod hackernews;
pub mod newsapi;
pub mod tavily;

pub use arxiv::ArxivSource;
pub use hackernews::HackerNewsSource;
pub use newsapi::NewsApiSource;
pub use tavily::TavilySource;

/// Parameters handed to every connector
#[derive(Debug, Clone, Default)]
pub struct SourceQuery {
    /// Optional topic to steer query-based sources
    pub topic: Option<String>,

    /// Soft cap on how many items a source should return
    pub limit: usize,
}

/// Unnormalized item as a connector sees it
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl RawItem {
    fn into_finding(self, source_id: &str) -> Finding {
        Finding {
            source_id: source_id.to_string(),
            title: self.title.trim().to_string(),
            url: self.url.trim().to_string(),
            summary: self.summary.trim().to_string(),
            published_at: self.published_at,
        }
    }
}

/// An independent intelligence source
///
/// `fetch` returns `Ok(vec![])` when the source simply has nothing; errors are
/// reserved for actual failures.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Stable id, also used as the finding's `source_id`
    fn id(&self) -> &str;

    /// Sources whose query is already topic-scoped skip the keyword filter
    fn needs_relevance_filter(&self) -> bool {
        true
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawItem>, UpstreamError>;
}

/// Case-insensitive whole-word keyword matcher
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    patterns: Vec<Regex>,
}

impl RelevanceFilter {
    pub fn new(keywords: &[String]) -> Self {
        let patterns = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .filter_map(|k| {
                let phrase = k
                    .split_whitespace()
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s+");
                Regex::new(&format!(r"(?i)\b{}\b", phrase)).ok()
            })
            .collect();
        Self { patterns }
    }

    /// An empty keyword list accepts everything
    pub fn matches(&self, item: &RawItem) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        self.patterns
            .iter()
            .any(|p| p.is_match(&item.title) || p.is_match(&item.summary))
    }
}

/// Fans out to every source and merges the results into one brief
pub struct ResearchAggregator {
    connectors: Vec<Arc<dyn SourceConnector>>,
    caller: ResilientCaller,
    filter: RelevanceFilter,
    per_source_limit: usize,
    max_findings: usize,
}

impl ResearchAggregator {
    /// `connectors` are in priority order, highest first
    pub fn new(
        connectors: Vec<Arc<dyn SourceConnector>>,
        caller: ResilientCaller,
        config: &ResearchConfig,
    ) -> Self {
        Self {
            connectors,
            caller,
            filter: RelevanceFilter::new(&config.keywords),
            per_source_limit: config.per_source_limit,
            max_findings: config.max_findings,
        }
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.connectors.iter().map(|c| c.id().to_string()).collect()
    }

    /// Gather and merge intelligence.
    ///
    /// # Errors
    ///
    /// `EngineError::NoIntelligenceAvailable` when every source failed or
    /// nothing relevant came back.
    pub async fn gather(&self, topic_hint: Option<&str>) -> Result<ResearchBrief, EngineError> {
        let query = SourceQuery {
            topic: topic_hint.map(str::to_string),
            limit: self.per_source_limit,
        };

        let mut per_source = Vec::with_capacity(self.connectors.len());
        let mut succeeded = 0usize;

        for connector in &self.connectors {
            let id = connector.id();
            let operation = format!("research:{}", id);

            let items = match self
                .caller
                .call(&operation, || connector.fetch(&query), classify)
                .await
            {
                Ok(items) => items,
                Err(e) => {
                    warn!(source = id, error = %e, "Research source skipped");
                    continue;
                }
            };
            succeeded += 1;

            let fetched = items.len();
            let findings: Vec<Finding> = items
                .into_iter()
                .filter(|item| !connector.needs_relevance_filter() || self.filter.matches(item))
                .take(self.per_source_limit)
                .map(|item| item.into_finding(id))
                .collect();

            debug!(source = id, fetched, kept = findings.len(), "Source fetched");
            per_source.push(findings);
        }

        let brief = ResearchBrief::merge(per_source, self.max_findings);

        info!(
            sources = self.connectors.len(),
            succeeded,
            findings = brief.len(),
            "Research complete"
        );

        if brief.is_empty() {
            return Err(EngineError::NoIntelligenceAvailable);
        }

        Ok(brief)
    }
}

/// Build the enabled connectors in configured order.
///
/// A source whose credential is missing is left out with an info log rather
/// than failing the run.
pub fn build_connectors(
    config: &ResearchConfig,
    credentials: &Credentials,
) -> Result<Vec<Arc<dyn SourceConnector>>, EngineError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let mut connectors: Vec<Arc<dyn SourceConnector>> = Vec::new();

    for id in &config.sources {
        let connector: Arc<dyn SourceConnector> = match id.as_str() {
            "hackernews" => Arc::new(
                HackerNewsSource::new(&config.hackernews_base_url, config.scan_depth, timeout)
                    .map_err(connector_error)?,
            ),
            "newsapi" => match credentials.get(CredentialKey::NewsApiKey) {
                Some(key) => Arc::new(
                    NewsApiSource::new(&config.newsapi_base_url, key.clone(), timeout)
                        .map_err(connector_error)?,
                ),
                None => {
                    info!("NEWS_API_KEY not set, newsapi source disabled");
                    continue;
                }
            },
            "arxiv" => Arc::new(
                ArxivSource::new(&config.arxiv_base_url, timeout).map_err(connector_error)?,
            ),
            "tavily" => match credentials.get(CredentialKey::TavilyApiKey) {
                Some(key) => Arc::new(
                    TavilySource::new(&config.tavily_base_url, key.clone(), timeout)
                        .map_err(connector_error)?,
                ),
                None => {
                    info!("TAVILY_API_KEY not set, tavily source disabled");
                    continue;
                }
            },
            other => {
                return Err(EngineError::Config(format!(
                    "Unknown research source '{}'",
                    other
                )))
            }
        };
        connectors.push(connector);
    }

    Ok(connectors)
}

fn connector_error(e: UpstreamError) -> EngineError {
    EngineError::Config(format!("Failed to build research client: {}", e))
}
