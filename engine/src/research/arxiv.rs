use super::{RawItem, SourceConnector, SourceQuery};
use crate::upstream::{check_status, UpstreamError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

const SEARCH_QUERY: &str = "cat:cs.AI OR cat:cs.CL";
const SUMMARY_CHARS: usize = 200;

/// Latest AI and computational-linguistics papers from the arXiv Atom API
pub struct ArxivSource {
    base_url: String,
    client: reqwest::Client,
}

impl ArxivSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UpstreamError::from_reqwest)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

struct AtomPatterns {
    entry: Regex,
    title: Regex,
    id: Regex,
    summary: Regex,
    published: Regex,
}

fn patterns() -> Option<&'static AtomPatterns> {
    static PATTERNS: OnceLock<Option<AtomPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(AtomPatterns {
                entry: Regex::new(r"(?s)<entry>(.*?)</entry>").ok()?,
                title: Regex::new(r"(?s)<title[^>]*>(.*?)</title>").ok()?,
                id: Regex::new(r"(?s)<id>(.*?)</id>").ok()?,
                summary: Regex::new(r"(?s)<summary[^>]*>(.*?)</summary>").ok()?,
                published: Regex::new(r"(?s)<published>(.*?)</published>").ok()?,
            })
        })
        .as_ref()
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

/// Pull entries out of an Atom feed.
pub(crate) fn parse_feed(xml: &str) -> Result<Vec<RawItem>, UpstreamError> {
    let p = patterns().ok_or_else(|| UpstreamError::Parse("Atom patterns failed to compile".into()))?;

    if !xml.contains("<feed") {
        return Err(UpstreamError::Parse("Response is not an Atom feed".to_string()));
    }

    let capture = |re: &Regex, body: &str| -> Option<String> {
        re.captures(body)
            .and_then(|c| c.get(1))
            .map(|m| unescape(&collapse(m.as_str())))
    };

    let items = p
        .entry
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .filter_map(|entry| {
            let body = entry.as_str();
            let title = capture(&p.title, body).filter(|t| !t.is_empty())?;
            Some(RawItem {
                title,
                url: capture(&p.id, body).unwrap_or_default(),
                summary: capture(&p.summary, body)
                    .map(|s| truncate_chars(&s, SUMMARY_CHARS))
                    .unwrap_or_default(),
                published_at: capture(&p.published, body)
                    .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
                    .map(|d| d.with_timezone(&Utc)),
            })
        })
        .collect();

    Ok(items)
}

#[async_trait]
impl SourceConnector for ArxivSource {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn needs_relevance_filter(&self) -> bool {
        false
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawItem>, UpstreamError> {
        let max_results = query.limit.max(1).to_string();

        let response = self
            .client
            .get(format!("{}/api/query", self.base_url))
            .query(&[
                ("search_query", SEARCH_QUERY),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
                ("max_results", max_results.as_str()),
            ])
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let xml = check_status(response)
            .await?
            .text()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        parse_feed(&xml)
    }
}
