//! Pipeline domain types
//!
//! Everything that flows between pipeline stages or lands in the memory file
//! lives here so the engine, its tests and any external reader agree on one
//! schema. Persisted structs default missing fields so older memory files stay
//! readable as the schema grows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Lowercases, trims and collapses internal whitespace.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_url(s: &str) -> String {
    normalize_text(s).trim_end_matches('/').to_string()
}

/// A single item of intelligence from one research source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub source_id: String,
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

/// Merged, deduplicated research output for one run
///
/// Order reflects source priority, not recency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchBrief {
    findings: Vec<Finding>,
}

impl ResearchBrief {
    /// Merge per-source lists given in priority order.
    ///
    /// A finding is dropped when its normalized title, or its normalized
    /// non-empty url, was already seen. The first occurrence wins. The merged
    /// list is truncated to `max_findings`.
    pub fn merge<I>(per_source: I, max_findings: usize) -> Self
    where
        I: IntoIterator<Item = Vec<Finding>>,
    {
        let mut seen_titles = HashSet::new();
        let mut seen_urls = HashSet::new();
        let mut findings = Vec::new();

        'sources: for list in per_source {
            for finding in list {
                if findings.len() >= max_findings {
                    break 'sources;
                }

                let title_key = normalize_text(&finding.title);
                if title_key.is_empty() || seen_titles.contains(&title_key) {
                    continue;
                }

                let url_key = normalize_url(&finding.url);
                if !url_key.is_empty() && seen_urls.contains(&url_key) {
                    continue;
                }

                seen_titles.insert(title_key);
                if !url_key.is_empty() {
                    seen_urls.insert(url_key);
                }
                findings.push(finding);
            }
        }

        Self { findings }
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Headline topic of the brief, the title of the highest-priority finding
    pub fn topic(&self) -> Option<&str> {
        self.findings.first().map(|f| f.title.as_str())
    }

    /// Render the brief as prompt context, one finding per block.
    pub fn render(&self) -> String {
        self.findings
            .iter()
            .map(|f| {
                let mut block = format!("- [{}] {}", f.source_id, f.title);
                if !f.url.is_empty() {
                    block.push_str(&format!("\n  Link: {}", f.url));
                }
                if !f.summary.is_empty() {
                    block.push_str(&format!("\n  Summary: {}", f.summary));
                }
                block
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Editorial persona
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Vibe {
    #[serde(alias = "The Contrarian")]
    Contrarian,
    #[serde(alias = "The Visionary")]
    Visionary,
    #[serde(alias = "The Educator")]
    Educator,
    #[serde(alias = "The Analyst")]
    Analyst,
    #[serde(alias = "The Narrator", alias = "The Storyteller")]
    Narrator,
    #[serde(alias = "The Oracle")]
    Oracle,
    #[serde(alias = "The Satirist")]
    Satirist,
}

impl Vibe {
    pub const ALL: [Vibe; 7] = [
        Vibe::Contrarian,
        Vibe::Visionary,
        Vibe::Educator,
        Vibe::Analyst,
        Vibe::Narrator,
        Vibe::Oracle,
        Vibe::Satirist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Vibe::Contrarian => "contrarian",
            Vibe::Visionary => "visionary",
            Vibe::Educator => "educator",
            Vibe::Analyst => "analyst",
            Vibe::Narrator => "narrator",
            Vibe::Oracle => "oracle",
            Vibe::Satirist => "satirist",
        }
    }

    pub fn tone(&self) -> &'static str {
        match self {
            Vibe::Contrarian => "provocative, skeptical, challenges the consensus",
            Vibe::Visionary => "optimistic, futuristic, inspiring",
            Vibe::Educator => "clear, structured, generous with the how-to",
            Vibe::Analyst => "data-driven, measured, grounded in numbers",
            Vibe::Narrator => "personal, story-led, vulnerable",
            Vibe::Oracle => "bold, predictive, stakes a claim on the next year",
            Vibe::Satirist => "witty, ironic, punctures the hype",
        }
    }

    pub fn visual_style(&self) -> &'static str {
        match self {
            Vibe::Contrarian => "high contrast, glitch art, stark red and black",
            Vibe::Visionary => "bright sci-fi concept art, clean lines, wide horizons",
            Vibe::Educator => "clean flat vector infographic, soft pastel palette",
            Vibe::Analyst => "minimal data visualization, charts, dark dashboard",
            Vibe::Narrator => "warm cinematic photography, natural light, candid",
            Vibe::Oracle => "surreal matte painting, glowing horizon, mystic blue",
            Vibe::Satirist => "editorial cartoon, bold outlines, exaggerated shapes",
        }
    }
}

impl fmt::Display for Vibe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vibe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize_text(s);
        let key = key.strip_prefix("the ").unwrap_or(&key);
        Vibe::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == key)
            .ok_or_else(|| {
                format!(
                    "unknown persona '{}', expected one of: {}",
                    s,
                    Vibe::ALL.map(|v| v.as_str()).join(", ")
                )
            })
    }
}

/// Output of the strategy stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyBrief {
    pub vibe: Vibe,
    pub hook: String,
    pub angle: String,
    pub audience: String,
    pub call_to_action: String,
}

/// Post text under review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub text: String,
    pub character_count: usize,
    pub structure_tag: String,
}

impl Draft {
    pub fn new(text: impl Into<String>, structure_tag: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            character_count: text.chars().count(),
            text,
            structure_tag: structure_tag.into(),
        }
    }
}

/// Generated image attached to a post
#[derive(Clone, PartialEq)]
pub struct VisualAsset {
    pub prompt_text: String,
    pub binary_image: Vec<u8>,
    pub mime_type: String,
}

impl fmt::Debug for VisualAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualAsset")
            .field("prompt_text", &self.prompt_text)
            .field("bytes", &self.binary_image.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Critic decision on a draft
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriticVerdict {
    pub approved: bool,
    pub reasons: Vec<String>,
    /// Reusable lessons the critic wants applied to future drafts
    #[serde(default)]
    pub rules: Vec<String>,
}

/// A post that went live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedPost {
    #[serde(alias = "urn")]
    pub platform_urn: String,
    pub vibe: Vibe,
    #[serde(default)]
    pub topic: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub text_snapshot: String,
    #[serde(default)]
    pub has_image: bool,
}

/// Engagement-based classification of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Winner,
    Loser,
    Neutral,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::Winner => "WINNER",
            Classification::Loser => "LOSER",
            Classification::Neutral => "NEUTRAL",
        };
        f.write_str(s)
    }
}

/// Engagement snapshot for a published post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub post_urn: String,
    /// Impressions, when the source exposes them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<u64>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: u64,
    pub classification: Classification,
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
}

impl PerformanceRecord {
    pub fn reactions(&self) -> u64 {
        self.likes + self.comments
    }
}

/// Lesson learned from a critique, injected into later drafts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticRule {
    pub text: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl CriticRule {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into().trim().to_string(),
            created_at: Utc::now(),
        }
    }

    /// Key used for deduplication
    pub fn key(&self) -> String {
        normalize_text(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentDraft {
    pub style_tag: String,
    pub text: String,
}

/// Suggested replies for a trending post; a human decides whether to use them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentPack {
    pub target_post_ref: String,
    pub drafts: Vec<CommentDraft>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Research,
    Strategy,
    Draft,
    Visual,
    Critique,
    Publish,
    Record,
    Aborted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Research => "research",
            Stage::Strategy => "strategy",
            Stage::Draft => "draft",
            Stage::Visual => "visual",
            Stage::Critique => "critique",
            Stage::Publish => "publish",
            Stage::Record => "record",
            Stage::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Reason code attached to a run that did not publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    NoIntelligence,
    StrategyFailed,
    DraftFailed,
    CritiqueFailed,
    RejectedTwice,
    PublishUnconfigured,
    PublishFailed,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::NoIntelligence => "no_intelligence",
            AbortReason::StrategyFailed => "strategy_failed",
            AbortReason::DraftFailed => "draft_failed",
            AbortReason::CritiqueFailed => "critique_failed",
            AbortReason::RejectedTwice => "rejected_twice",
            AbortReason::PublishUnconfigured => "publish_unconfigured",
            AbortReason::PublishFailed => "publish_failed",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a recorded run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Published,
    PublishFailed,
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Published => "published",
            RunStatus::PublishFailed => "publish_failed",
            RunStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Audit entry for one pipeline run that reached a terminal state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    /// Stage the run ended in (`record` on success)
    pub stage: Stage,
    #[serde(default)]
    pub reason: Option<AbortReason>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub vibe: Option<Vibe>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub has_image: bool,
    #[serde(default)]
    pub post_urn: Option<String>,
    #[serde(default)]
    pub orphaned_asset_urn: Option<String>,
    #[serde(default)]
    pub revisions: u8,
}
