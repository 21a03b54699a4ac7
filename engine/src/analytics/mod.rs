//! Performance feedback
//!
//! Runs apart from the pipeline: reads engagement for every published post,
//! classifies it and appends a [`PerformanceRecord`]. Persona selection picks
//! these records up through [`MemoryStore::persona_stats`].
//!
//! A post the source cannot read is skipped, never recorded as zero. Counters
//! only grow, so a fresh reading is merged with the last stored record and
//! views the source does not expose carry over from it.

use crate::config::AnalyticsConfig;
use crate::memory::MemoryStore;
use crate::retry::ResilientCaller;
use crate::upstream::{classify as classify_error, UpstreamError};
use async_trait::async_trait;
use chrono::Utc;
use sdk::errors::EngineError;
use sdk::types::{Classification, PerformanceRecord};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Raw engagement counts for one post
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Engagement {
    /// `None` when impressions are not visible to us
    pub views: Option<u64>,
    pub likes: u64,
    pub comments: u64,
}

impl Engagement {
    pub fn reactions(&self) -> u64 {
        self.likes + self.comments
    }

    /// Combine with the last stored record for the same post
    pub fn merged_with(self, prior: Option<&PerformanceRecord>) -> Self {
        let Some(prior) = prior else {
            return self;
        };
        Self {
            views: match (self.views, prior.views) {
                (Some(fresh), Some(old)) => Some(fresh.max(old)),
                (fresh, old) => fresh.or(old),
            },
            likes: self.likes.max(prior.likes),
            comments: self.comments.max(prior.comments),
        }
    }
}

/// Reads engagement for a published post
#[async_trait]
pub trait EngagementSource: Send + Sync {
    /// `Ok(None)` when the platform will not show this post's engagement
    async fn engagement(&self, urn: &str) -> Result<Option<Engagement>, UpstreamError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub winner_views: u64,
    pub loser_views: u64,
    pub winner_reactions: u64,
    pub loser_reactions: u64,
}

impl From<&AnalyticsConfig> for Thresholds {
    fn from(config: &AnalyticsConfig) -> Self {
        Self {
            winner_views: config.winner_views,
            loser_views: config.loser_views,
            winner_reactions: config.winner_reactions,
            loser_reactions: config.loser_reactions,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&AnalyticsConfig::default())
    }
}

/// Unknown views can make a post a winner on reactions alone, never a loser.
pub fn classify(engagement: &Engagement, thresholds: &Thresholds) -> Classification {
    let reactions = engagement.reactions();
    let views_win = engagement.views.is_some_and(|v| v >= thresholds.winner_views);
    let views_low = engagement.views.is_some_and(|v| v < thresholds.loser_views);

    if views_win || reactions >= thresholds.winner_reactions {
        Classification::Winner
    } else if views_low && reactions < thresholds.loser_reactions {
        Classification::Loser
    } else {
        Classification::Neutral
    }
}

/// Classified record for a post, stamped now
pub fn record_for(urn: &str, engagement: Engagement, thresholds: &Thresholds) -> PerformanceRecord {
    PerformanceRecord {
        post_urn: urn.to_string(),
        views: engagement.views,
        likes: engagement.likes,
        comments: engagement.comments,
        classification: classify(&engagement, thresholds),
        recorded_at: Utc::now(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub updated: usize,
    /// Posts the platform would not report on
    pub unavailable: usize,
    pub failed: usize,
}

pub struct AnalyticsPass {
    source: Arc<dyn EngagementSource>,
    caller: ResilientCaller,
    thresholds: Thresholds,
}

impl AnalyticsPass {
    pub fn new(source: Arc<dyn EngagementSource>, caller: ResilientCaller, thresholds: Thresholds) -> Self {
        Self {
            source,
            caller,
            thresholds,
        }
    }

    /// Fetch engagement for every stored post and record the results in one
    /// commit. A post whose fetch fails is counted and skipped.
    pub async fn refresh(&self, store: &MemoryStore) -> Result<RefreshSummary, EngineError> {
        let state = store.load()?;
        let mut summary = RefreshSummary::default();
        let mut records = Vec::new();
        let source = &self.source;

        for post in &state.posts {
            let urn = post.platform_urn.as_str();
            let result = self
                .caller
                .call("analytics:engagement", || source.engagement(urn), classify_error)
                .await;

            match result {
                Ok(None) => {
                    debug!(urn, "Engagement unavailable, keeping previous record");
                    summary.unavailable += 1;
                }
                Ok(Some(reading)) => {
                    let engagement = reading.merged_with(state.latest_performance(urn));
                    let record = record_for(urn, engagement, &self.thresholds);
                    info!(
                        urn,
                        likes = record.likes,
                        comments = record.comments,
                        classification = %record.classification,
                        "Engagement recorded"
                    );
                    records.push(record);
                }
                Err(e) => {
                    warn!(urn, error = %e, "Engagement fetch failed, skipping post");
                    summary.failed += 1;
                }
            }
        }

        if !records.is_empty() {
            let attempted = records.len();
            let unknown = store.attach_performance_batch(records)?;
            summary.updated = attempted - unknown.len();
            summary.failed += unknown.len();
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(views: u64, likes: u64, comments: u64) -> Engagement {
        Engagement {
            views: Some(views),
            likes,
            comments,
        }
    }

    #[test]
    fn test_classification_boundaries() {
        let t = Thresholds::default();
        assert_eq!(classify(&e(1000, 0, 0), &t), Classification::Winner);
        assert_eq!(classify(&e(0, 20, 5), &t), Classification::Winner);
        assert_eq!(classify(&e(299, 2, 2), &t), Classification::Loser);
        assert_eq!(classify(&e(300, 0, 0), &t), Classification::Neutral);
        assert_eq!(classify(&e(0, 3, 2), &t), Classification::Neutral);
        assert_eq!(classify(&e(999, 24, 0), &t), Classification::Neutral);
    }

    #[test]
    fn test_unknown_views_never_classify_as_loser() {
        let t = Thresholds::default();
        let quiet = Engagement {
            views: None,
            likes: 0,
            comments: 0,
        };
        assert_eq!(classify(&quiet, &t), Classification::Neutral);

        let loud = Engagement {
            views: None,
            likes: 20,
            comments: 5,
        };
        assert_eq!(classify(&loud, &t), Classification::Winner);
    }

    #[test]
    fn test_merge_keeps_larger_counters_and_known_views() {
        let prior = record_for("urn:li:share:9", e(1500, 10, 2), &Thresholds::default());
        let fresh = Engagement {
            views: None,
            likes: 4,
            comments: 6,
        };

        let merged = fresh.merged_with(Some(&prior));
        assert_eq!(merged, e(1500, 10, 6));
        assert_eq!(fresh.merged_with(None), fresh);
    }

    #[test]
    fn test_record_for_copies_counts() {
        let r = record_for("urn:li:share:9", e(1500, 3, 1), &Thresholds::default());
        assert_eq!(r.post_urn, "urn:li:share:9");
        assert_eq!(r.views, Some(1500));
        assert_eq!(r.classification, Classification::Winner);
    }
}
