//! Per-persona performance, derived from stored history
//!
//! Nothing here is persisted. Stats are recomputed from posts and performance
//! records on every call so they cannot drift from the history they describe.

use sdk::types::{Classification, PerformanceRecord, PublishedPost, Vibe};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersonaStats {
    pub posts: u32,
    pub win_count: u32,
    pub loss_count: u32,
    pub neutral_count: u32,
    /// Mean likes + comments over classified posts
    pub avg_engagement: f64,
}

impl PersonaStats {
    pub fn classified(&self) -> u32 {
        self.win_count + self.loss_count + self.neutral_count
    }

    /// Laplace-smoothed win rate, 0.5 with no data
    pub fn smoothed_win_rate(&self) -> f64 {
        (self.win_count as f64 + 1.0) / (self.win_count as f64 + self.loss_count as f64 + 2.0)
    }
}

/// Latest record per post urn. Later entries win ties on `recorded_at`.
pub fn latest_by_urn(performance: &[PerformanceRecord]) -> HashMap<&str, &PerformanceRecord> {
    let mut latest: HashMap<&str, &PerformanceRecord> = HashMap::new();
    for record in performance {
        match latest.get(record.post_urn.as_str()) {
            Some(existing) if existing.recorded_at > record.recorded_at => {}
            _ => {
                latest.insert(record.post_urn.as_str(), record);
            }
        }
    }
    latest
}

pub fn derive(
    posts: &[PublishedPost],
    performance: &[PerformanceRecord],
) -> BTreeMap<Vibe, PersonaStats> {
    let latest = latest_by_urn(performance);
    let mut stats: BTreeMap<Vibe, PersonaStats> = BTreeMap::new();
    let mut engagement_totals: BTreeMap<Vibe, u64> = BTreeMap::new();

    for post in posts {
        let entry = stats.entry(post.vibe).or_default();
        entry.posts += 1;

        let Some(record) = latest.get(post.platform_urn.as_str()) else {
            continue;
        };

        match record.classification {
            Classification::Winner => entry.win_count += 1,
            Classification::Loser => entry.loss_count += 1,
            Classification::Neutral => entry.neutral_count += 1,
        }
        *engagement_totals.entry(post.vibe).or_default() += record.reactions();
    }

    for (vibe, entry) in stats.iter_mut() {
        let classified = entry.classified();
        if classified > 0 {
            let total = engagement_totals.get(vibe).copied().unwrap_or(0);
            entry.avg_engagement = total as f64 / classified as f64;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn post(urn: &str, vibe: Vibe) -> PublishedPost {
        PublishedPost {
            platform_urn: urn.to_string(),
            vibe,
            topic: "t".to_string(),
            created_at: Utc::now(),
            text_snapshot: String::new(),
            has_image: false,
        }
    }

    fn record(urn: &str, class: Classification, likes: u64) -> PerformanceRecord {
        PerformanceRecord {
            post_urn: urn.to_string(),
            views: None,
            likes,
            comments: 0,
            classification: class,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_counts_and_average() {
        let posts = vec![
            post("a", Vibe::Analyst),
            post("b", Vibe::Analyst),
            post("c", Vibe::Analyst),
        ];
        let perf = vec![
            record("a", Classification::Winner, 30),
            record("b", Classification::Loser, 2),
        ];

        let stats = derive(&posts, &perf);
        let analyst = &stats[&Vibe::Analyst];
        assert_eq!(analyst.posts, 3);
        assert_eq!(analyst.win_count, 1);
        assert_eq!(analyst.loss_count, 1);
        assert!((analyst.avg_engagement - 16.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_latest_record_is_authoritative() {
        let posts = vec![post("a", Vibe::Oracle)];
        let mut early = record("a", Classification::Loser, 1);
        early.recorded_at = Utc::now() - Duration::days(2);
        let late = record("a", Classification::Winner, 40);

        // Stored out of order on purpose
        let stats = derive(&posts, &[late, early]);
        assert_eq!(stats[&Vibe::Oracle].win_count, 1);
        assert_eq!(stats[&Vibe::Oracle].loss_count, 0);
    }

    #[test]
    fn test_records_for_unknown_posts_ignored() {
        let stats = derive(&[], &[record("ghost", Classification::Winner, 5)]);
        assert!(stats.is_empty());
    }

    #[test]
    fn test_smoothed_win_rate() {
        let fresh = PersonaStats::default();
        assert!((fresh.smoothed_win_rate() - 0.5).abs() < f64::EPSILON);

        let strong = PersonaStats {
            win_count: 8,
            loss_count: 0,
            ..Default::default()
        };
        assert!(strong.smoothed_win_rate() > 0.8);
        assert!(strong.smoothed_win_rate() < 1.0);
    }
}
