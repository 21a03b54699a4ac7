use chrono::{DateTime, Utc};
use sdk::types::{
    AbortReason, CommentPack, CriticRule, Draft, ResearchBrief, RunRecord, RunStatus, Stage,
    StrategyBrief, Vibe, VisualAsset,
};
use serde::Serialize;
use uuid::Uuid;

/// Everything one run has produced so far
#[derive(Debug)]
pub struct RunState {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub topic: Option<String>,
    pub brief: Option<ResearchBrief>,
    pub comment_pack: Option<CommentPack>,
    pub vibe: Option<Vibe>,
    pub stored_rules: Vec<CriticRule>,
    pub strategy: Option<StrategyBrief>,
    pub draft: Option<Draft>,
    pub visual: Option<VisualAsset>,
    pub visual_attempted: bool,
    /// Critic reasons to address in the next draft
    pub feedback: Vec<String>,
    pub revisions: u8,
    pub learned_rules: Vec<CriticRule>,
    pub failure: Option<Failure>,
}

/// Why and where a run stopped short of publishing
#[derive(Debug, Clone)]
pub struct Failure {
    pub stage: Stage,
    pub reason: AbortReason,
    pub detail: String,
    pub orphaned_asset_urn: Option<String>,
}

impl RunState {
    pub fn new(topic: Option<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            topic,
            brief: None,
            comment_pack: None,
            vibe: None,
            stored_rules: Vec::new(),
            strategy: None,
            draft: None,
            visual: None,
            visual_attempted: false,
            feedback: Vec::new(),
            revisions: 0,
            learned_rules: Vec::new(),
            failure: None,
        }
    }

    /// Record a failure and move to the aborted state
    pub fn abort(&mut self, stage: Stage, reason: AbortReason, detail: impl Into<String>) -> Stage {
        self.failure = Some(Failure {
            stage,
            reason,
            detail: detail.into(),
            orphaned_asset_urn: None,
        });
        Stage::Aborted
    }

    /// Topic stored with the post: the chosen topic, else the research headline
    pub fn post_topic(&self) -> String {
        self.topic
            .clone()
            .or_else(|| self.brief.as_ref().and_then(|b| b.topic()).map(str::to_string))
            .unwrap_or_default()
    }

    pub fn record(&self, status: RunStatus, stage: Stage, post_urn: Option<String>, has_image: bool) -> RunRecord {
        let failure = self.failure.as_ref();
        RunRecord {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            status,
            stage: failure.map(|f| f.stage).unwrap_or(stage),
            reason: failure.map(|f| f.reason),
            detail: failure.map(|f| f.detail.clone()),
            vibe: self.vibe,
            topic: Some(self.post_topic()).filter(|t| !t.is_empty()),
            has_image,
            post_urn,
            orphaned_asset_urn: failure.and_then(|f| f.orphaned_asset_urn.clone()),
            revisions: self.revisions,
        }
    }
}

/// Result of a run that reached a terminal state
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub record: RunRecord,
    pub rules_added: usize,
    pub comment_pack_saved: bool,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunReport),
    /// Stopped before publishing; nothing was written
    Cancelled { run_id: String, stage: Stage },
}

impl RunOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, RunOutcome::Completed(r) if r.record.status == RunStatus::Published)
    }

    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            RunOutcome::Cancelled { .. } => None,
        }
    }
}
