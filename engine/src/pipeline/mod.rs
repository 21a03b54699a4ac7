//! Run orchestration
//!
//! One run walks Research → Strategy → Draft → Visual → Critique → Publish →
//! Record. A first critic rejection loops back to Draft once; Visual runs only
//! on the first pass. Any stage-fatal failure moves the run to Aborted.
//!
//! ## Cancellation
//!
//! Every stage before Publish races the cancellation token. A cancelled run
//! returns [`RunOutcome::Cancelled`] and writes nothing. The token is checked
//! once more just before Publish; after that the run completes so that a
//! created post is always recorded.
//!
//! ## Persistence
//!
//! All writes happen in a single [`MemoryStore::commit_run`] at the end:
//! the post (only when one was created), learned rules, the comment pack and
//! the run record.

mod state;

pub use state::{Failure, RunOutcome, RunReport, RunState};

use crate::agents::{art_director, critic, ghostwriter, networker, persona, strategist};
use crate::config::Config;
use crate::llm::{ImageGenerator, Prompt, TextGenerator};
use crate::memory::{MemoryStore, RunCommit};
use crate::publish::PublishProtocol;
use crate::research::ResearchAggregator;
use crate::retry::{CallError, ResilientCaller};
use crate::upstream::classify;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sdk::errors::EngineError;
use sdk::types::{
    AbortReason, CriticRule, PublishedPost, RunRecord, RunStatus, Stage, Vibe, VisualAsset,
};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Collaborators a run needs
pub struct PipelineDeps {
    pub research: ResearchAggregator,
    pub text: Arc<dyn TextGenerator>,
    /// `None` when image generation is disabled
    pub image: Option<Arc<dyn ImageGenerator>>,
    /// `None` when no publish credentials are configured
    pub publisher: Option<PublishProtocol>,
    pub store: Arc<MemoryStore>,
    pub caller: ResilientCaller,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Fixed vibe, bypassing weighted selection
    pub persona: Option<Vibe>,
    /// Explicit topic for this run
    pub topic: Option<String>,
    /// Pool a topic is drawn from when none is given
    pub topics: Vec<String>,
    pub comment_pack: bool,
    pub max_revisions: u8,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            persona: config.pipeline.persona,
            topic: None,
            topics: config.pipeline.topics.clone(),
            comment_pack: config.pipeline.comment_pack,
            max_revisions: config.pipeline.max_revisions,
        }
    }
}

pub struct PipelineOrchestrator {
    deps: PipelineDeps,
    settings: PipelineSettings,
    rng: Mutex<StdRng>,
}

impl PipelineOrchestrator {
    pub fn new(deps: PipelineDeps, settings: PipelineSettings) -> Self {
        Self {
            deps,
            settings,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic topic and vibe sampling
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Execute one run to a terminal state.
    ///
    /// Stage failures are reported through the outcome. An `Err` means the
    /// run could not read or write memory.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunOutcome, EngineError> {
        let topic = self.choose_topic();
        let state = RunState::new(topic);
        let span = info_span!("run", run_id = %state.run_id);
        self.drive(state, cancel).instrument(span).await
    }

    fn choose_topic(&self) -> Option<String> {
        if let Some(topic) = self.settings.topic.clone().filter(|t| !t.trim().is_empty()) {
            return Some(topic);
        }
        let mut rng = self.rng.lock().ok()?;
        self.settings.topics.choose(&mut *rng).cloned()
    }

    async fn drive(
        &self,
        mut state: RunState,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, EngineError> {
        info!(topic = state.topic.as_deref().unwrap_or("-"), "Run started");
        let mut stage = Stage::Research;

        loop {
            match stage {
                Stage::Publish | Stage::Record => {
                    if cancel.is_cancelled() {
                        return Ok(self.cancelled(&state, stage));
                    }
                    return self.publish_and_record(state).await;
                }
                Stage::Aborted => return self.finish_aborted(state).await,
                _ => {}
            }

            debug!(stage = %stage, "Entering stage");
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = self.step(stage, &mut state) => Some(next),
            };

            match next {
                Some(next) => stage = next?,
                None => return Ok(self.cancelled(&state, stage)),
            }
        }
    }

    fn cancelled(&self, state: &RunState, stage: Stage) -> RunOutcome {
        warn!(stage = %stage, "Run cancelled, nothing recorded");
        RunOutcome::Cancelled {
            run_id: state.run_id.clone(),
            stage,
        }
    }

    async fn step(&self, stage: Stage, state: &mut RunState) -> Result<Stage, EngineError> {
        match stage {
            Stage::Research => Ok(self.research(state).await),
            Stage::Strategy => self.strategy(state).await,
            Stage::Draft => Ok(self.draft(state).await),
            Stage::Visual => Ok(self.visual(state).await),
            Stage::Critique => Ok(self.critique(state).await),
            Stage::Publish | Stage::Record | Stage::Aborted => Ok(stage),
        }
    }

    async fn generate(&self, operation: &str, prompt: &Prompt) -> Result<String, EngineError> {
        let text = &self.deps.text;
        self.deps
            .caller
            .call(operation, || text.generate(prompt), classify)
            .await
            .map_err(CallError::into_engine_error)
    }

    async fn research(&self, state: &mut RunState) -> Stage {
        let brief = match self.deps.research.gather(state.topic.as_deref()).await {
            Ok(brief) => brief,
            Err(e) => return state.abort(Stage::Research, AbortReason::NoIntelligence, e.to_string()),
        };
        info!(findings = brief.len(), "Research complete");

        if self.settings.comment_pack {
            let target = brief
                .topic()
                .map(str::to_string)
                .or_else(|| state.topic.clone())
                .unwrap_or_default();
            match self.generate("generate:networker", &networker::prompt(&brief)).await {
                Ok(reply) => match networker::parse(&target, &reply) {
                    Ok(pack) => state.comment_pack = Some(pack),
                    Err(e) => warn!(error = %e, "Comment pack unusable, continuing without it"),
                },
                Err(e) => warn!(error = %e, "Comment pack generation failed, continuing without it"),
            }
        }

        state.brief = Some(brief);
        Stage::Strategy
    }

    async fn strategy(&self, state: &mut RunState) -> Result<Stage, EngineError> {
        let memory = self.deps.store.load()?;
        let stats = memory.persona_stats();
        state.stored_rules = memory.rules;

        let vibe = match self.settings.persona {
            Some(vibe) => vibe,
            None => {
                let mut rng = self
                    .rng
                    .lock()
                    .map_err(|_| EngineError::Memory("rng mutex poisoned".to_string()))?;
                persona::select(&stats, &mut *rng)
            }
        };
        state.vibe = Some(vibe);
        info!(vibe = %vibe, overridden = self.settings.persona.is_some(), "Vibe selected");

        let Some(brief) = state.brief.as_ref() else {
            return Ok(state.abort(Stage::Strategy, AbortReason::StrategyFailed, "no research brief"));
        };
        let topic = state.post_topic();
        let insight = persona::insight(&stats);
        let prompt = strategist::prompt(vibe, brief, &topic, insight.as_deref());

        let reply = match self.generate("generate:strategist", &prompt).await {
            Ok(reply) => reply,
            Err(e) => return Ok(state.abort(Stage::Strategy, AbortReason::StrategyFailed, e.to_string())),
        };

        match strategist::parse(vibe, &reply) {
            Ok(strategy) => {
                debug!(hook = %strategy.hook, "Strategy ready");
                state.strategy = Some(strategy);
                Ok(Stage::Draft)
            }
            Err(e) => Ok(state.abort(Stage::Strategy, AbortReason::StrategyFailed, e.to_string())),
        }
    }

    async fn draft(&self, state: &mut RunState) -> Stage {
        let (Some(strategy), Some(brief)) = (state.strategy.as_ref(), state.brief.as_ref()) else {
            return state.abort(Stage::Draft, AbortReason::DraftFailed, "no strategy");
        };

        let revision = state.revisions > 0;
        let feedback = revision.then_some(state.feedback.as_slice());
        let prompt = ghostwriter::prompt(strategy, brief, &state.stored_rules, feedback);

        let reply = match self.generate("generate:ghostwriter", &prompt).await {
            Ok(reply) => reply,
            Err(e) => return state.abort(Stage::Draft, AbortReason::DraftFailed, e.to_string()),
        };

        match ghostwriter::parse(&reply, revision) {
            Ok(draft) => {
                info!(chars = draft.character_count, revision, "Draft written");
                state.draft = Some(draft);
                if state.visual_attempted {
                    Stage::Critique
                } else {
                    Stage::Visual
                }
            }
            Err(e) => state.abort(Stage::Draft, AbortReason::DraftFailed, e.to_string()),
        }
    }

    /// Best-effort image; any failure leaves the run text-only
    async fn visual(&self, state: &mut RunState) -> Stage {
        state.visual_attempted = true;

        let Some(image) = self.deps.image.as_ref() else {
            debug!("Image generation disabled");
            return Stage::Critique;
        };
        let Some(strategy) = state.strategy.as_ref() else {
            return Stage::Critique;
        };

        let reply = match self.generate("generate:art_director", &art_director::prompt(strategy)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Art direction failed, continuing text-only");
                return Stage::Critique;
            }
        };

        let Some(image_prompt) = art_director::clean_image_prompt(&reply) else {
            warn!("Art director returned no usable prompt, continuing text-only");
            return Stage::Critique;
        };

        let generated = self
            .deps
            .caller
            .call("generate:image", || image.generate(&image_prompt), classify)
            .await;

        match generated {
            Ok(img) => {
                info!(bytes = img.bytes.len(), mime = %img.mime_type, "Image generated");
                state.visual = Some(VisualAsset {
                    prompt_text: image_prompt,
                    binary_image: img.bytes,
                    mime_type: img.mime_type,
                });
            }
            Err(e) => warn!(error = %e, "Image generation failed, continuing text-only"),
        }

        Stage::Critique
    }

    async fn critique(&self, state: &mut RunState) -> Stage {
        let Some(draft) = state.draft.as_ref() else {
            return state.abort(Stage::Critique, AbortReason::CritiqueFailed, "no draft");
        };
        let visual_prompt = state.visual.as_ref().map(|v| v.prompt_text.as_str());
        let prompt = critic::prompt(draft, visual_prompt, &state.stored_rules);

        let reply = match self.generate("generate:critic", &prompt).await {
            Ok(reply) => reply,
            Err(e) => return state.abort(Stage::Critique, AbortReason::CritiqueFailed, e.to_string()),
        };

        let verdict = critic::parse(&reply);
        state
            .learned_rules
            .extend(verdict.rules.iter().map(|r| CriticRule::new(r.as_str())));

        if verdict.approved {
            info!(revisions = state.revisions, "Draft approved");
            return Stage::Publish;
        }

        if state.revisions < self.settings.max_revisions {
            state.revisions += 1;
            info!(reasons = verdict.reasons.len(), "Draft rejected, revising");
            state.feedback = verdict.reasons;
            return Stage::Draft;
        }

        let detail = if verdict.reasons.is_empty() {
            "rejected without reasons".to_string()
        } else {
            verdict.reasons.join("; ")
        };
        state.abort(Stage::Critique, AbortReason::RejectedTwice, detail)
    }

    async fn publish_and_record(&self, mut state: RunState) -> Result<RunOutcome, EngineError> {
        let Some(publisher) = self.deps.publisher.as_ref() else {
            state.abort(
                Stage::Publish,
                AbortReason::PublishUnconfigured,
                "LinkedIn credentials are not configured",
            );
            return self.finish_aborted(state).await;
        };
        let (Some(draft), Some(vibe)) = (state.draft.clone(), state.vibe) else {
            state.abort(Stage::Publish, AbortReason::PublishFailed, "nothing to publish");
            return self.finish_aborted(state).await;
        };

        info!(platform = publisher.target_name(), "Publishing");
        match publisher.publish(&draft.text, state.visual.as_ref()).await {
            Ok(receipt) => {
                let post = PublishedPost {
                    platform_urn: receipt.post_urn.clone(),
                    vibe,
                    topic: state.post_topic(),
                    created_at: chrono::Utc::now(),
                    text_snapshot: draft.text,
                    has_image: receipt.has_image,
                };
                let record = state.record(
                    RunStatus::Published,
                    Stage::Record,
                    Some(receipt.post_urn),
                    receipt.has_image,
                );
                self.commit(state, record, Some(post)).await
            }
            Err(failure) => {
                warn!(
                    phase = %failure.phase,
                    orphaned = failure.orphaned_asset_urn.as_deref().unwrap_or("-"),
                    error = %failure.error,
                    "Publish failed"
                );
                state.abort(Stage::Publish, AbortReason::PublishFailed, failure.error.to_string());
                if let Some(f) = state.failure.as_mut() {
                    f.orphaned_asset_urn = failure.orphaned_asset_urn;
                }
                let record = state.record(RunStatus::PublishFailed, Stage::Publish, None, false);
                self.commit(state, record, None).await
            }
        }
    }

    async fn finish_aborted(&self, state: RunState) -> Result<RunOutcome, EngineError> {
        if let Some(f) = &state.failure {
            warn!(stage = %f.stage, reason = %f.reason, detail = %f.detail, "Run aborted");
        }
        let record = state.record(RunStatus::Aborted, Stage::Aborted, None, false);
        self.commit(state, record, None).await
    }

    /// The commit may wait on another process's writer lock, so it runs on
    /// the blocking pool rather than a runtime worker.
    async fn commit(
        &self,
        state: RunState,
        record: RunRecord,
        post: Option<PublishedPost>,
    ) -> Result<RunOutcome, EngineError> {
        let comment_pack_saved = state.comment_pack.is_some();
        let store = Arc::clone(&self.deps.store);
        let commit = RunCommit {
            rules: state.learned_rules,
            post,
            comment_pack: state.comment_pack,
            run: record.clone(),
        };
        let summary = tokio::task::spawn_blocking(move || store.commit_run(commit))
            .await
            .map_err(|e| EngineError::Memory(format!("memory commit task failed: {}", e)))??;

        info!(status = %record.status, stage = %record.stage, "Run finished");
        Ok(RunOutcome::Completed(RunReport {
            record,
            rules_added: summary.rules_added,
            comment_pack_saved,
        }))
    }
}
