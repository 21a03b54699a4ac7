//! Command handlers for CLI operations
//!
//! - run: one pipeline run
//! - stats: persona performance, counts and recent runs
//! - history: published posts with their latest performance
//! - rules: learned critic rules
//! - comments: the latest comment pack
//! - record: manual engagement entry
//! - refresh: engagement pass against LinkedIn
//!
//! The read-only commands never take the writer lock.

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::analytics::{self, AnalyticsPass, Engagement, Thresholds};
use crate::config::Config;
use crate::llm::{GeminiProvider, ImageGenerator, PollinationsProvider};
use crate::memory::MemoryStore;
use crate::pipeline::{PipelineDeps, PipelineOrchestrator, PipelineSettings, RunOutcome};
use crate::publish::{LinkedInClient, PublishProtocol};
use crate::research::{build_connectors, ResearchAggregator};
use crate::retry::{ResilientCaller, RetryPolicy};
use crate::secrets::{CredentialKey, Credentials};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn open_store(config: &Config) -> Result<Arc<MemoryStore>> {
    let path = config.memory_path();
    let store = MemoryStore::open(&path)
        .with_context(|| format!("Failed to open memory at {}", path.display()))?
        .with_stale_lock_after(Duration::from_secs(config.core.stale_lock_secs));
    Ok(Arc::new(store))
}

fn linkedin_client(config: &Config, credentials: &Credentials) -> Result<Option<LinkedInClient>> {
    let Some(token) = credentials.get(CredentialKey::LinkedInAccessToken) else {
        return Ok(None);
    };
    let client = LinkedInClient::new(
        &config.publish.base_url,
        &config.publish.api_version,
        token,
        Duration::from_secs(config.publish.timeout_secs),
    )
    .context("Failed to build LinkedIn client")?;
    Ok(Some(client))
}

/// Wire every collaborator a run needs from config and credentials
pub fn build_pipeline(
    config: &Config,
    credentials: &Credentials,
    settings: PipelineSettings,
) -> Result<PipelineOrchestrator> {
    let caller = ResilientCaller::new(RetryPolicy::from(&config.retry));

    let connectors = build_connectors(&config.research, credentials)?;
    if connectors.is_empty() {
        anyhow::bail!("No research sources are enabled");
    }
    let research = ResearchAggregator::new(connectors, caller.clone(), &config.research);

    let gemini_key = credentials.require(CredentialKey::GeminiApiKey)?.clone();
    let text = Arc::new(
        GeminiProvider::new(
            &config.generation.gemini_base_url,
            &config.generation.model,
            gemini_key,
            Duration::from_secs(config.generation.timeout_secs),
        )
        .context("Failed to build Gemini client")?,
    );

    let image: Option<Arc<dyn ImageGenerator>> = if config.generation.image_enabled {
        Some(Arc::new(
            PollinationsProvider::new(
                &config.generation.image_base_url,
                config.generation.width,
                config.generation.height,
                Duration::from_secs(config.generation.timeout_secs),
            )
            .context("Failed to build image client")?,
        ))
    } else {
        None
    };

    let publisher = match (
        linkedin_client(config, credentials)?,
        credentials.get(CredentialKey::LinkedInPersonUrn),
    ) {
        (Some(client), Some(owner)) => Some(PublishProtocol::new(
            Arc::new(client),
            caller.clone(),
            owner.unsecure(),
        )),
        _ => {
            tracing::warn!("LinkedIn credentials missing, runs will stop before publishing");
            None
        }
    };

    let deps = PipelineDeps {
        research,
        text,
        image,
        publisher,
        store: open_store(config)?,
        caller,
    };

    Ok(PipelineOrchestrator::new(deps, settings))
}

/// Execute one run. Returns whether a post was published.
pub async fn handle_run(
    config: &Config,
    topic: Option<String>,
    format: OutputFormat,
    cancel: CancellationToken,
) -> Result<bool> {
    let credentials = Credentials::resolve();
    let mut settings = PipelineSettings::from(config);
    settings.topic = topic;

    let orchestrator = build_pipeline(config, &credentials, settings)?;
    let outcome = orchestrator.run(&cancel).await.context("Run failed")?;

    match (&outcome, format) {
        (RunOutcome::Cancelled { run_id, stage }, OutputFormat::Text) => {
            println!("Run {} cancelled during {}; nothing was recorded.", run_id, stage);
        }
        (RunOutcome::Cancelled { run_id, stage }, OutputFormat::Json) => {
            print_json(&json!({ "run_id": run_id, "status": "cancelled", "stage": stage }))?;
        }
        (RunOutcome::Completed(report), OutputFormat::Text) => {
            let r = &report.record;
            println!("Run {}", r.run_id);
            println!("  Status:    {}", r.status);
            println!("  Stage:     {}", r.stage);
            if let Some(reason) = r.reason {
                println!("  Reason:    {}", reason);
            }
            if let Some(detail) = &r.detail {
                println!("  Detail:    {}", detail);
            }
            if let Some(vibe) = r.vibe {
                println!("  Persona:   {}", vibe);
            }
            if let Some(topic) = &r.topic {
                println!("  Topic:     {}", topic);
            }
            if let Some(urn) = &r.post_urn {
                println!("  Post:      {}", urn);
                println!("  Image:     {}", if r.has_image { "yes" } else { "no" });
            }
            if let Some(orphan) = &r.orphaned_asset_urn {
                println!("  Orphaned:  {}", orphan);
            }
            println!("  Revisions: {}", r.revisions);
            println!("  New rules: {}", report.rules_added);
        }
        (RunOutcome::Completed(report), OutputFormat::Json) => {
            print_json(&serde_json::to_value(report)?)?;
        }
    }

    Ok(outcome.is_published())
}

pub fn handle_stats(config: &Config, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;
    let state = store.load()?;
    let stats = state.persona_stats();
    let recent: Vec<_> = state.runs.iter().rev().take(5).collect();

    match format {
        OutputFormat::Text => {
            println!("Posts: {}   Rules: {}   Runs: {}", state.posts.len(), state.rules.len(), state.runs.len());
            println!();
            if stats.is_empty() {
                println!("No persona data yet.");
            } else {
                println!("{:<12} {:>6} {:>6} {:>6} {:>10}", "Persona", "Posts", "Wins", "Losses", "Avg eng.");
                for (vibe, s) in &stats {
                    println!(
                        "{:<12} {:>6} {:>6} {:>6} {:>10.1}",
                        vibe.as_str(),
                        s.posts,
                        s.win_count,
                        s.loss_count,
                        s.avg_engagement
                    );
                }
            }
            if !recent.is_empty() {
                println!();
                println!("Recent runs:");
                for run in recent {
                    let reason = run.reason.map(|r| r.to_string()).unwrap_or_default();
                    println!(
                        "  {}  {:<14} {:<9} {}",
                        run.finished_at.format("%Y-%m-%d %H:%M"),
                        run.status,
                        run.stage,
                        reason
                    );
                }
            }
        }
        OutputFormat::Json => {
            let personas: serde_json::Map<String, serde_json::Value> = stats
                .iter()
                .map(|(vibe, s)| serde_json::to_value(s).map(|v| (vibe.to_string(), v)))
                .collect::<Result<_, serde_json::Error>>()?;
            print_json(&json!({
                "posts": state.posts.len(),
                "rules": state.rules.len(),
                "runs": state.runs.len(),
                "personas": personas,
                "recent_runs": recent,
            }))?;
        }
    }
    Ok(())
}

pub fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;
    let state = store.load()?;
    let posts: Vec<_> = state.posts.iter().rev().take(limit).collect();

    match format {
        OutputFormat::Text => {
            if posts.is_empty() {
                println!("No published posts yet");
                return Ok(());
            }
            println!("Published posts (last {}):", limit);
            println!();
            for post in posts {
                println!("{}", post.platform_urn);
                println!("  Persona: {}", post.vibe);
                println!("  Topic:   {}", post.topic);
                println!("  Created: {}", post.created_at.to_rfc3339());
                match state.latest_performance(&post.platform_urn) {
                    Some(p) => println!(
                        "  Result:  {} ({} views, {} likes, {} comments)",
                        p.classification,
                        p.views.map_or_else(|| "?".to_string(), |v| v.to_string()),
                        p.likes,
                        p.comments
                    ),
                    None => println!("  Result:  not measured"),
                }
                println!();
            }
        }
        OutputFormat::Json => {
            let rows: Vec<_> = posts
                .iter()
                .map(|post| {
                    json!({
                        "post": post,
                        "performance": state.latest_performance(&post.platform_urn),
                    })
                })
                .collect();
            print_json(&json!({ "posts": rows }))?;
        }
    }
    Ok(())
}

pub fn handle_rules(config: &Config, format: OutputFormat) -> Result<()> {
    let rules = open_store(config)?.rules()?;
    match format {
        OutputFormat::Text => {
            if rules.is_empty() {
                println!("No rules learned yet");
            }
            for (i, rule) in rules.iter().enumerate() {
                println!("{:>3}. {}", i + 1, rule.text);
            }
        }
        OutputFormat::Json => print_json(&json!({ "rules": rules }))?,
    }
    Ok(())
}

pub fn handle_comments(config: &Config, format: OutputFormat) -> Result<()> {
    let pack = open_store(config)?.load()?.latest_comment_pack;
    match (pack, format) {
        (None, OutputFormat::Text) => println!("No comment pack yet"),
        (Some(pack), OutputFormat::Text) => {
            println!("Comment pack for: {}", pack.target_post_ref);
            println!("Generated: {}", pack.created_at.to_rfc3339());
            for draft in &pack.drafts {
                println!();
                println!("[{}]", draft.style_tag);
                println!("{}", draft.text);
            }
        }
        (pack, OutputFormat::Json) => print_json(&json!({ "comment_pack": pack }))?,
    }
    Ok(())
}

pub fn handle_record(
    urn: &str,
    engagement: Engagement,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let thresholds = Thresholds::from(&config.analytics);
    let record = analytics::record_for(urn, engagement, &thresholds);
    let classification = record.classification;

    open_store(config)?
        .attach_performance(urn, record)
        .with_context(|| format!("Failed to record performance for {}", urn))?;

    match format {
        OutputFormat::Text => println!("Recorded {} as {}", urn, classification),
        OutputFormat::Json => print_json(&json!({ "urn": urn, "classification": classification }))?,
    }
    Ok(())
}

pub async fn handle_refresh(config: &Config, format: OutputFormat) -> Result<()> {
    let credentials = Credentials::resolve();
    let client = linkedin_client(config, &credentials)?.ok_or_else(|| {
        anyhow::anyhow!(
            "{} is required to read engagement",
            CredentialKey::LinkedInAccessToken.env_var()
        )
    })?;

    let pass = AnalyticsPass::new(
        Arc::new(client),
        ResilientCaller::new(RetryPolicy::from(&config.retry)),
        Thresholds::from(&config.analytics),
    );
    let summary = pass.refresh(&*open_store(config)?).await?;

    match format {
        OutputFormat::Text => println!(
            "Engagement refreshed: {} updated, {} unavailable, {} failed",
            summary.updated, summary.unavailable, summary.failed
        ),
        OutputFormat::Json => print_json(&serde_json::to_value(summary)?)?,
    }
    Ok(())
}
