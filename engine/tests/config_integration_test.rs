//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be loaded from disk,
//! validated, and adjusted by command-line overrides.

use std::path::PathBuf;
use tempfile::TempDir;

use quill_engine::config::{Config, Overrides};
use quill_engine::retry::RetryPolicy;
use sdk::types::Vibe;

const FULL_CONFIG: &str = r#"
[core]
log_level = "debug"
data_dir = "/var/lib/quill"
memory_file = "state/memory.json"
stale_lock_secs = 300

[retry]
max_attempts = 4
base_delay_ms = 2000
max_jitter_ms = 500

[research]
sources = ["tavily", "hackernews"]
max_findings = 8
per_source_limit = 3
keywords = ["agents", "llm"]

[generation]
model = "gemini-2.5-pro"
image_enabled = false

[publish]
api_version = "202501"

[pipeline]
persona = "The Satirist"
topics = ["Agents at work"]
comment_pack = false
max_revisions = 0

[analytics]
winner_views = 2000
loser_views = 200
"#;

#[test]
fn test_config_toml_parsing() {
    let config = Config::from_toml(FULL_CONFIG).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.retry.max_attempts, 4);
    assert_eq!(config.research.sources, vec!["tavily", "hackernews"]);
    assert_eq!(config.research.per_source_limit, 3);
    assert_eq!(config.generation.model, "gemini-2.5-pro");
    assert!(!config.generation.image_enabled);
    assert_eq!(config.publish.api_version, "202501");
    assert_eq!(config.pipeline.persona, Some(Vibe::Satirist));
    assert_eq!(config.pipeline.max_revisions, 0);
    assert_eq!(config.analytics.winner_views, 2000);
    // Unset fields keep their defaults
    assert_eq!(config.analytics.winner_reactions, 25);
    assert_eq!(config.generation.width, 1200);
}

#[test]
fn test_memory_path_joins_data_dir() {
    let config = Config::from_toml(FULL_CONFIG).unwrap();
    assert_eq!(
        config.memory_path(),
        PathBuf::from("/var/lib/quill/state/memory.json")
    );

    let absolute = Config::from_toml(
        r#"
[core]
data_dir = "/var/lib/quill"
memory_file = "/tmp/elsewhere.json"
"#,
    )
    .unwrap();
    assert_eq!(absolute.memory_path(), PathBuf::from("/tmp/elsewhere.json"));
}

#[test]
fn test_tilde_data_dir_is_expanded() {
    let config = Config::from_toml("").unwrap();
    assert!(config.core.data_dir.is_absolute());
    assert!(config.memory_path().ends_with(".quill/memory.json"));
}

#[test]
fn test_load_from_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, FULL_CONFIG).unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.core.stale_lock_secs, 300);
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let err = Config::load_from_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_invalid_values_rejected() {
    let cases = [
        "[core]\nlog_level = \"loud\"",
        "[retry]\nmax_attempts = 0",
        "[retry]\nbase_delay_ms = 100\nmax_jitter_ms = 500",
        "[research]\nsources = [\"reddit\"]",
        "[research]\nmax_findings = 0",
        "[pipeline]\nmax_revisions = 3",
        "[pipeline]\npersona = \"The Poet\"",
        "[analytics]\nwinner_views = 100\nloser_views = 500",
    ];

    for case in cases {
        assert!(Config::from_toml(case).is_err(), "accepted: {}", case);
    }
}

#[test]
fn test_overrides_apply_and_revalidate() {
    let mut config = Config::from_toml("").unwrap();
    config
        .apply_overrides(&Overrides {
            persona: Some(Vibe::Oracle),
            max_retries: Some(5),
            no_image: true,
        })
        .unwrap();

    assert_eq!(config.pipeline.persona, Some(Vibe::Oracle));
    assert_eq!(RetryPolicy::from(&config.retry).max_attempts, 5);
    assert!(!config.generation.image_enabled);

    let err = config.apply_overrides(&Overrides {
        max_retries: Some(0),
        ..Default::default()
    });
    assert!(err.is_err());
}

#[test]
fn test_default_config_serializes_without_credentials() {
    let rendered = toml::to_string_pretty(&Config::default()).unwrap();
    assert!(rendered.contains("[research]"));
    assert!(!rendered.to_lowercase().contains("token"));
    assert!(!rendered.to_lowercase().contains("api_key"));
}
