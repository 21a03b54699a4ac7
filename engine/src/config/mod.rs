//! Configuration management
//!
//! This module handles loading, validation, and management of the Quill configuration.
//! Configuration is stored in TOML format at ~/.quill/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory, memory file, log level
//! - **retry**: Attempt budget and backoff timing for upstream calls
//! - **research**: Enabled sources (in priority order), brief size, relevance keywords
//! - **generation**: Text and image generation endpoints
//! - **publish**: LinkedIn endpoint and API version
//! - **pipeline**: Persona override, fallback topics, comment pack toggle
//! - **analytics**: WINNER/LOSER thresholds
//!
//! Every section and field has a default, so a partial file is valid. Credentials
//! are never read from this file; see [`crate::secrets::Credentials`].
//!
//! # Examples
//!
//! ```no_run
//! use quill_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Memory file: {:?}", config.memory_path());
//! println!("Sources: {:?}", config.research.sources);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use sdk::types::Vibe;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Source ids the research layer knows how to build
pub const KNOWN_SOURCES: [&str; 4] = ["hackernews", "newsapi", "arxiv", "tavily"];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub research: ResearchConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Memory file name, relative to `data_dir` unless absolute
    #[serde(default = "default_memory_file")]
    pub memory_file: PathBuf,

    /// Age after which a leftover writer lock is considered abandoned
    #[serde(default = "default_stale_lock_secs")]
    pub stale_lock_secs: u64,
}

/// Retry/backoff policy shared by every upstream call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles for each later attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound of the random jitter added to each delay
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

/// Research aggregation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Enabled sources, highest priority first
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    /// Maximum findings in a merged brief
    #[serde(default = "default_max_findings")]
    pub max_findings: usize,

    /// Maximum findings kept from any single source
    #[serde(default = "default_per_source_limit")]
    pub per_source_limit: usize,

    /// How many Hacker News top stories to inspect
    #[serde(default = "default_scan_depth")]
    pub scan_depth: usize,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Relevance keywords applied to unscoped sources
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    #[serde(default = "default_hackernews_base_url")]
    pub hackernews_base_url: String,

    #[serde(default = "default_newsapi_base_url")]
    pub newsapi_base_url: String,

    #[serde(default = "default_arxiv_base_url")]
    pub arxiv_base_url: String,

    #[serde(default = "default_tavily_base_url")]
    pub tavily_base_url: String,
}

/// Text and image generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Base URL for Gemini API
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    /// Model name
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// Base URL for the image generator
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,

    /// Generate an image for each post
    #[serde(default = "default_true")]
    pub image_enabled: bool,

    #[serde(default = "default_image_width")]
    pub width: u32,

    #[serde(default = "default_image_height")]
    pub height: u32,

    /// Per-request timeout; image generation is slow
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

/// Publish target settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_linkedin_base_url")]
    pub base_url: String,

    /// Value of the `LinkedIn-Version` header (YYYYMM)
    #[serde(default = "default_linkedin_api_version")]
    pub api_version: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Pipeline behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Always use this persona instead of weighted selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<Vibe>,

    /// Fallback topics used when no topic hint is given
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,

    /// Generate a comment pack for the top finding
    #[serde(default = "default_true")]
    pub comment_pack: bool,

    /// Critique-driven redrafts per run (0 or 1)
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u8,
}

/// Engagement thresholds for WINNER/LOSER classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_winner_views")]
    pub winner_views: u64,

    #[serde(default = "default_loser_views")]
    pub loser_views: u64,

    /// Likes plus comments that make a post a winner regardless of views
    #[serde(default = "default_winner_reactions")]
    pub winner_reactions: u64,

    #[serde(default = "default_loser_reactions")]
    pub loser_reactions: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.quill")
}

fn default_memory_file() -> PathBuf {
    PathBuf::from("memory.json")
}

fn default_stale_lock_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    5_000
}

fn default_max_jitter_ms() -> u64 {
    1_000
}

fn default_sources() -> Vec<String> {
    KNOWN_SOURCES.iter().map(|s| s.to_string()).collect()
}

fn default_max_findings() -> usize {
    12
}

fn default_per_source_limit() -> usize {
    5
}

fn default_scan_depth() -> usize {
    30
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_keywords() -> Vec<String> {
    [
        "ai",
        "llm",
        "gpt",
        "agent",
        "model",
        "neural",
        "machine learning",
        "robot",
        "bot",
        "intelligence",
        "deepmind",
        "openai",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_hackernews_base_url() -> String {
    "https://hacker-news.firebaseio.com".to_string()
}

fn default_newsapi_base_url() -> String {
    "https://newsapi.org".to_string()
}

fn default_arxiv_base_url() -> String {
    "http://export.arxiv.org".to_string()
}

fn default_tavily_base_url() -> String {
    "https://api.tavily.com".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_image_base_url() -> String {
    "https://image.pollinations.ai".to_string()
}

fn default_image_width() -> u32 {
    1200
}

fn default_image_height() -> u32 {
    628
}

fn default_generation_timeout_secs() -> u64 {
    60
}

fn default_linkedin_base_url() -> String {
    "https://api.linkedin.com".to_string()
}

fn default_linkedin_api_version() -> String {
    "202411".to_string()
}

fn default_topics() -> Vec<String> {
    [
        "The rise of Multi-Agent Systems",
        "Why Chatbots are dead",
        "The future of coding is Agentic",
        "LLMs as Operating Systems",
        "Prompt Engineering is replaced by Flow Engineering",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_revisions() -> u8 {
    1
}

fn default_winner_views() -> u64 {
    1_000
}

fn default_loser_views() -> u64 {
    300
}

fn default_winner_reactions() -> u64 {
    25
}

fn default_loser_reactions() -> u64 {
    5
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            memory_file: default_memory_file(),
            stale_lock_secs: default_stale_lock_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            max_findings: default_max_findings(),
            per_source_limit: default_per_source_limit(),
            scan_depth: default_scan_depth(),
            timeout_secs: default_timeout_secs(),
            keywords: default_keywords(),
            hackernews_base_url: default_hackernews_base_url(),
            newsapi_base_url: default_newsapi_base_url(),
            arxiv_base_url: default_arxiv_base_url(),
            tavily_base_url: default_tavily_base_url(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            gemini_base_url: default_gemini_base_url(),
            model: default_gemini_model(),
            image_base_url: default_image_base_url(),
            image_enabled: true,
            width: default_image_width(),
            height: default_image_height(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            base_url: default_linkedin_base_url(),
            api_version: default_linkedin_api_version(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            persona: None,
            topics: default_topics(),
            comment_pack: true,
            max_revisions: default_max_revisions(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            winner_views: default_winner_views(),
            loser_views: default_loser_views(),
            winner_reactions: default_winner_reactions(),
            loser_reactions: default_loser_reactions(),
        }
    }
}

/// Command-line overrides applied on top of the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub persona: Option<Vibe>,
    pub max_retries: Option<u32>,
    pub no_image: bool,
}

impl Config {
    /// Load configuration from the default location, creating it if absent
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, TOML parsing fails, or
    /// validation fails.
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.quill/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".quill").join("config.toml"))
    }

    /// Absolute path of the memory file
    pub fn memory_path(&self) -> PathBuf {
        if self.core.memory_file.is_absolute() {
            self.core.memory_file.clone()
        } else {
            self.core.data_dir.join(&self.core.memory_file)
        }
    }

    /// Apply command-line overrides and re-validate
    pub fn apply_overrides(&mut self, overrides: &Overrides) -> Result<(), EngineError> {
        if let Some(persona) = overrides.persona {
            self.pipeline.persona = Some(persona);
        }
        if let Some(max_retries) = overrides.max_retries {
            self.retry.max_attempts = max_retries;
        }
        if overrides.no_image {
            self.generation.image_enabled = false;
        }
        self.validate()
    }

    /// Validate and process configuration
    ///
    /// Expands ~ in `data_dir` and checks every numeric invariant the
    /// pipeline relies on.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.validate()
    }

    fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(EngineError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        // Keeps successive delays monotonic
        if self.retry.max_jitter_ms > self.retry.base_delay_ms {
            return Err(EngineError::Config(
                "retry.max_jitter_ms must not exceed retry.base_delay_ms".to_string(),
            ));
        }

        for source in &self.research.sources {
            if !KNOWN_SOURCES.contains(&source.as_str()) {
                return Err(EngineError::Config(format!(
                    "Unknown research source '{}'. Must be one of: {}",
                    source,
                    KNOWN_SOURCES.join(", ")
                )));
            }
        }

        if self.research.max_findings == 0 || self.research.per_source_limit == 0 {
            return Err(EngineError::Config(
                "research.max_findings and research.per_source_limit must be at least 1"
                    .to_string(),
            ));
        }

        if self.pipeline.max_revisions > 1 {
            return Err(EngineError::Config(
                "pipeline.max_revisions must be 0 or 1".to_string(),
            ));
        }

        if self.analytics.loser_views > self.analytics.winner_views
            || self.analytics.loser_reactions > self.analytics.winner_reactions
        {
            return Err(EngineError::Config(
                "analytics loser thresholds must not exceed winner thresholds".to_string(),
            ));
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
