//! Generation connectors
//!
//! Text and image generation sit behind two small traits so the pipeline can
//! run against Gemini and Pollinations in production and against scripted
//! fakes in tests. Both report failures as [`UpstreamError`], which keeps a
//! rate-limit (transient) distinguishable from a malformed request (permanent).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::upstream::UpstreamError;

pub mod gemini;
pub mod pollinations;

pub use gemini::GeminiProvider;
pub use pollinations::PollinationsProvider;

/// Result type for generation calls
pub type Result<T> = std::result::Result<T, UpstreamError>;

/// A single generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    /// Persona and output-format instructions
    pub system: String,

    /// Task content for this call
    pub input: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            input: input.into(),
        }
    }
}

/// Produces text from a prompt
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}

/// Binary image returned by an image generator
#[derive(Clone, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl std::fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Produces an image from a prompt
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<GeneratedImage>;
}
