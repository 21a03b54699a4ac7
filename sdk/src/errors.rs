//! Error types and handling
//!
//! This module provides the error types used throughout the Quill engine.
//! All errors implement the `QuillErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Error messages never carry credentials. Upstream bodies that end up in
//! `last_error` are scrubbed by the engine before they are logged.

use thiserror::Error;

/// Trait for Quill error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait QuillErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is a static string and never echoes upstream payloads.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors are expected to go away on a later run without
    /// operator intervention (rate limits, flaky sources, a held lock).
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: invalid config file or missing credentials
/// - **Memory**: persisted state cannot be read or committed
/// - **Upstream**: generation, research and publish calls that failed after
///   the retry policy gave up, or were rejected outright
/// - **Pipeline**: stage-fatal conditions such as an empty research brief
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, QuillErrorExt};
///
/// let error = EngineError::NoIntelligenceAvailable;
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::Credential("LINKEDIN_ACCESS_TOKEN".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {0}")]
    Credential(String),

    // Persistence errors
    #[error("Memory store error: {0}")]
    Memory(String),

    #[error("Memory store is locked by another writer: {0}")]
    StoreLocked(String),

    #[error("Unknown post: {0}")]
    UnknownPost(String),

    #[error("Post already recorded: {0}")]
    DuplicatePost(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Upstream errors
    #[error("Upstream '{operation}' exhausted after {attempts} attempts: {last_error}")]
    UpstreamExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Upstream '{operation}' rejected the request: {error}")]
    UpstreamRejected { operation: String, error: String },

    // Pipeline errors
    #[error("No intelligence available from any research source")]
    NoIntelligenceAvailable,

    #[error("Run cancelled")]
    Cancelled,

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl QuillErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Credential(_) => "Export the credential or store it in the system keychain",

            Self::Memory(_) => "The memory file could not be read. Inspect or restore it",
            Self::StoreLocked(_) => "Another run is writing memory. Wait for it to finish",
            Self::UnknownPost(_) => "No published post with that URN is recorded",
            Self::DuplicatePost(_) => "That post is already recorded",
            Self::Serialization(_) => "Stored data could not be encoded or decoded",

            Self::UpstreamExhausted { .. } => {
                "An external service kept failing. Try again later"
            }
            Self::UpstreamRejected { .. } => {
                "An external service rejected the request. Check credentials and settings"
            }

            Self::NoIntelligenceAvailable => "No research source returned data. Try again later",
            Self::Cancelled => "The run was cancelled before anything was published",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Need an operator to fix something before the next run
            Self::Config(_)
            | Self::Credential(_)
            | Self::Memory(_)
            | Self::UpstreamRejected { .. } => false,

            _ => true,
        }
    }
}
