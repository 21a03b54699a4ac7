//! Quill SDK
//!
//! Shared domain types and the error taxonomy for Quill components.
//! The engine depends on it, and so can any external tool that reads the
//! memory file.

/// Error types and handling
pub mod errors;

/// Pipeline domain types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, QuillErrorExt};
pub use types::{
    AbortReason, Classification, CommentDraft, CommentPack, CriticRule, CriticVerdict, Draft,
    Finding, PerformanceRecord, PublishedPost, ResearchBrief, RunRecord, RunStatus, Stage,
    StrategyBrief, Vibe, VisualAsset,
};
