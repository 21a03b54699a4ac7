//! Quill Engine Library
//!
//! This library provides the core functionality of the Quill pipeline.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Credential resolution and log scrubbing
pub mod secrets;

/// Shared error type for external HTTP services
pub mod upstream;

/// Bounded retry and backoff for upstream calls
pub mod retry;

/// Multi-source research aggregation
pub mod research;

/// Text and image generation providers
pub mod llm;

/// Prompt builders and reply parsers for each editorial stage
pub mod agents;

/// Durable editorial memory
pub mod memory;

/// Register/upload/create publishing protocol
pub mod publish;

/// Engagement classification and the feedback pass
pub mod analytics;

/// Run orchestration
pub mod pipeline;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
