//! Three-phase publishing
//!
//! A post with an image needs three calls against the platform:
//!
//! 1. **Register** an upload and receive a target plus an asset urn
//! 2. **Upload** the bytes to that target
//! 3. **Create** the post, referencing the asset urn
//!
//! Register and create go through the [`ResilientCaller`]. An upload is tried
//! exactly once per ticket: a target that failed once is never reused, so any
//! retry starts over with a fresh register/upload pair, up to the policy's
//! attempt budget. When no pair succeeds the post goes out text-only. A failed
//! create is final: the asset urn it would have used is reported as orphaned.

pub mod linkedin;

pub use linkedin::LinkedInClient;

use crate::retry::ResilientCaller;
use crate::upstream::{classify, ErrorClass, UpstreamError};
use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::VisualAsset;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Where to upload one asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTicket {
    pub upload_target: String,
    pub asset_urn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    pub author: String,
    pub text: String,
    pub asset_urn: Option<String>,
}

/// A platform that accepts posts with optional uploaded media
#[async_trait]
pub trait PublishTarget: Send + Sync {
    fn name(&self) -> &str;

    async fn register_upload(&self, owner: &str) -> Result<UploadTicket, UpstreamError>;

    async fn upload(
        &self,
        ticket: &UploadTicket,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<(), UpstreamError>;

    /// Create the post and return its platform id
    async fn create_post(&self, request: &PostRequest) -> Result<String, UpstreamError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishPhase {
    Register,
    Upload,
    Create,
}

impl PublishPhase {
    fn operation(&self) -> &'static str {
        match self {
            PublishPhase::Register => "publish:register",
            PublishPhase::Upload => "publish:upload",
            PublishPhase::Create => "publish:create",
        }
    }
}

impl fmt::Display for PublishPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PublishPhase::Register => "register",
            PublishPhase::Upload => "upload",
            PublishPhase::Create => "create",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub post_urn: String,
    pub asset_urn: Option<String>,
    pub has_image: bool,
    /// Register/upload pairs tried, zero for a text-only post
    pub upload_pairs: u32,
}

/// Publishing did not produce a post
#[derive(Debug, thiserror::Error)]
#[error("publish failed during {phase}: {error}")]
pub struct PublishFailure {
    pub phase: PublishPhase,
    /// Uploaded asset that no post references
    pub orphaned_asset_urn: Option<String>,
    #[source]
    pub error: EngineError,
}

pub struct PublishProtocol {
    target: Arc<dyn PublishTarget>,
    caller: ResilientCaller,
    owner: String,
}

impl PublishProtocol {
    pub fn new(target: Arc<dyn PublishTarget>, caller: ResilientCaller, owner: impl Into<String>) -> Self {
        Self {
            target,
            caller,
            owner: owner.into(),
        }
    }

    pub fn target_name(&self) -> &str {
        self.target.name()
    }

    pub async fn publish(
        &self,
        text: &str,
        image: Option<&VisualAsset>,
    ) -> Result<PublishReceipt, PublishFailure> {
        let (asset_urn, upload_pairs) = match image {
            Some(asset) => self.upload_asset(asset).await,
            None => (None, 0),
        };

        let request = PostRequest {
            author: self.owner.clone(),
            text: text.to_string(),
            asset_urn: asset_urn.clone(),
        };

        let target = &self.target;
        let created = self
            .caller
            .call(
                PublishPhase::Create.operation(),
                || target.create_post(&request),
                classify,
            )
            .await;

        match created {
            Ok(post_urn) => {
                info!(
                    platform = self.target.name(),
                    urn = %post_urn,
                    has_image = asset_urn.is_some(),
                    "Post published"
                );
                Ok(PublishReceipt {
                    post_urn,
                    has_image: asset_urn.is_some(),
                    asset_urn,
                    upload_pairs,
                })
            }
            Err(e) => {
                if let Some(orphan) = &asset_urn {
                    warn!(urn = %orphan, "Uploaded asset orphaned by failed post creation");
                }
                Err(PublishFailure {
                    phase: PublishPhase::Create,
                    orphaned_asset_urn: asset_urn,
                    error: e.into_engine_error(),
                })
            }
        }
    }

    /// Register and upload with a fresh ticket per pair. Returns the urn of
    /// the successful upload, if any, and the number of pairs tried.
    async fn upload_asset(&self, asset: &VisualAsset) -> (Option<String>, u32) {
        let max_pairs = self.caller.policy().max_attempts.max(1);
        let target = &self.target;
        let owner = self.owner.as_str();

        for pair in 1..=max_pairs {
            if pair > 1 {
                self.caller
                    .backoff(PublishPhase::Upload.operation(), pair)
                    .await;
            }

            let ticket = match self
                .caller
                .call(
                    PublishPhase::Register.operation(),
                    || target.register_upload(owner),
                    classify,
                )
                .await
            {
                Ok(ticket) => ticket,
                Err(e) => {
                    warn!(pair, error = %e, "Upload registration failed, publishing text-only");
                    return (None, pair);
                }
            };

            // Single attempt: the ticket is spent whether or not this succeeds
            match target
                .upload(&ticket, &asset.binary_image, &asset.mime_type)
                .await
            {
                Ok(()) => return (Some(ticket.asset_urn), pair),
                Err(e) => {
                    warn!(
                        pair,
                        urn = %ticket.asset_urn,
                        transient = classify(&e) == ErrorClass::Transient,
                        error = %e,
                        "Upload failed, discarding ticket"
                    );
                }
            }
        }

        warn!(pairs = max_pairs, "Image upload exhausted, publishing text-only");
        (None, max_pairs)
    }
}
