//! LinkedIn REST client
//!
//! Implements [`PublishTarget`] against the versioned `/rest` API and
//! [`EngagementSource`] against `socialActions`.

use super::{PostRequest, PublishTarget, UploadTicket};
use crate::analytics::{Engagement, EngagementSource};
use crate::secrets::SecretString;
use crate::upstream::{check_status, UpstreamError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";

pub struct LinkedInClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct InitializeUploadResponse {
    value: InitializeUploadValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeUploadValue {
    upload_url: String,
    image: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SocialActions {
    #[serde(default)]
    likes_summary: Option<LikesSummary>,
    #[serde(default)]
    comments_summary: Option<CommentsSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LikesSummary {
    #[serde(default)]
    total_likes: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentsSummary {
    #[serde(default, alias = "aggregatedTotalComments")]
    total_comments: u64,
}

impl LinkedInClient {
    pub fn new(
        base_url: &str,
        api_version: &str,
        access_token: &SecretString,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", access_token.unsecure()))
            .map_err(|_| UpstreamError::InvalidRequest("access token is not a valid header".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            "X-Restli-Protocol-Version",
            HeaderValue::from_static(RESTLI_PROTOCOL_VERSION),
        );
        headers.insert(
            "LinkedIn-Version",
            HeaderValue::from_str(api_version)
                .map_err(|_| UpstreamError::InvalidRequest("invalid LinkedIn-Version".into()))?,
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(UpstreamError::from_reqwest)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

fn post_body(request: &PostRequest) -> Value {
    let mut body = json!({
        "author": request.author,
        "commentary": request.text,
        "visibility": "PUBLIC",
        "distribution": {
            "feedDistribution": "MAIN_FEED",
            "targetEntities": [],
            "thirdPartyDistributionChannels": []
        },
        "lifecycleState": "PUBLISHED",
        "isReshareDisabledByAuthor": false
    });

    if let Some(asset) = &request.asset_urn {
        body["content"] = json!({ "media": { "id": asset } });
    }

    body
}

#[async_trait]
impl PublishTarget for LinkedInClient {
    fn name(&self) -> &str {
        "linkedin"
    }

    async fn register_upload(&self, owner: &str) -> Result<UploadTicket, UpstreamError> {
        let response = self
            .client
            .post(format!("{}/rest/images?action=initializeUpload", self.base_url))
            .json(&json!({ "initializeUploadRequest": { "owner": owner } }))
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let parsed: InitializeUploadResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))?;

        debug!(urn = %parsed.value.image, "Upload registered");
        Ok(UploadTicket {
            upload_target: parsed.value.upload_url,
            asset_urn: parsed.value.image,
        })
    }

    async fn upload(
        &self,
        ticket: &UploadTicket,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<(), UpstreamError> {
        let response = self
            .client
            .put(&ticket.upload_target)
            .header(CONTENT_TYPE, mime_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        check_status(response).await?;
        Ok(())
    }

    async fn create_post(&self, request: &PostRequest) -> Result<String, UpstreamError> {
        let response = self
            .client
            .post(format!("{}/rest/posts", self.base_url))
            .json(&post_body(request))
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let response = check_status(response).await?;

        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(id) = header_id.filter(|id| !id.is_empty()) {
            return Ok(id);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|_| UpstreamError::Parse("post created without an id".to_string()))?;
        body.get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| UpstreamError::Parse("post created without an id".to_string()))
    }
}

#[async_trait]
impl EngagementSource for LinkedInClient {
    async fn engagement(&self, urn: &str) -> Result<Option<Engagement>, UpstreamError> {
        let response = self
            .client
            .get(format!(
                "{}/rest/socialActions/{}",
                self.base_url,
                urlencoding::encode(urn)
            ))
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        // Personal profiles cannot read their own social actions
        if matches!(response.status(), StatusCode::FORBIDDEN | StatusCode::NOT_FOUND) {
            debug!(urn, status = %response.status(), "Engagement unavailable");
            return Ok(None);
        }

        let actions: SocialActions = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))?;

        // socialActions has no impression count
        Ok(Some(Engagement {
            views: None,
            likes: actions.likes_summary.map(|l| l.total_likes).unwrap_or(0),
            comments: actions.comments_summary.map(|c| c.total_comments).unwrap_or(0),
        }))
    }
}
