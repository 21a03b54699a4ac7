use super::{GeneratedImage, ImageGenerator};
use crate::upstream::{check_status, UpstreamError};
use async_trait::async_trait;
use std::time::Duration;

/// Pollinations text-to-image client. Needs no credentials.
pub struct PollinationsProvider {
    base_url: String,
    width: u32,
    height: u32,
    client: reqwest::Client,
}

impl PollinationsProvider {
    pub fn new(
        base_url: impl Into<String>,
        width: u32,
        height: u32,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UpstreamError::from_reqwest)?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            width,
            height,
            client,
        })
    }

    fn url_for(&self, prompt: &str) -> String {
        format!(
            "{}/prompt/{}?width={}&height={}&nologo=true",
            self.base_url,
            urlencoding::encode(prompt),
            self.width,
            self.height
        )
    }
}

#[async_trait]
impl ImageGenerator for PollinationsProvider {
    fn name(&self) -> &str {
        "pollinations"
    }

    async fn generate(&self, prompt: &str) -> super::Result<GeneratedImage> {
        if prompt.trim().is_empty() {
            return Err(UpstreamError::InvalidRequest("Empty image prompt".to_string()));
        }

        let response = self
            .client
            .get(self.url_for(prompt))
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let response = check_status(response).await?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_default();

        if !mime_type.starts_with("image/") {
            return Err(UpstreamError::Parse(format!(
                "Expected an image, got content type '{}'",
                mime_type
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(UpstreamError::from_reqwest)?
            .to_vec();

        if bytes.is_empty() {
            return Err(UpstreamError::Parse("Empty image body".to_string()));
        }

        tracing::debug!(bytes = bytes.len(), mime = %mime_type, "Image generated");

        Ok(GeneratedImage { bytes, mime_type })
    }
}
