use super::{Prompt, TextGenerator};
use crate::secrets::SecretString;
use crate::upstream::{check_status, UpstreamError};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Google Gemini `generateContent` client
pub struct GeminiProvider {
    base_url: String,
    model: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UpstreamError::from_reqwest)?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            client,
        })
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(data: &serde_json::Value) -> Result<String, UpstreamError> {
    let candidate = data
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| UpstreamError::Parse("No candidates in response".to_string()))?;

    let parts = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| UpstreamError::Parse("No parts in candidate content".to_string()))?;

    let full_text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    if full_text.trim().is_empty() {
        let reason = candidate
            .get("finishReason")
            .and_then(|r| r.as_str())
            .unwrap_or("unknown");
        return Err(UpstreamError::Parse(format!(
            "Empty completion (finishReason: {})",
            reason
        )));
    }

    Ok(full_text.trim().to_string())
}

#[async_trait]
impl TextGenerator for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &Prompt) -> super::Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            self.api_key.unsecure()
        );

        let mut payload = serde_json::Map::new();
        payload.insert(
            "contents".to_string(),
            json!([{ "role": "user", "parts": [{ "text": prompt.input }] }]),
        );
        if !prompt.system.is_empty() {
            payload.insert(
                "systemInstruction".to_string(),
                json!({ "parts": [{ "text": prompt.system }] }),
            );
        }

        tracing::debug!(model = %self.model, "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let response = check_status(response).await?;

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))?;

        extract_text(&data)
    }
}
