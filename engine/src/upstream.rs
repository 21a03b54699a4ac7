//! Shared error type for every external HTTP service
//!
//! Research sources, the text and image generators and the publish target all
//! report failures as [`UpstreamError`]. Its [`class`](UpstreamError::class)
//! decides whether the retry layer may try again.

use reqwest::StatusCode;

use crate::secrets::scrub;

/// Result type for upstream calls
pub type Result<T> = std::result::Result<T, UpstreamError>;

/// Whether a failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rate limits, timeouts, 5xx and dropped connections
    Transient,
    /// Bad credentials, malformed requests, unparseable responses
    Permanent,
}

/// Errors that can occur when talking to an external service
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UpstreamError {
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Timeout")]
    Timeout,

    #[error("Server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Keep error bodies short and free of credentials
fn excerpt(body: &str) -> String {
    let cleaned = scrub(body.trim());
    if cleaned.chars().count() > 300 {
        let cut: String = cleaned.chars().take(300).collect();
        format!("{}...", cut)
    } else {
        cleaned
    }
}

impl UpstreamError {
    /// Map a non-success HTTP status to an error
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let body = excerpt(body);
        match status.as_u16() {
            429 => UpstreamError::RateLimited(body),
            408 | 504 => UpstreamError::Timeout,
            401 | 403 => UpstreamError::Auth(body),
            code if status.is_server_error() => UpstreamError::Server { status: code, body },
            code if status.is_client_error() => {
                UpstreamError::InvalidRequest(format!("HTTP {}: {}", code, body))
            }
            code => UpstreamError::Unavailable(format!("unexpected HTTP {}: {}", code, body)),
        }
    }

    /// Map a transport-level error
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else if err.is_decode() {
            UpstreamError::Parse(excerpt(&err.to_string()))
        } else if let Some(status) = err.status() {
            UpstreamError::from_status(status, &err.to_string())
        } else {
            UpstreamError::Network(excerpt(&err.to_string()))
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            UpstreamError::RateLimited(_)
            | UpstreamError::Timeout
            | UpstreamError::Server { .. }
            | UpstreamError::Network(_) => ErrorClass::Transient,
            UpstreamError::Auth(_)
            | UpstreamError::InvalidRequest(_)
            | UpstreamError::Parse(_)
            | UpstreamError::Unavailable(_) => ErrorClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Classification function handed to the retry layer
pub fn classify(err: &UpstreamError) -> ErrorClass {
    err.class()
}

/// Read a response body and turn non-success statuses into errors.
pub async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::from_status(status, &body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            UpstreamError::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down").class(),
            ErrorClass::Transient
        );
        assert_eq!(
            UpstreamError::from_status(StatusCode::SERVICE_UNAVAILABLE, "").class(),
            ErrorClass::Transient
        );
        assert_eq!(
            UpstreamError::from_status(StatusCode::REQUEST_TIMEOUT, ""),
            UpstreamError::Timeout
        );
        assert_eq!(
            UpstreamError::from_status(StatusCode::UNAUTHORIZED, "").class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            UpstreamError::from_status(StatusCode::BAD_REQUEST, "bad").class(),
            ErrorClass::Permanent
        );
        assert!(matches!(
            UpstreamError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "x"),
            UpstreamError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_error_body_is_scrubbed_and_truncated() {
        let body = format!("access_token=abc123 {}", "x".repeat(1000));
        let err = UpstreamError::from_status(StatusCode::BAD_GATEWAY, &body);
        let msg = err.to_string();
        assert!(!msg.contains("abc123"));
        assert!(msg.len() < 400);
    }
}
