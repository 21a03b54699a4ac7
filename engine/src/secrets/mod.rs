pub mod string;

pub use string::SecretString;

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Keychain service name used for every Quill credential
pub const KEYCHAIN_SERVICE: &str = "quill";

/// Credentials the connectors may need
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CredentialKey {
    GeminiApiKey,
    NewsApiKey,
    TavilyApiKey,
    LinkedInAccessToken,
    LinkedInPersonUrn,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 5] = [
        CredentialKey::GeminiApiKey,
        CredentialKey::NewsApiKey,
        CredentialKey::TavilyApiKey,
        CredentialKey::LinkedInAccessToken,
        CredentialKey::LinkedInPersonUrn,
    ];

    /// Environment variable checked first
    pub fn env_var(&self) -> &'static str {
        match self {
            CredentialKey::GeminiApiKey => "GEMINI_API_KEY",
            CredentialKey::NewsApiKey => "NEWS_API_KEY",
            CredentialKey::TavilyApiKey => "TAVILY_API_KEY",
            CredentialKey::LinkedInAccessToken => "LINKEDIN_ACCESS_TOKEN",
            CredentialKey::LinkedInPersonUrn => "LINKEDIN_PERSON_URN",
        }
    }

    /// Entry name in the OS keychain
    pub fn keychain_key(&self) -> &'static str {
        match self {
            CredentialKey::GeminiApiKey => "gemini_api_key",
            CredentialKey::NewsApiKey => "news_api_key",
            CredentialKey::TavilyApiKey => "tavily_api_key",
            CredentialKey::LinkedInAccessToken => "linkedin_access_token",
            CredentialKey::LinkedInPersonUrn => "linkedin_person_urn",
        }
    }
}

/// Resolved connector credentials.
///
/// Each value comes from its environment variable when set, otherwise from the
/// OS keychain (macOS Keychain, Windows Credential Manager, Secret Service on
/// Linux). Lookup never prompts: a scheduled run has nobody to answer, and a
/// missing optional credential simply disables its connector.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    values: BTreeMap<CredentialKey, SecretString>,
}

impl Credentials {
    /// Resolve every known credential from the environment and keychain
    pub fn resolve() -> Self {
        let mut credentials = Self::default();
        for key in CredentialKey::ALL {
            if let Some(value) = lookup_env(key).or_else(|| lookup_keychain(key)) {
                credentials.values.insert(key, value);
            }
        }
        credentials
    }

    /// Builder used by tests and embedders
    pub fn with(mut self, key: CredentialKey, value: impl Into<SecretString>) -> Self {
        self.values.insert(key, value.into());
        self
    }

    pub fn get(&self, key: CredentialKey) -> Option<&SecretString> {
        self.values.get(&key)
    }

    /// Fetch a credential that the caller cannot work without
    pub fn require(&self, key: CredentialKey) -> Result<&SecretString, EngineError> {
        self.get(key).ok_or_else(|| {
            EngineError::Credential(format!(
                "{} (env) or '{}' (keychain)",
                key.env_var(),
                key.keychain_key()
            ))
        })
    }

    pub fn has(&self, key: CredentialKey) -> bool {
        self.values.contains_key(&key)
    }
}

fn lookup_env(key: CredentialKey) -> Option<SecretString> {
    std::env::var(key.env_var())
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

fn lookup_keychain(key: CredentialKey) -> Option<SecretString> {
    let entry = match Entry::new(KEYCHAIN_SERVICE, key.keychain_key()) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::debug!("Keychain unavailable for '{}': {}", key.keychain_key(), e);
            return None;
        }
    };

    match entry.get_password() {
        Ok(secret) if !secret.trim().is_empty() => {
            tracing::debug!("Retrieved '{}' from keychain", key.keychain_key());
            Some(SecretString::new(secret.trim()))
        }
        Ok(_) | Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            tracing::debug!("Keychain lookup failed for '{}': {}", key.keychain_key(), e);
            None
        }
    }
}

/// Regex patterns for detecting secrets in free text.
/// Compiled once and reused.
static SECRET_PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

fn get_secret_patterns() -> &'static Vec<(Regex, &'static str)> {
    SECRET_PATTERNS.get_or_init(|| {
        let specs: [(&str, &'static str); 5] = [
            (r#"Bearer\s+[^\s"',]+"#, "Bearer [REDACTED]"),
            // key=..., "api_key": "...", access_token=...
            (
                r#"(?i)\b(api_key|apikey|access_token|token|key)(["']?\s*[:=]\s*["']?)[^\s"'&,}]+"#,
                "${1}${2}[REDACTED]",
            ),
            (r"AIza[0-9A-Za-z\-_]{35}", "[REDACTED]"),
            (r"tvly-[0-9A-Za-z\-_]{8,}", "[REDACTED]"),
            (r"urn:li:person:[0-9A-Za-z\-_]+", "urn:li:person:[REDACTED]"),
        ];

        specs
            .iter()
            .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
                Ok(re) => Some((re, *replacement)),
                Err(e) => {
                    tracing::error!("Invalid secret pattern {}: {}", pattern, e);
                    None
                }
            })
            .collect()
    })
}

/// Scrubs secrets from text.
///
/// Detected patterns:
/// - Bearer tokens
/// - `key=`, `api_key`, `token` and `access_token` assignments (query strings and JSON)
/// - Google API keys (AIza...)
/// - Tavily keys (tvly-...)
/// - LinkedIn person URNs
///
/// # Examples
/// ```
/// use quill_engine::secrets::scrub;
///
/// let scrubbed = scrub("GET /models/x:generateContent?key=abc123");
/// assert_eq!(scrubbed, "GET /models/x:generateContent?key=[REDACTED]");
/// ```
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();

    for (pattern, replacement) in get_secret_patterns() {
        result = pattern.replace_all(&result, *replacement).into_owned();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrub_bearer_token() {
        assert_eq!(
            scrub("Authorization: Bearer AQX-abc.def_123"),
            "Authorization: Bearer [REDACTED]"
        );
    }

    #[test]
    fn test_scrub_json_api_key() {
        let scrubbed = scrub(r#"{"api_key": "tvly-secretsecret", "query": "agents"}"#);
        assert!(!scrubbed.contains("secretsecret"));
        assert!(scrubbed.contains("agents"));
    }

    #[test]
    fn test_scrub_person_urn() {
        assert_eq!(
            scrub("owner urn:li:person:AbC123 posted"),
            "owner urn:li:person:[REDACTED] posted"
        );
    }

    #[test]
    fn test_scrub_leaves_share_urns() {
        let text = "created urn:li:share:7000000000000000000";
        assert_eq!(scrub(text), text);
    }

    #[test]
    fn test_scrub_google_key() {
        let key = format!("AIza{}", "A".repeat(35));
        assert_eq!(scrub(&format!("using {}", key)), "using [REDACTED]");
    }

    #[test]
    fn test_credentials_builder_and_require() {
        let creds = Credentials::default().with(CredentialKey::GeminiApiKey, "g-key");
        assert!(creds.has(CredentialKey::GeminiApiKey));
        assert_eq!(
            creds
                .require(CredentialKey::GeminiApiKey)
                .unwrap()
                .unsecure(),
            "g-key"
        );

        let err = creds.require(CredentialKey::TavilyApiKey).unwrap_err();
        assert!(err.to_string().contains("TAVILY_API_KEY"));
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let creds = Credentials::default().with(CredentialKey::LinkedInAccessToken, "s3cr3t");
        assert!(!format!("{:?}", creds).contains("s3cr3t"));
    }
}
