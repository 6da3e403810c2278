//! Model credentials and connection settings.
//!
//! Uses the `secrecy` crate so API keys never end up in logs or debug
//! output.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;

use crate::error::{AttributionError, Result};

/// A secret string that won't be logged or displayed.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// Expose the secret value for use.
    ///
    /// Only call this when actually using the secret (e.g., in an API request).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_string())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Settings for the structured-output and vision models.
#[derive(Clone)]
pub struct ModelSettings {
    /// API key (secret)
    pub api_key: SecretString,

    /// API base URL. `None` uses the provider default.
    pub base_url: Option<String>,

    /// Model for extraction and reconciliation.
    ///
    /// Default: gpt-4o.
    pub model: String,

    /// Model for the image-to-text pass.
    ///
    /// Default: same as `model`.
    pub vision_model: String,

    /// Per-request timeout in seconds.
    ///
    /// Default: 60.
    pub request_timeout_secs: u64,

    /// Default: 0.2.
    pub temperature: f32,
}

impl ModelSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key),
            base_url: None,
            model: "gpt-4o".to_string(),
            vision_model: "gpt-4o".to_string(),
            request_timeout_secs: 60,
            temperature: 0.2,
        }
    }

    /// Read settings from the environment.
    ///
    /// - `OPENAI_API_KEY` (required)
    /// - `OPENAI_BASE_URL`
    /// - `ATTRIBUTION_MODEL`
    /// - `ATTRIBUTION_VISION_MODEL`
    /// - `ATTRIBUTION_REQUEST_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AttributionError::Config("OPENAI_API_KEY not set".into()))?;

        let mut settings = Self::new(api_key);
        settings.base_url = lookup("OPENAI_BASE_URL");
        if let Some(model) = lookup("ATTRIBUTION_MODEL") {
            settings.vision_model = model.clone();
            settings.model = model;
        }
        if let Some(model) = lookup("ATTRIBUTION_VISION_MODEL") {
            settings.vision_model = model;
        }
        if let Some(raw) = lookup("ATTRIBUTION_REQUEST_TIMEOUT_SECS") {
            settings.request_timeout_secs = raw.parse().map_err(|_| {
                AttributionError::Config(format!("ATTRIBUTION_REQUEST_TIMEOUT_SECS is not a number: {raw}"))
            })?;
        }
        Ok(settings)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

impl fmt::Debug for ModelSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSettings")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("vision_model", &self.vision_model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}
