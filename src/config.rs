use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::handlers::ClientSettings;
use crate::services::image_encoding::MediaTypeLabel;
use crate::services::openai::{DEFAULT_BASE_URL, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL};
use crate::services::OpenAIConfig;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Process-wide settings. The API key is deliberately absent: it belongs
/// to each session and is collected by the UI surface.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub media_type_label: MediaTypeLabel,
    pub request_timeout: Option<Duration>,
    pub bind_addr: String,
}

impl AppConfig {
    /// Reads the process environment; `main` has already merged `.env` into it
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let max_output_tokens = match get("MAX_OUTPUT_TOKENS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("MAX_OUTPUT_TOKENS must be a positive integer, got '{}'", raw))?,
            None => DEFAULT_MAX_OUTPUT_TOKENS,
        };

        let media_type_label = match get("IMAGE_MEDIA_TYPE") {
            Some(raw) => match MediaTypeLabel::from_setting(&raw) {
                Some(label) => label,
                None => anyhow::bail!("IMAGE_MEDIA_TYPE must be 'declared' or 'jpeg', got '{}'", raw),
            },
            None => MediaTypeLabel::default(),
        };

        let request_timeout = match get("REQUEST_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(raw.trim().parse::<u64>().with_context(
                || format!("REQUEST_TIMEOUT_SECS must be a whole number of seconds, got '{}'", raw),
            )?)),
            None => None,
        };

        Ok(Self {
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_output_tokens,
            media_type_label,
            request_timeout,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }

    pub fn openai(&self) -> OpenAIConfig {
        OpenAIConfig {
            base_url: self.base_url.clone(),
            request_timeout: self.request_timeout,
        }
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            model: self.model.clone(),
            max_output_tokens: self.max_output_tokens,
            media_type_label: self.media_type_label,
        }
    }
}
