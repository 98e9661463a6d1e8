//! Vision/language oracle abstraction and OpenAI-backed implementation.
//!
//! The oracle is an external request/response collaborator: given an
//! image it returns free-form or semi-structured text describing garment
//! attributes, and given a prompt it returns a free-text outfit
//! recommendation. No response schema is guaranteed — callers parse
//! defensively (see [`crate::normalize`]).
//!
//! Failures are surfaced as [`crate::error::ServiceUnavailable`] and are
//! never retried automatically; the only repair path is the explicit
//! reconciliation pass.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde_json::{json, Value};

use crate::config::OracleConfig;
use crate::error::service_unavailable;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// How an image reaches the oracle: inline bytes (encoded as a base64
/// data URL) or a URL the oracle fetches itself. Both are valid transport
/// choices; the ingestion pipeline sends fresh uploads inline while
/// reconciliation points at the already-stored object's URL.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Inline {
        bytes: Vec<u8>,
        content_type: String,
    },
    Url(String),
}

impl ImageInput {
    /// The URL form the oracle's vision API receives.
    pub fn to_image_url(&self) -> String {
        match self {
            ImageInput::Inline {
                bytes,
                content_type,
            } => format!(
                "data:{};base64,{}",
                content_type,
                BASE64_STANDARD.encode(bytes)
            ),
            ImageInput::Url(url) => url.clone(),
        }
    }
}

/// The external vision/language model, consumed as a request/response
/// oracle.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Describe a garment image. Returns the oracle's raw text.
    async fn analyze_image(&self, image: &ImageInput, instruction: &str) -> Result<String>;

    /// Complete a free-text prompt (used for outfit recommendations).
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// OpenAI chat-completions client implementing [`Oracle`].
pub struct OpenAiOracle {
    config: OracleConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiOracle {
    /// Construct a client from configuration, reading the API key from
    /// the configured environment variable.
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} environment variable not set", config.api_key_env))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config: config.clone(),
            api_key,
            client,
        })
    }

    async fn chat(&self, body: Value) -> Result<String> {
        let resp = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| service_unavailable("oracle", e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(service_unavailable(
                "oracle",
                format!("HTTP {}: {}", status, body),
            ));
        }

        let reply: Value = resp
            .json()
            .await
            .map_err(|e| service_unavailable("oracle", e.to_string()))?;
        let content = reply["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .filter(|c| !c.trim().is_empty());
        content.ok_or_else(|| anyhow::anyhow!("empty oracle response"))
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn analyze_image(&self, image: &ImageInput, instruction: &str) -> Result<String> {
        let body = json!({
            "model": self.config.vision_model,
            "max_tokens": self.config.analysis_max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": instruction },
                    {
                        "type": "image_url",
                        "image_url": { "url": image.to_image_url(), "detail": "high" }
                    }
                ]
            }]
        });
        self.chat(body).await
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.config.text_model,
            "max_tokens": self.config.recommend_max_tokens,
            "temperature": 0.7,
            "messages": [{ "role": "user", "content": prompt }]
        });
        self.chat(body).await
    }
}

/// Scripted [`Oracle`] for tests, shipped alongside the real client the
/// same way the in-memory stores live next to the HTTP ones.
///
/// Analysis replies are selected by matching registered markers against
/// the image payload (inline bytes decoded as UTF-8, or the URL);
/// `complete` always returns the scripted text.
#[derive(Default)]
pub struct ScriptedOracle {
    analyses: Vec<(String, String)>,
    completion: String,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `reply` for any image payload containing `marker`.
    pub fn analysis(mut self, marker: impl Into<String>, reply: impl Into<String>) -> Self {
        self.analyses.push((marker.into(), reply.into()));
        self
    }

    /// Set the text every `complete` call returns.
    pub fn completion(mut self, text: impl Into<String>) -> Self {
        self.completion = text.into();
        self
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn analyze_image(&self, image: &ImageInput, _instruction: &str) -> Result<String> {
        let payload = match image {
            ImageInput::Inline { bytes, .. } => String::from_utf8_lossy(bytes).to_string(),
            ImageInput::Url(url) => url.clone(),
        };
        for (marker, reply) in &self.analyses {
            if payload.contains(marker.as_str()) {
                return Ok(reply.clone());
            }
        }
        anyhow::bail!("no scripted analysis for payload: {}", payload)
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.completion.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_images_become_data_urls() {
        let image = ImageInput::Inline {
            bytes: b"abc".to_vec(),
            content_type: "image/png".to_string(),
        };
        assert_eq!(image.to_image_url(), "data:image/png;base64,YWJj");
    }

    #[test]
    fn url_images_pass_through() {
        let image = ImageInput::Url("https://example.com/a.jpg".to_string());
        assert_eq!(image.to_image_url(), "https://example.com/a.jpg");
    }
}
