//! TOML configuration parsing and validation.
//!
//! Every section has serde defaults so a minimal (even empty) file is a
//! valid configuration; credentials never live in the file — each client
//! reads its token from the environment variable named here at
//! construction time.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub objects: ObjectStoreConfig,
    #[serde(default)]
    pub metadata: MetadataStoreConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7878".to_string()
}

/// Object-store client settings. The write token is read from the
/// environment variable named by `token_env`.
#[derive(Debug, Deserialize, Clone)]
pub struct ObjectStoreConfig {
    #[serde(default = "default_blob_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_blob_token_env")]
    pub token_env: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_blob_endpoint(),
            token_env: default_blob_token_env(),
        }
    }
}

fn default_blob_endpoint() -> String {
    "https://blob.vercel-storage.com".to_string()
}
fn default_blob_token_env() -> String {
    "BLOB_READ_WRITE_TOKEN".to_string()
}

/// Metadata-store client settings. When `endpoint` is unset it falls back
/// to the environment variable named by `endpoint_env`; the bearer token
/// always comes from `token_env`.
#[derive(Debug, Deserialize, Clone)]
pub struct MetadataStoreConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_kv_endpoint_env")]
    pub endpoint_env: String,
    #[serde(default = "default_kv_token_env")]
    pub token_env: String,
}

impl Default for MetadataStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            endpoint_env: default_kv_endpoint_env(),
            token_env: default_kv_token_env(),
        }
    }
}

fn default_kv_endpoint_env() -> String {
    "KV_REST_API_URL".to_string()
}
fn default_kv_token_env() -> String {
    "KV_REST_API_TOKEN".to_string()
}

/// Vision/language oracle settings. The API key is read from the
/// environment variable named by `api_key_env`.
#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_analysis_max_tokens")]
    pub analysis_max_tokens: u32,
    #[serde(default = "default_recommend_max_tokens")]
    pub recommend_max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            vision_model: default_vision_model(),
            text_model: default_text_model(),
            analysis_max_tokens: default_analysis_max_tokens(),
            recommend_max_tokens: default_recommend_max_tokens(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_vision_model() -> String {
    "gpt-4o".to_string()
}
fn default_text_model() -> String {
    "gpt-4".to_string()
}
fn default_analysis_max_tokens() -> u32 {
    500
}
fn default_recommend_max_tokens() -> u32 {
    300
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Exhaustive-scanner settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Approximate keys requested per scan step.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Safeguard against a store that never re-emits the initial cursor:
    /// after this many steps the scan stops and flags its result partial.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_page_size() -> u64 {
    100
}
fn default_max_iterations() -> usize {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.scan.page_size == 0 {
        anyhow::bail!("scan.page_size must be > 0");
    }
    if config.scan.max_iterations == 0 {
        anyhow::bail!("scan.max_iterations must be >= 1");
    }
    if config.oracle.analysis_max_tokens == 0 || config.oracle.recommend_max_tokens == 0 {
        anyhow::bail!("oracle token budgets must be > 0");
    }
    if config.oracle.timeout_secs == 0 {
        anyhow::bail!("oracle.timeout_secs must be > 0");
    }

    Ok(config)
}

/// Starter configuration written by `closet init`.
pub const STARTER_CONFIG: &str = r#"[server]
bind = "127.0.0.1:7878"

[objects]
endpoint = "https://blob.vercel-storage.com"
token_env = "BLOB_READ_WRITE_TOKEN"

[metadata]
# endpoint = "https://your-kv-instance.example.com"
endpoint_env = "KV_REST_API_URL"
token_env = "KV_REST_API_TOKEN"

[oracle]
vision_model = "gpt-4o"
text_model = "gpt-4"
analysis_max_tokens = 500
recommend_max_tokens = 300
timeout_secs = 60
api_key_env = "OPENAI_API_KEY"

[scan]
page_size = 100
max_iterations = 10
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:7878");
        assert_eq!(config.scan.page_size, 100);
        assert_eq!(config.oracle.vision_model, "gpt-4o");
    }

    #[test]
    fn starter_config_parses_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(STARTER_CONFIG.as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.metadata.token_env, "KV_REST_API_TOKEN");
    }

    #[test]
    fn rejects_zero_page_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[scan]\npage_size = 0\n").unwrap();
        assert!(load_config(file.path()).is_err());
    }
}
