//! HTTP metadata-store client.
//!
//! Talks to a Redis-REST-style API (Upstash/Vercel KV): each command is a
//! JSON array POSTed to the endpoint with a bearer token, and the reply
//! wraps the result in `{"result": ...}`. Only the commands the wardrobe
//! system needs are implemented: record reads/writes (`HSET`/`HGETALL`),
//! key management (`DEL`/`KEYS`/`SCAN`/`TYPE`), and the container readers
//! the exhaustive scanner resolves values with (`LRANGE`, `SMEMBERS`,
//! `ZRANGE ... WITHSCORES`, `GET`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::MetadataStoreConfig;
use crate::error::service_unavailable;

use super::{FieldMap, MetadataStore, ScoredMember, ValueKind};

/// HTTP-backed [`MetadataStore`] implementation.
pub struct KvStoreClient {
    endpoint: String,
    token: String,
    client: reqwest::Client,
}

impl KvStoreClient {
    /// Construct a client from configuration. The endpoint comes from the
    /// config file or, when unset, from the configured environment
    /// variable; the token always comes from the environment.
    pub fn from_config(config: &MetadataStoreConfig) -> Result<Self> {
        let endpoint = match &config.endpoint {
            Some(e) => e.clone(),
            None => std::env::var(&config.endpoint_env).with_context(|| {
                format!(
                    "metadata.endpoint not configured and {} not set",
                    config.endpoint_env
                )
            })?,
        };
        let token = std::env::var(&config.token_env)
            .with_context(|| format!("{} environment variable not set", config.token_env))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        })
    }

    /// Execute one command and unwrap the `{"result": ...}` envelope.
    async fn command(&self, command: &[Value]) -> Result<Value> {
        let name = command
            .first()
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string();

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await
            .map_err(|e| service_unavailable("metadata store", e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(service_unavailable(
                "metadata store",
                format!("{} failed (HTTP {}): {}", name, status, body),
            ));
        }

        let mut envelope: Value = resp
            .json()
            .await
            .map_err(|e| service_unavailable("metadata store", e.to_string()))?;
        if let Some(error) = envelope.get("error").and_then(|e| e.as_str()) {
            return Err(service_unavailable(
                "metadata store",
                format!("{}: {}", name, error),
            ));
        }
        Ok(envelope
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}

fn as_string_array(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// SCAN replies carry the next cursor as either a string or a number. A
/// cursor that parses as neither is an error: treating it as the initial
/// cursor would silently end the walk with keys unvisited.
fn parse_scan_cursor(value: &Value) -> Result<u64> {
    match value {
        Value::String(s) => s
            .parse::<u64>()
            .with_context(|| format!("unparseable SCAN cursor: {:?}", s)),
        Value::Number(n) => n
            .as_u64()
            .with_context(|| format!("unparseable SCAN cursor: {}", n)),
        other => anyhow::bail!("unexpected SCAN cursor shape: {}", other),
    }
}

/// Decode the flat `[field, value, field, value, ...]` array shape used
/// by `HGETALL` and `ZRANGE ... WITHSCORES` replies.
fn as_pairs(value: &Value) -> Vec<(String, String)> {
    let flat = as_string_array(value);
    flat.chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect()
}

#[async_trait]
impl MetadataStore for KvStoreClient {
    async fn set_fields(&self, key: &str, fields: &FieldMap) -> Result<u64> {
        let mut command = vec![json!("HSET"), json!(key)];
        for (field, value) in fields {
            command.push(json!(field));
            command.push(json!(value));
        }
        let result = self.command(&command).await?;
        Ok(result.as_u64().unwrap_or(0))
    }

    async fn get_fields(&self, key: &str) -> Result<FieldMap> {
        let result = self.command(&[json!("HGETALL"), json!(key)]).await?;
        // A flat field/value array; an object form is accepted too since
        // some gateways pre-fold it.
        if let Some(map) = result.as_object() {
            return Ok(map
                .iter()
                .map(|(k, v)| {
                    let v = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                    (k.clone(), v)
                })
                .collect());
        }
        Ok(as_pairs(&result).into_iter().collect())
    }

    async fn delete_key(&self, key: &str) -> Result<u64> {
        let result = self.command(&[json!("DEL"), json!(key)]).await?;
        Ok(result.as_u64().unwrap_or(0))
    }

    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let result = self.command(&[json!("KEYS"), json!(pattern)]).await?;
        Ok(as_string_array(&result))
    }

    async fn scan(&self, cursor: u64, pattern: &str, limit: u64) -> Result<(u64, Vec<String>)> {
        let result = self
            .command(&[
                json!("SCAN"),
                json!(cursor.to_string()),
                json!("MATCH"),
                json!(pattern),
                json!("COUNT"),
                json!(limit.to_string()),
            ])
            .await?;

        let parts = result
            .as_array()
            .filter(|a| a.len() >= 2)
            .ok_or_else(|| anyhow::anyhow!("unexpected SCAN reply shape: {}", result))?;
        let next = parse_scan_cursor(&parts[0])?;
        Ok((next, as_string_array(&parts[1])))
    }

    async fn type_of(&self, key: &str) -> Result<ValueKind> {
        let result = self.command(&[json!("TYPE"), json!(key)]).await?;
        Ok(ValueKind::from_type_name(result.as_str().unwrap_or("none")))
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>> {
        let result = self
            .command(&[json!("LRANGE"), json!(key), json!("0"), json!("-1")])
            .await?;
        Ok(as_string_array(&result))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let result = self.command(&[json!("SMEMBERS"), json!(key)]).await?;
        Ok(as_string_array(&result))
    }

    async fn sorted_set_range(&self, key: &str) -> Result<Vec<ScoredMember>> {
        let result = self
            .command(&[
                json!("ZRANGE"),
                json!(key),
                json!("0"),
                json!("-1"),
                json!("WITHSCORES"),
            ])
            .await?;
        Ok(as_pairs(&result)
            .into_iter()
            .map(|(member, score)| ScoredMember {
                member,
                score: score.parse().unwrap_or(0.0),
            })
            .collect())
    }

    async fn get_scalar(&self, key: &str) -> Result<Option<String>> {
        let result = self.command(&[json!("GET"), json!(key)]).await?;
        Ok(result.as_str().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_decoding_folds_flat_arrays() {
        let value = json!(["name", "Shirt", "category", "Tops"]);
        let pairs = as_pairs(&value);
        assert_eq!(
            pairs,
            vec![
                ("name".to_string(), "Shirt".to_string()),
                ("category".to_string(), "Tops".to_string())
            ]
        );
    }

    #[test]
    fn pair_decoding_ignores_dangling_entries() {
        let value = json!(["lonely"]);
        assert!(as_pairs(&value).is_empty());
    }

    #[test]
    fn cursor_parsing_accepts_strings_and_numbers() {
        assert_eq!(parse_scan_cursor(&json!("17")).unwrap(), 17);
        assert_eq!(parse_scan_cursor(&json!(0)).unwrap(), 0);
    }

    #[test]
    fn cursor_parsing_rejects_garbage() {
        assert!(parse_scan_cursor(&json!("not-a-cursor")).is_err());
        assert!(parse_scan_cursor(&json!(-3)).is_err());
        assert!(parse_scan_cursor(&json!(["0"])).is_err());
    }
}
