//! HTTP object-store client.
//!
//! Talks to a Vercel-Blob-style REST API: `PUT /{pathname}` stores bytes
//! and returns a JSON body with the retrievable URL, `GET /?limit=...`
//! lists objects with cursor pagination, and `POST /delete` removes
//! objects by URL.
//!
//! # Credentials
//!
//! The read-write token is read from the environment variable named in
//! the configuration (default `BLOB_READ_WRITE_TOKEN`) when the client is
//! constructed. A custom `endpoint` supports self-hosted or emulated
//! stores in development.
//!
//! # Pagination
//!
//! Large stores are listed page by page; the response's `cursor` is fed
//! back until `hasMore` is false.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::ObjectStoreConfig;
use crate::error::service_unavailable;

use super::{ObjectStore, StoredObject};

const LIST_PAGE_LIMIT: u32 = 1000;

/// HTTP-backed [`ObjectStore`] implementation.
pub struct BlobStoreClient {
    endpoint: String,
    token: String,
    client: reqwest::Client,
}

impl BlobStoreClient {
    /// Construct a client from configuration, reading the token from the
    /// configured environment variable.
    pub fn from_config(config: &ObjectStoreConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .with_context(|| format!("{} environment variable not set", config.token_env))?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        })
    }
}

#[derive(Deserialize)]
struct PutResponse {
    url: String,
    #[serde(default)]
    pathname: Option<String>,
    #[serde(rename = "contentType", default)]
    content_type: Option<String>,
}

#[derive(Deserialize)]
struct ListResponse {
    blobs: Vec<BlobEntry>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(rename = "hasMore", default)]
    has_more: bool,
}

#[derive(Deserialize)]
struct BlobEntry {
    url: String,
    pathname: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "uploadedAt", default)]
    uploaded_at: Option<String>,
    #[serde(rename = "contentType", default)]
    content_type: Option<String>,
}

impl BlobEntry {
    fn into_stored(self) -> StoredObject {
        let uploaded_at = self
            .uploaded_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        StoredObject {
            pathname: self.pathname,
            url: self.url,
            size: self.size,
            content_type: self.content_type.unwrap_or_default(),
            uploaded_at,
        }
    }
}

#[async_trait]
impl ObjectStore for BlobStoreClient {
    async fn put(
        &self,
        pathname: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StoredObject> {
        let url = format!("{}/{}", self.endpoint, pathname);
        let resp = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .header("x-api-version", "7")
            .header("x-content-type", content_type)
            // The pathname already carries a high-entropy id prefix.
            .header("x-add-random-suffix", "0")
            .query(&[("access", "public")])
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| service_unavailable("object store", e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(service_unavailable(
                "object store",
                format!("put '{}' failed (HTTP {}): {}", pathname, status, body),
            ));
        }

        let put: PutResponse = resp
            .json()
            .await
            .map_err(|e| service_unavailable("object store", e.to_string()))?;
        Ok(StoredObject {
            pathname: put.pathname.unwrap_or_else(|| pathname.to_string()),
            url: put.url,
            size: bytes.len() as u64,
            content_type: put
                .content_type
                .unwrap_or_else(|| content_type.to_string()),
            uploaded_at: Utc::now(),
        })
    }

    async fn list(&self) -> Result<Vec<StoredObject>> {
        let mut objects = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("limit".to_string(), LIST_PAGE_LIMIT.to_string())];
            if let Some(ref c) = cursor {
                query.push(("cursor".to_string(), c.clone()));
            }

            let resp = self
                .client
                .get(&self.endpoint)
                .bearer_auth(&self.token)
                .query(&query)
                .send()
                .await
                .map_err(|e| service_unavailable("object store", e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(service_unavailable(
                    "object store",
                    format!("list failed (HTTP {}): {}", status, body),
                ));
            }

            let page: ListResponse = resp
                .json()
                .await
                .map_err(|e| service_unavailable("object store", e.to_string()))?;
            objects.extend(page.blobs.into_iter().map(BlobEntry::into_stored));

            if page.has_more {
                cursor = page.cursor;
            } else {
                break;
            }
        }

        Ok(objects)
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/delete", self.endpoint))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "urls": [url] }))
            .send()
            .await
            .map_err(|e| service_unavailable("object store", e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(service_unavailable(
                "object store",
                format!("delete '{}' failed (HTTP {}): {}", url, status, body),
            ));
        }
        Ok(())
    }
}
