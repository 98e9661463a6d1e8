//! Storage abstractions for the wardrobe service.
//!
//! Two independently-failing external stores back the system:
//!
//! - [`ObjectStore`] — durable blob storage addressed by an opaque
//!   pathname, returning a retrievable URL per stored object.
//! - [`MetadataStore`] — a key-value store where each key maps to a
//!   multi-field record, with full key enumeration and cursor-based
//!   incremental scanning.
//!
//! Both are consumed through narrow traits so the pipeline, scanner, and
//! reconciliation engine never depend on a concrete backend. HTTP-backed
//! clients live in [`blob_http`] and [`kv_http`]; in-memory doubles for
//! tests live in [`memory`]. Implementations must be `Send + Sync` to
//! work with the async runtime.

pub mod blob_http;
pub mod kv_http;
pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A flat string-to-string record, the metadata store's native shape.
///
/// `BTreeMap` keeps field iteration deterministic for command encoding
/// and tests.
pub type FieldMap = BTreeMap<String, String>;

/// The initial (and terminal) scan cursor value.
///
/// A scan starts here; the store returning this value again signals that
/// enumeration is complete.
pub const SCAN_CURSOR_START: u64 = 0;

/// One object currently held by the object store.
#[derive(Debug, Clone, Serialize)]
pub struct StoredObject {
    /// Opaque pathname the object was stored under.
    pub pathname: String,
    /// Retrievable URL for the object's content.
    pub url: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME content type.
    pub content_type: String,
    /// When the object was stored.
    pub uploaded_at: DateTime<Utc>,
}

/// The container kind a metadata key resolves to.
///
/// Models the store's runtime value types as a closed tagged set so the
/// scanner resolves them explicitly instead of inferring per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    /// Multi-field record (hash).
    Record,
    /// Ordered list of strings.
    List,
    /// Unordered set of strings.
    Set,
    /// Ordered set with per-member scores.
    SortedSet,
    /// Single scalar string.
    Scalar,
    /// The key does not exist.
    Missing,
    /// A container kind this system does not read.
    Other(String),
}

impl ValueKind {
    /// Map the store's wire-level type name onto the closed kind set.
    pub fn from_type_name(name: &str) -> ValueKind {
        match name {
            "hash" => ValueKind::Record,
            "list" => ValueKind::List,
            "set" => ValueKind::Set,
            "zset" => ValueKind::SortedSet,
            "string" => ValueKind::Scalar,
            "none" => ValueKind::Missing,
            other => ValueKind::Other(other.to_string()),
        }
    }
}

/// A member of an ordered set together with its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

/// Durable content storage addressed by an opaque pathname.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store raw bytes under `pathname` and return the stored object,
    /// including its retrievable URL.
    async fn put(&self, pathname: &str, bytes: &[u8], content_type: &str)
        -> Result<StoredObject>;

    /// List every object currently in the store.
    async fn list(&self) -> Result<Vec<StoredObject>>;

    /// Delete the object behind a retrievable URL.
    async fn delete(&self, url: &str) -> Result<()>;
}

/// Key-value metadata storage with records, container readers, and
/// cursor-based scanning.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Write a record's fields under `key`. Returns the number of fields
    /// newly written; zero signals a no-op write.
    async fn set_fields(&self, key: &str, fields: &FieldMap) -> Result<u64>;

    /// Read all fields of the record at `key`. An absent key yields an
    /// empty map.
    async fn get_fields(&self, key: &str) -> Result<FieldMap>;

    /// Delete `key` entirely. Returns the number of keys removed (0 or 1).
    async fn delete_key(&self, key: &str) -> Result<u64>;

    /// Enumerate every key matching a glob-style pattern.
    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// One incremental scan step: return up to roughly `limit` keys
    /// matching `pattern`, plus the cursor for the next call.
    /// [`SCAN_CURSOR_START`] as the returned cursor means done.
    async fn scan(&self, cursor: u64, pattern: &str, limit: u64) -> Result<(u64, Vec<String>)>;

    /// The container kind stored at `key`.
    async fn type_of(&self, key: &str) -> Result<ValueKind>;

    /// Read an entire list value.
    async fn list_range(&self, key: &str) -> Result<Vec<String>>;

    /// Read all members of a set value.
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Read an entire ordered set with scores.
    async fn sorted_set_range(&self, key: &str) -> Result<Vec<ScoredMember>>;

    /// Read a scalar value, if present.
    async fn get_scalar(&self, key: &str) -> Result<Option<String>>;
}

/// Match a key against the store's glob-style pattern subset used by this
/// system: a literal prefix followed by `*`, or a literal key.
pub(crate) fn key_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_kind_maps_wire_names() {
        assert_eq!(ValueKind::from_type_name("hash"), ValueKind::Record);
        assert_eq!(ValueKind::from_type_name("zset"), ValueKind::SortedSet);
        assert_eq!(ValueKind::from_type_name("none"), ValueKind::Missing);
        assert_eq!(
            ValueKind::from_type_name("stream"),
            ValueKind::Other("stream".to_string())
        );
    }

    #[test]
    fn pattern_matching_covers_prefix_and_literal() {
        assert!(key_matches("wardrobe:*", "wardrobe:abc"));
        assert!(!key_matches("wardrobe:*", "closet:abc"));
        assert!(key_matches("exact", "exact"));
        assert!(!key_matches("exact", "exactly"));
    }
}
