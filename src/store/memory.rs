//! In-memory store implementations for tests.
//!
//! Both doubles use `std::sync::RwLock` over `BTreeMap` so enumeration
//! order is deterministic. The metadata double implements real cursor
//! semantics: each open scan remembers the last key it handed out, so
//! keys present for the whole scan are returned exactly once even when
//! new keys are inserted between scan calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use super::{
    key_matches, FieldMap, MetadataStore, ObjectStore, ScoredMember, StoredObject, ValueKind,
    SCAN_CURSOR_START,
};

struct ObjectEntry {
    bytes: Vec<u8>,
    meta: StoredObject,
}

/// In-memory [`ObjectStore`] double. URLs take the form
/// `memory://{pathname}`.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, ObjectEntry>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes stored under `pathname`, for test assertions.
    pub fn bytes_of(&self, pathname: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .unwrap()
            .get(pathname)
            .map(|e| e.bytes.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().unwrap().is_empty()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(
        &self,
        pathname: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StoredObject> {
        let meta = StoredObject {
            pathname: pathname.to_string(),
            url: format!("memory://{}", pathname),
            size: bytes.len() as u64,
            content_type: content_type.to_string(),
            uploaded_at: Utc::now(),
        };
        self.objects.write().unwrap().insert(
            pathname.to_string(),
            ObjectEntry {
                bytes: bytes.to_vec(),
                meta: meta.clone(),
            },
        );
        Ok(meta)
    }

    async fn list(&self) -> Result<Vec<StoredObject>> {
        Ok(self
            .objects
            .read()
            .unwrap()
            .values()
            .map(|e| e.meta.clone())
            .collect())
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let pathname = match url.strip_prefix("memory://") {
            Some(p) => p.to_string(),
            None => bail!("unknown object url: {}", url),
        };
        if self.objects.write().unwrap().remove(&pathname).is_none() {
            bail!("object not found: {}", pathname);
        }
        Ok(())
    }
}

#[derive(Clone)]
enum StoredValue {
    Record(FieldMap),
    List(Vec<String>),
    Set(Vec<String>),
    SortedSet(Vec<ScoredMember>),
    Scalar(String),
}

impl StoredValue {
    fn kind(&self) -> ValueKind {
        match self {
            StoredValue::Record(_) => ValueKind::Record,
            StoredValue::List(_) => ValueKind::List,
            StoredValue::Set(_) => ValueKind::Set,
            StoredValue::SortedSet(_) => ValueKind::SortedSet,
            StoredValue::Scalar(_) => ValueKind::Scalar,
        }
    }
}

/// In-memory [`MetadataStore`] double with cursor-correct scanning.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    entries: RwLock<BTreeMap<String, StoredValue>>,
    /// Open scan positions: cursor id → last key already returned.
    scans: RwLock<HashMap<u64, String>>,
    next_cursor: AtomicU64,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            scans: RwLock::new(HashMap::new()),
            next_cursor: AtomicU64::new(1),
        }
    }

    // Container seeding for scanner tests; the pipeline itself only
    // writes records.

    pub fn insert_list(&self, key: &str, values: Vec<String>) {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), StoredValue::List(values));
    }

    pub fn insert_set(&self, key: &str, mut members: Vec<String>) {
        members.sort();
        members.dedup();
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), StoredValue::Set(members));
    }

    pub fn insert_sorted_set(&self, key: &str, members: Vec<ScoredMember>) {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), StoredValue::SortedSet(members));
    }

    pub fn insert_scalar(&self, key: &str, value: &str) {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), StoredValue::Scalar(value.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn set_fields(&self, key: &str, fields: &FieldMap) -> Result<u64> {
        let mut entries = self.entries.write().unwrap();
        let record = match entries
            .entry(key.to_string())
            .or_insert_with(|| StoredValue::Record(FieldMap::new()))
        {
            StoredValue::Record(map) => map,
            _ => bail!("key {} holds a non-record value", key),
        };
        let mut written = 0;
        for (field, value) in fields {
            if record.insert(field.clone(), value.clone()).is_none() {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn get_fields(&self, key: &str) -> Result<FieldMap> {
        match self.entries.read().unwrap().get(key) {
            Some(StoredValue::Record(map)) => Ok(map.clone()),
            Some(_) => bail!("key {} holds a non-record value", key),
            None => Ok(FieldMap::new()),
        }
    }

    async fn delete_key(&self, key: &str) -> Result<u64> {
        Ok(self.entries.write().unwrap().remove(key).is_some() as u64)
    }

    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .keys()
            .filter(|k| key_matches(pattern, k))
            .cloned()
            .collect())
    }

    async fn scan(&self, cursor: u64, pattern: &str, limit: u64) -> Result<(u64, Vec<String>)> {
        let resume_after = if cursor == SCAN_CURSOR_START {
            None
        } else {
            match self.scans.write().unwrap().remove(&cursor) {
                Some(key) => Some(key),
                // Unknown cursor: the scan it belonged to is gone.
                None => return Ok((SCAN_CURSOR_START, Vec::new())),
            }
        };

        let entries = self.entries.read().unwrap();
        let mut page = Vec::new();
        let mut more_after_page = false;
        for key in entries.keys() {
            if !key_matches(pattern, key) {
                continue;
            }
            if let Some(ref after) = resume_after {
                if key.as_str() <= after.as_str() {
                    continue;
                }
            }
            if page.len() as u64 >= limit.max(1) {
                more_after_page = true;
                break;
            }
            page.push(key.clone());
        }

        let next = if more_after_page {
            let id = self.next_cursor.fetch_add(1, Ordering::Relaxed);
            if let Some(last) = page.last() {
                self.scans.write().unwrap().insert(id, last.clone());
            }
            id
        } else {
            SCAN_CURSOR_START
        };
        Ok((next, page))
    }

    async fn type_of(&self, key: &str) -> Result<ValueKind> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .get(key)
            .map(StoredValue::kind)
            .unwrap_or(ValueKind::Missing))
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>> {
        match self.entries.read().unwrap().get(key) {
            Some(StoredValue::List(values)) => Ok(values.clone()),
            Some(_) => bail!("key {} holds a non-list value", key),
            None => Ok(Vec::new()),
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        match self.entries.read().unwrap().get(key) {
            Some(StoredValue::Set(members)) => Ok(members.clone()),
            Some(_) => bail!("key {} holds a non-set value", key),
            None => Ok(Vec::new()),
        }
    }

    async fn sorted_set_range(&self, key: &str) -> Result<Vec<ScoredMember>> {
        match self.entries.read().unwrap().get(key) {
            Some(StoredValue::SortedSet(members)) => Ok(members.clone()),
            Some(_) => bail!("key {} holds a non-sorted-set value", key),
            None => Ok(Vec::new()),
        }
    }

    async fn get_scalar(&self, key: &str) -> Result<Option<String>> {
        match self.entries.read().unwrap().get(key) {
            Some(StoredValue::Scalar(value)) => Ok(Some(value.clone())),
            Some(_) => bail!("key {} holds a non-scalar value", key),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn object_store_put_list_delete() {
        let store = InMemoryObjectStore::new();
        let stored = store.put("id1-a.jpg", b"bytes", "image/jpeg").await.unwrap();
        assert_eq!(stored.url, "memory://id1-a.jpg");
        assert_eq!(store.list().await.unwrap().len(), 1);
        store.delete(&stored.url).await.unwrap();
        assert!(store.is_empty());
        assert!(store.delete(&stored.url).await.is_err());
    }

    #[tokio::test]
    async fn set_fields_reports_newly_written_count() {
        let store = InMemoryMetadataStore::new();
        let mut fields = FieldMap::new();
        fields.insert("id".into(), "x".into());
        fields.insert("name".into(), "Shirt".into());
        assert_eq!(store.set_fields("wardrobe:x", &fields).await.unwrap(), 2);
        // Re-writing the same fields is a no-op signal.
        assert_eq!(store.set_fields("wardrobe:x", &fields).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn scan_pages_without_duplicates() {
        let store = InMemoryMetadataStore::new();
        for i in 0..7 {
            let mut fields = FieldMap::new();
            fields.insert("id".into(), format!("{}", i));
            store
                .set_fields(&format!("wardrobe:{:02}", i), &fields)
                .await
                .unwrap();
        }
        let mut seen = Vec::new();
        let mut cursor = SCAN_CURSOR_START;
        loop {
            let (next, keys) = store.scan(cursor, "wardrobe:*", 3).await.unwrap();
            seen.extend(keys);
            cursor = next;
            if cursor == SCAN_CURSOR_START {
                break;
            }
        }
        assert_eq!(seen.len(), 7);
        let mut deduped = seen.clone();
        deduped.dedup();
        assert_eq!(deduped, seen);
    }

    #[tokio::test]
    async fn type_of_reflects_container_kind() {
        let store = InMemoryMetadataStore::new();
        store.insert_scalar("s", "v");
        store.insert_list("l", vec!["a".into()]);
        assert_eq!(store.type_of("s").await.unwrap(), ValueKind::Scalar);
        assert_eq!(store.type_of("l").await.unwrap(), ValueKind::List);
        assert_eq!(store.type_of("nope").await.unwrap(), ValueKind::Missing);
    }
}
