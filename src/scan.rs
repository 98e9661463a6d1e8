//! Exhaustive cursor-based key scanner.
//!
//! Walks every key matching a pattern with the metadata store's cursor
//! scan, resolves each key's value according to its reported kind, and
//! isolates per-key failures so one bad key never hides the rest. The
//! scan is strictly sequential: each step's cursor comes from the
//! previous reply, and the walk ends when the store re-emits the initial
//! cursor or the iteration cap trips.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::warn;

use crate::config::ScanConfig;
use crate::models::{WardrobeItem, WARDROBE_PREFIX};
use crate::store::{MetadataStore, ScoredMember, ValueKind, SCAN_CURSOR_START};

/// A key's resolved value, flattened to one of the shapes the store can
/// hold.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ScannedValue {
    Record(crate::store::FieldMap),
    List(Vec<String>),
    Set(Vec<String>),
    SortedSet(Vec<ScoredMember>),
    Scalar(Option<String>),
    /// The store reported a kind this scanner has no reader for.
    Unsupported(String),
}

/// One scanned key: either its resolved value or the reason resolution
/// failed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanEntry {
    Resolved { key: String, value: ScannedValue },
    Failed { key: String, message: String },
}

impl ScanEntry {
    pub fn key(&self) -> &str {
        match self {
            ScanEntry::Resolved { key, .. } => key,
            ScanEntry::Failed { key, .. } => key,
        }
    }
}

/// Everything a scan produced. `complete` is false when the iteration
/// cap stopped the walk before the store signalled the end.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub entries: Vec<ScanEntry>,
    pub complete: bool,
}

/// Walk all keys matching `pattern` and resolve each one's value.
pub async fn scan_all(
    store: &Arc<dyn MetadataStore>,
    pattern: &str,
    config: &ScanConfig,
) -> Result<ScanOutcome> {
    let mut entries = Vec::new();
    let mut cursor = SCAN_CURSOR_START;
    let mut complete = false;

    for _ in 0..config.max_iterations {
        let (next, keys) = store.scan(cursor, pattern, config.page_size).await?;
        for key in keys {
            match resolve_value(store, &key).await {
                Ok(value) => entries.push(ScanEntry::Resolved { key, value }),
                Err(e) => {
                    warn!(key = %key, error = %format!("{e:#}"), "failed to resolve key");
                    entries.push(ScanEntry::Failed {
                        key,
                        message: format!("{e:#}"),
                    });
                }
            }
        }
        cursor = next;
        if cursor == SCAN_CURSOR_START {
            complete = true;
            break;
        }
    }

    if !complete {
        warn!(
            pattern = %pattern,
            max_iterations = config.max_iterations,
            "scan stopped at iteration cap; results are partial"
        );
    }
    Ok(ScanOutcome { entries, complete })
}

async fn resolve_value(store: &Arc<dyn MetadataStore>, key: &str) -> Result<ScannedValue> {
    Ok(match store.type_of(key).await? {
        ValueKind::Record => ScannedValue::Record(store.get_fields(key).await?),
        ValueKind::List => ScannedValue::List(store.list_range(key).await?),
        ValueKind::Set => ScannedValue::Set(store.set_members(key).await?),
        ValueKind::SortedSet => ScannedValue::SortedSet(store.sorted_set_range(key).await?),
        ValueKind::Scalar => ScannedValue::Scalar(store.get_scalar(key).await?),
        // A key can expire between the scan step and resolution.
        ValueKind::Missing => ScannedValue::Scalar(None),
        ValueKind::Other(name) => ScannedValue::Unsupported(name),
    })
}

/// All wardrobe items currently in the metadata store, in key order as
/// produced by the scan. Keys that resolve to something other than a
/// record are skipped.
pub async fn load_inventory(
    store: &Arc<dyn MetadataStore>,
    config: &ScanConfig,
) -> Result<Vec<WardrobeItem>> {
    let pattern = format!("{}*", WARDROBE_PREFIX);
    let outcome = scan_all(store, &pattern, config).await?;
    Ok(outcome
        .entries
        .into_iter()
        .filter_map(|entry| match entry {
            ScanEntry::Resolved {
                value: ScannedValue::Record(fields),
                ..
            } => WardrobeItem::from_fields(&fields),
            _ => None,
        })
        .collect())
}
