//! Reconciliation between the object store and the metadata store.
//!
//! The object store is treated as the source of truth: every stored
//! object should have a metadata record, and reconciliation re-runs the
//! analysis stages for objects that lost theirs. The repair is
//! deliberately one-way — metadata records whose object is gone are left
//! alone, surfaced by the scanner rather than silently dropped.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use tracing::{info, warn};

use crate::error::{not_found, PartialDelete};
use crate::ingest::ingest_object;
use crate::models::{
    wardrobe_key, ItemError, ObjectRef, PurgeReport, SyncReport, WARDROBE_PREFIX,
};
use crate::scan::scan_all;
use crate::store::{MetadataStore as _, ObjectStore as _};
use crate::AppContext;

/// Re-analyze every stored object that has no metadata record.
///
/// Objects are processed sequentially in pathname order; one object's
/// failure is counted and the walk continues.
pub async fn reconcile(ctx: &AppContext) -> Result<SyncReport> {
    let objects = ctx.objects.list().await?;
    let pattern = format!("{}*", WARDROBE_PREFIX);
    let outcome = scan_all(&ctx.metadata, &pattern, &ctx.config.scan).await?;

    // A capped scan under-reports the metadata id space, and re-ingesting
    // an item the scan merely missed would rewrite its existing record.
    // Fall back to the full key listing so the diff is computed against
    // the complete keyspace.
    let known: HashSet<String> = if outcome.complete {
        outcome
            .entries
            .iter()
            .filter_map(|e| e.key().strip_prefix(WARDROBE_PREFIX))
            .map(str::to_string)
            .collect()
    } else {
        warn!("scan stopped at its iteration cap; listing keys directly");
        ctx.metadata
            .list_keys(&pattern)
            .await?
            .iter()
            .filter_map(|k| k.strip_prefix(WARDROBE_PREFIX))
            .map(str::to_string)
            .collect()
    };

    let mut missing = BTreeMap::new();
    for object in &objects {
        let Some(object_ref) = ObjectRef::parse(&object.pathname) else {
            warn!(pathname = %object.pathname, "skipping object with unrecognized pathname");
            continue;
        };
        if !known.contains(&object_ref.id) {
            missing.insert(object.pathname.clone(), object);
        }
    }

    let mut report = SyncReport::default();
    for (pathname, object) in missing {
        match ingest_object(ctx, &pathname, &object.url).await {
            Ok(item) => {
                info!(id = %item.id, pathname = %pathname, "reconciled item");
                report.processed += 1;
            }
            Err(e) => {
                warn!(pathname = %pathname, error = %format!("{e:#}"), "failed to reconcile object");
                report.failed.push(ItemError {
                    filename: pathname,
                    message: format!("{e:#}"),
                });
            }
        }
    }
    Ok(report)
}

/// Remove an item from both stores: metadata record first, then the
/// stored object. A metadata delete that succeeds followed by an object
/// delete that fails leaves an orphaned object, which reconciliation
/// will re-ingest; that state is reported as a distinct error.
pub async fn delete_item(ctx: &AppContext, id: &str) -> Result<()> {
    let key = wardrobe_key(id);
    let fields = ctx.metadata.get_fields(&key).await?;
    if fields.is_empty() {
        return Err(not_found(format!("no wardrobe item with id {}", id)));
    }
    let pathname = fields.get("pathname").cloned().unwrap_or_default();
    let url = fields.get("url").cloned().unwrap_or_default();

    ctx.metadata.delete_key(&key).await?;

    if !url.is_empty() {
        if let Err(e) = ctx.objects.delete(&url).await {
            return Err(PartialDelete {
                id: id.to_string(),
                pathname,
                message: format!("{e:#}"),
            }
            .into());
        }
    }
    info!(id = %id, "deleted item");
    Ok(())
}

/// Delete every stored object and every wardrobe metadata record.
/// Destructive and unconditional; callers confirm before invoking.
/// Individual delete failures are collected so the purge empties
/// everything it can. Metadata keys outside the wardrobe prefix are left
/// alone — the store may be shared.
pub async fn purge_all(ctx: &AppContext) -> Result<PurgeReport> {
    let mut report = PurgeReport::default();

    for object in ctx.objects.list().await? {
        match ctx.objects.delete(&object.url).await {
            Ok(()) => report.objects_deleted += 1,
            Err(e) => report.objects_failed.push(ItemError {
                filename: object.pathname,
                message: format!("{e:#}"),
            }),
        }
    }

    for key in ctx
        .metadata
        .list_keys(&format!("{}*", WARDROBE_PREFIX))
        .await?
    {
        match ctx.metadata.delete_key(&key).await {
            Ok(n) => report.records_deleted += n,
            Err(e) => report.records_failed.push(ItemError {
                filename: key,
                message: format!("{e:#}"),
            }),
        }
    }

    info!(
        objects = report.objects_deleted,
        records = report.records_deleted,
        "purged both stores"
    );
    Ok(report)
}
