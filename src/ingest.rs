//! Ingestion pipeline: image in, catalogued wardrobe item out.
//!
//! Each image flows through the same five stages: store the bytes under
//! an id-prefixed pathname, ask the oracle to describe the garment,
//! parse the reply into raw attributes, normalize them into a
//! [`WardrobeItem`], and persist the item's fields under its wardrobe
//! key. Images in a batch are processed concurrently but the outcome
//! preserves input order, and one image's failure never touches the
//! others.

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::error::precondition;
use crate::models::{
    fresh_id, wardrobe_key, IngestOutcome, ItemError, ObjectRef, WardrobeItem,
};
use crate::normalize::{build_item, parse_attributes};
use crate::oracle::{ImageInput, Oracle as _};
use crate::store::{MetadataStore as _, ObjectStore as _};
use crate::AppContext;

/// Instruction sent to the oracle alongside each garment image.
pub const ANALYZE_INSTRUCTION: &str = "Analyze this clothing item and provide the following \
attributes: name, category, fabric, pattern, colors, fit, style, sleeves, length, occasions, \
weather. Format your response as key: value pairs, one per line, without any markdown \
formatting. Keep descriptions concise.";

/// One image submitted for ingestion.
#[derive(Debug, Clone)]
pub struct UploadImage {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Ingest a batch of images. Images are processed concurrently; the
/// outcome lists successful items and per-image errors in input order.
pub async fn ingest(ctx: &AppContext, images: Vec<UploadImage>) -> Result<IngestOutcome> {
    if images.is_empty() {
        return Err(precondition("no images provided"));
    }

    let mut handles = Vec::with_capacity(images.len());
    for image in images {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            let filename = image.filename.clone();
            (filename, ingest_one(&ctx, image).await)
        }));
    }

    let mut outcome = IngestOutcome::default();
    for handle in handles {
        let (filename, result) = handle.await.context("ingestion task panicked")?;
        match result {
            Ok(item) => {
                info!(id = %item.id, name = %item.name, "ingested item");
                outcome.items.push(item);
            }
            Err(e) => {
                warn!(filename = %filename, error = %format!("{e:#}"), "failed to ingest image");
                outcome.errors.push(ItemError {
                    filename,
                    message: format!("{e:#}"),
                });
            }
        }
    }
    Ok(outcome)
}

/// Run the full pipeline for one fresh upload.
async fn ingest_one(ctx: &AppContext, image: UploadImage) -> Result<WardrobeItem> {
    let object_ref = ObjectRef {
        id: fresh_id(),
        filename: image.filename.clone(),
    };
    let stored = ctx
        .objects
        .put(&object_ref.pathname(), &image.bytes, &image.content_type)
        .await?;

    let input = ImageInput::Inline {
        bytes: image.bytes,
        content_type: image.content_type,
    };
    enrich_and_persist(ctx, &object_ref, &stored.url, &input).await
}

/// Run the analysis stages for an object already in the object store.
/// Used by reconciliation, which sends the stored URL instead of bytes.
pub async fn ingest_object(ctx: &AppContext, pathname: &str, url: &str) -> Result<WardrobeItem> {
    let object_ref = ObjectRef::parse(pathname)
        .with_context(|| format!("unrecognized object pathname: {}", pathname))?;
    let input = ImageInput::Url(url.to_string());
    enrich_and_persist(ctx, &object_ref, url, &input).await
}

async fn enrich_and_persist(
    ctx: &AppContext,
    object_ref: &ObjectRef,
    url: &str,
    input: &ImageInput,
) -> Result<WardrobeItem> {
    let analysis = ctx
        .oracle
        .analyze_image(input, ANALYZE_INSTRUCTION)
        .await?;
    let attributes = parse_attributes(&analysis)
        .with_context(|| format!("unusable analysis for '{}'", object_ref.filename))?;
    let item = build_item(object_ref, url, &attributes);

    let written = ctx
        .metadata
        .set_fields(&wardrobe_key(&item.id), &item.to_fields())
        .await?;
    if written == 0 {
        bail!("metadata store wrote no fields for item {}", item.id);
    }
    Ok(item)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::error::Precondition;
    use crate::oracle::ScriptedOracle;
    use crate::store::memory::{InMemoryMetadataStore, InMemoryObjectStore};

    #[tokio::test]
    async fn empty_batch_is_a_precondition_error() {
        let ctx = AppContext::new(
            Config::default(),
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryMetadataStore::new()),
            Arc::new(ScriptedOracle::new()),
        );
        let err = ingest(&ctx, Vec::new()).await.unwrap_err();
        assert!(err.downcast_ref::<Precondition>().is_some());
    }
}
