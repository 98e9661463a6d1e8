//! End-to-end pipeline tests over in-memory stores and a scripted oracle.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use closet_keeper::config::{Config, ScanConfig};
use closet_keeper::error::{NotFound, PartialDelete, Precondition};
use closet_keeper::ingest::{ingest, UploadImage};
use closet_keeper::models::{wardrobe_key, Category};
use closet_keeper::oracle::ScriptedOracle;
use closet_keeper::recommend::{recommend, OutfitRequest};
use closet_keeper::scan::load_inventory;
use closet_keeper::store::memory::{InMemoryMetadataStore, InMemoryObjectStore};
use closet_keeper::store::{MetadataStore, ObjectStore, StoredObject};
use closet_keeper::sync::{delete_item, purge_all, reconcile};
use closet_keeper::AppContext;

/// Object store whose deletes always fail, for partial-delete scenarios.
struct BrokenDeleteStore {
    inner: InMemoryObjectStore,
}

#[async_trait]
impl ObjectStore for BrokenDeleteStore {
    async fn put(&self, pathname: &str, bytes: &[u8], content_type: &str) -> Result<StoredObject> {
        self.inner.put(pathname, bytes, content_type).await
    }

    async fn list(&self) -> Result<Vec<StoredObject>> {
        self.inner.list().await
    }

    async fn delete(&self, _url: &str) -> Result<()> {
        anyhow::bail!("object store is read-only today")
    }
}

const JACKET_ANALYSIS: &str = "name: Jean Jacket\n\
category: denim jacket\n\
fabric: denim\n\
pattern: solid\n\
colors: blue, navy\n\
fit: regular\n\
style: casual\n\
sleeves: long\n\
length: hip\n\
occasions: casual, weekend\n\
weather: mild, cool";

const SNEAKER_ANALYSIS: &str = "name: White Sneakers\n\
category: sneaker\n\
fabric: canvas\n\
colors: white\n\
weather: any";

const JSON_JACKET_ANALYSIS: &str = r#"{"category":"denim jacket","name":"Jean Jacket"}"#;

fn harness(oracle: ScriptedOracle) -> (AppContext, Arc<InMemoryObjectStore>) {
    harness_with_config(oracle, Config::default())
}

fn harness_with_config(
    oracle: ScriptedOracle,
    config: Config,
) -> (AppContext, Arc<InMemoryObjectStore>) {
    let objects = Arc::new(InMemoryObjectStore::new());
    let ctx = AppContext::new(
        config,
        objects.clone(),
        Arc::new(InMemoryMetadataStore::new()),
        Arc::new(oracle),
    );
    (ctx, objects)
}

fn upload(filename: &str, marker: &str) -> UploadImage {
    UploadImage {
        filename: filename.to_string(),
        content_type: "image/jpeg".to_string(),
        bytes: format!("fake image bytes: {}", marker).into_bytes(),
    }
}

#[tokio::test]
async fn ingests_a_batch_end_to_end() {
    let oracle = ScriptedOracle::new()
        .analysis("jacket", JACKET_ANALYSIS)
        .analysis("sneaker", SNEAKER_ANALYSIS);
    let (ctx, objects) = harness(oracle);

    let outcome = ingest(
        &ctx,
        vec![upload("jacket.jpg", "jacket"), upload("sneaker.jpg", "sneaker")],
    )
    .await
    .unwrap();

    assert_eq!(outcome.items.len(), 2);
    assert!(outcome.errors.is_empty());

    // Input order is preserved even though processing is concurrent.
    let jacket = &outcome.items[0];
    assert_eq!(jacket.name, "Jean Jacket");
    assert_eq!(jacket.category, Category::Outerwear);
    assert_eq!(jacket.colors, vec!["blue", "navy"]);
    assert_eq!(outcome.items[1].category, Category::Footwear);

    // Both stores hold the results.
    assert_eq!(objects.len(), 2);
    let fields = ctx.metadata.get_fields(&wardrobe_key(&jacket.id)).await.unwrap();
    assert_eq!(fields.get("name").map(String::as_str), Some("Jean Jacket"));
    assert_eq!(fields.get("pathname").map(String::as_str), Some(jacket.pathname.as_str()));

    // The inventory reads them back.
    let items = load_inventory(&ctx.metadata, &ctx.config.scan).await.unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn json_shaped_analysis_works_too() {
    let oracle = ScriptedOracle::new().analysis("jacket", JSON_JACKET_ANALYSIS);
    let (ctx, _) = harness(oracle);

    let outcome = ingest(&ctx, vec![upload("jacket.jpg", "jacket")]).await.unwrap();
    assert_eq!(outcome.items.len(), 1);
    assert_eq!(outcome.items[0].name, "Jean Jacket");
    assert_eq!(outcome.items[0].category, Category::Outerwear);
}

#[tokio::test]
async fn batch_items_get_distinct_ids() {
    let oracle = ScriptedOracle::new().analysis("jacket", JACKET_ANALYSIS);
    let (ctx, _) = harness(oracle);

    let outcome = ingest(
        &ctx,
        vec![upload("a-jacket.jpg", "jacket"), upload("b-jacket.jpg", "jacket")],
    )
    .await
    .unwrap();
    assert_eq!(outcome.items.len(), 2);
    assert!(!outcome.items[0].id.is_empty());
    assert_ne!(outcome.items[0].id, outcome.items[1].id);
}

#[tokio::test]
async fn scan_sees_keys_present_for_its_whole_run_exactly_once() {
    use closet_keeper::store::{FieldMap, SCAN_CURSOR_START};

    let store = InMemoryMetadataStore::new();
    let mut fields = FieldMap::new();
    fields.insert("id".into(), "x".into());
    for i in 0..6 {
        store
            .set_fields(&format!("wardrobe:{:02}", i), &fields)
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    let (cursor, keys) = store.scan(SCAN_CURSOR_START, "wardrobe:*", 2).await.unwrap();
    seen.extend(keys);
    // A key inserted mid-scan may or may not appear; the original six must
    // each appear exactly once.
    store.set_fields("wardrobe:99", &fields).await.unwrap();

    let mut cursor = cursor;
    while cursor != SCAN_CURSOR_START {
        let (next, keys) = store.scan(cursor, "wardrobe:*", 2).await.unwrap();
        seen.extend(keys);
        cursor = next;
    }

    for i in 0..6 {
        let key = format!("wardrobe:{:02}", i);
        assert_eq!(seen.iter().filter(|k| **k == key).count(), 1, "{}", key);
    }
}

#[tokio::test]
async fn one_bad_image_never_sinks_the_batch() {
    let oracle = ScriptedOracle::new().analysis("jacket", JACKET_ANALYSIS);
    let (ctx, _) = harness(oracle);

    let outcome = ingest(
        &ctx,
        vec![upload("jacket.jpg", "jacket"), upload("mystery.jpg", "mystery")],
    )
    .await
    .unwrap();

    assert_eq!(outcome.items.len() + outcome.errors.len(), 2);
    assert_eq!(outcome.items[0].name, "Jean Jacket");
    assert_eq!(outcome.errors[0].filename, "mystery.jpg");
}

#[tokio::test]
async fn empty_batch_is_rejected_up_front() {
    let (ctx, _) = harness(ScriptedOracle::new());
    let err = ingest(&ctx, Vec::new()).await.unwrap_err();
    assert!(err.downcast_ref::<Precondition>().is_some());
}

#[tokio::test]
async fn reconcile_repairs_orphaned_objects_then_settles() {
    let oracle = ScriptedOracle::new()
        .analysis("jacket", JACKET_ANALYSIS)
        .analysis("sneaker", SNEAKER_ANALYSIS);
    let (ctx, _) = harness(oracle);

    let outcome = ingest(
        &ctx,
        vec![upload("jacket.jpg", "jacket"), upload("sneaker.jpg", "sneaker")],
    )
    .await
    .unwrap();

    // Lose all metadata, keep the objects.
    for item in &outcome.items {
        ctx.metadata.delete_key(&wardrobe_key(&item.id)).await.unwrap();
    }
    assert!(load_inventory(&ctx.metadata, &ctx.config.scan).await.unwrap().is_empty());

    let report = reconcile(&ctx).await.unwrap();
    assert_eq!(report.processed, 2);
    assert!(report.failed.is_empty());

    let items = load_inventory(&ctx.metadata, &ctx.config.scan).await.unwrap();
    assert_eq!(items.len(), 2);
    // Rebuilt ids come from the pathname, so they match the originals.
    let mut rebuilt: Vec<_> = items.iter().map(|i| i.id.clone()).collect();
    let mut original: Vec<_> = outcome.items.iter().map(|i| i.id.clone()).collect();
    rebuilt.sort();
    original.sort();
    assert_eq!(rebuilt, original);

    // A second pass finds nothing to repair.
    let again = reconcile(&ctx).await.unwrap();
    assert_eq!(again.processed, 0);
    assert!(again.failed.is_empty());
}

#[tokio::test]
async fn reconcile_trusts_no_capped_scan() {
    // A scan budget too small for the keyspace must not make fully
    // catalogued items look orphaned: that would re-run paid analysis and
    // rewrite existing records.
    let oracle = ScriptedOracle::new().analysis("jacket", JACKET_ANALYSIS);
    let mut config = Config::default();
    config.scan = ScanConfig {
        page_size: 1,
        max_iterations: 1,
    };
    let (ctx, _) = harness_with_config(oracle, config);

    let outcome = ingest(
        &ctx,
        vec![
            upload("jacket0.jpg", "jacket"),
            upload("jacket1.jpg", "jacket"),
            upload("jacket2.jpg", "jacket"),
        ],
    )
    .await
    .unwrap();
    assert_eq!(outcome.items.len(), 3);

    let report = reconcile(&ctx).await.unwrap();
    assert_eq!(report.processed, 0);
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn reconcile_counts_objects_it_cannot_repair() {
    let oracle = ScriptedOracle::new().analysis("jacket", JACKET_ANALYSIS);
    let (ctx, objects) = harness(oracle);

    objects.put("aaa111-jacket.jpg", b"x", "image/jpeg").await.unwrap();
    objects.put("bbb222-unknown.jpg", b"x", "image/jpeg").await.unwrap();

    let report = reconcile(&ctx).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].filename, "bbb222-unknown.jpg");
}

#[tokio::test]
async fn delete_removes_the_item_from_both_stores() {
    let oracle = ScriptedOracle::new().analysis("jacket", JACKET_ANALYSIS);
    let (ctx, objects) = harness(oracle);

    let outcome = ingest(&ctx, vec![upload("jacket.jpg", "jacket")]).await.unwrap();
    let id = outcome.items[0].id.clone();

    delete_item(&ctx, &id).await.unwrap();

    assert!(objects.is_empty());
    assert!(load_inventory(&ctx.metadata, &ctx.config.scan).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_of_a_missing_item_is_not_found() {
    let (ctx, _) = harness(ScriptedOracle::new());
    let err = delete_item(&ctx, "nope").await.unwrap_err();
    assert!(err.downcast_ref::<NotFound>().is_some());
}

#[tokio::test]
async fn failed_object_delete_is_reported_as_partial() {
    let oracle = ScriptedOracle::new().analysis("jacket", JACKET_ANALYSIS);
    let ctx = AppContext::new(
        Config::default(),
        Arc::new(BrokenDeleteStore {
            inner: InMemoryObjectStore::new(),
        }),
        Arc::new(InMemoryMetadataStore::new()),
        Arc::new(oracle),
    );

    let outcome = ingest(&ctx, vec![upload("jacket.jpg", "jacket")]).await.unwrap();
    let id = outcome.items[0].id.clone();

    let err = delete_item(&ctx, &id).await.unwrap_err();
    let partial = err.downcast_ref::<PartialDelete>().expect("partial delete");
    assert_eq!(partial.id, id);

    // The metadata record is gone; only the object is orphaned.
    let fields = ctx.metadata.get_fields(&wardrobe_key(&id)).await.unwrap();
    assert!(fields.is_empty());
}

#[tokio::test]
async fn recommend_matches_named_items_from_the_inventory() {
    let oracle = ScriptedOracle::new()
        .analysis("jacket", JACKET_ANALYSIS)
        .analysis("sneaker", SNEAKER_ANALYSIS)
        .completion(
            "Pair the JEAN JACKET with dark trousers and finish with the white sneakers.",
        );
    let (ctx, _) = harness(oracle);

    ingest(
        &ctx,
        vec![upload("jacket.jpg", "jacket"), upload("sneaker.jpg", "sneaker")],
    )
    .await
    .unwrap();

    let result = recommend(
        &ctx,
        &OutfitRequest {
            mood: "relaxed".into(),
            weather: "mild".into(),
            occasion: "weekend".into(),
        },
    )
    .await
    .unwrap();

    let names: Vec<_> = result.outfit.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["Jean Jacket", "White Sneakers"]);
}

#[tokio::test]
async fn recommend_with_an_empty_wardrobe_is_not_found() {
    let (ctx, _) = harness(ScriptedOracle::new());
    let err = recommend(
        &ctx,
        &OutfitRequest {
            mood: "happy".into(),
            weather: "sunny".into(),
            occasion: "picnic".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(err.downcast_ref::<NotFound>().is_some());
}

#[tokio::test]
async fn purge_empties_both_stores() {
    let oracle = ScriptedOracle::new()
        .analysis("jacket", JACKET_ANALYSIS)
        .analysis("sneaker", SNEAKER_ANALYSIS);
    let (ctx, objects) = harness(oracle);

    ingest(
        &ctx,
        vec![upload("jacket.jpg", "jacket"), upload("sneaker.jpg", "sneaker")],
    )
    .await
    .unwrap();

    let report = purge_all(&ctx).await.unwrap();
    assert_eq!(report.objects_deleted, 2);
    assert_eq!(report.records_deleted, 2);
    assert!(report.objects_failed.is_empty());
    assert!(report.records_failed.is_empty());

    assert!(objects.is_empty());
    assert!(load_inventory(&ctx.metadata, &ctx.config.scan).await.unwrap().is_empty());
}

#[tokio::test]
async fn purge_leaves_non_wardrobe_keys_alone() {
    let oracle = ScriptedOracle::new().analysis("jacket", JACKET_ANALYSIS);
    let metadata = Arc::new(InMemoryMetadataStore::new());
    metadata.insert_scalar("app:schema_version", "3");
    let ctx = AppContext::new(
        Config::default(),
        Arc::new(InMemoryObjectStore::new()),
        metadata.clone(),
        Arc::new(oracle),
    );

    ingest(&ctx, vec![upload("jacket.jpg", "jacket")]).await.unwrap();

    let report = purge_all(&ctx).await.unwrap();
    assert_eq!(report.records_deleted, 1);

    // Only the wardrobe keyspace is purged; the store may be shared.
    assert_eq!(
        metadata.get_scalar("app:schema_version").await.unwrap(),
        Some("3".to_string())
    );
}
