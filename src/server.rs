//! JSON HTTP server exposing the wardrobe pipeline.
//!
//! # Endpoints
//!
//! | Method   | Path                  | Description                              |
//! |----------|-----------------------|------------------------------------------|
//! | `POST`   | `/api/wardrobe`       | Ingest a multipart batch of images       |
//! | `GET`    | `/api/wardrobe`       | List items, optionally by category       |
//! | `DELETE` | `/api/wardrobe/{id}`  | Remove one item from both stores         |
//! | `POST`   | `/api/sync`           | Reconcile stores (re-ingest orphans)     |
//! | `POST`   | `/api/recommend`      | Generate an outfit recommendation        |
//! | `GET`    | `/api/blob/{id}`      | Redirect to an item's stored image       |
//! | `GET`    | `/api/debug/kv`       | Exhaustive metadata scan                 |
//! | `GET`    | `/api/debug/blob`     | Raw object-store listing                 |
//! | `POST`   | `/api/debug/empty`    | Purge both stores                        |
//! | `GET`    | `/health`             | Health check (returns version)           |
//!
//! # Error Contract
//!
//! Every error response is a flat JSON body:
//!
//! ```json
//! { "error": "no wardrobe item with id 3f2a", "code": "not_found" }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `partial_delete`
//! (500), `upstream_unavailable` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! clients.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::{NotFound, PartialDelete, Precondition, ServiceUnavailable};
use crate::ingest::{ingest, UploadImage};
use crate::models::{ObjectRef, WARDROBE_PREFIX};
use crate::recommend::{recommend, OutfitRequest};
use crate::scan::{load_inventory, scan_all};
use crate::store::ObjectStore as _;
use crate::sync::{delete_item, purge_all, reconcile};
use crate::AppContext;

/// Starts the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(ctx: AppContext) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/wardrobe", post(handle_ingest).get(handle_list))
        .route("/api/wardrobe/{id}", delete(handle_delete))
        .route("/api/sync", post(handle_sync))
        .route("/api/recommend", post(handle_recommend))
        .route("/api/blob/{id}", get(handle_blob_redirect))
        .route("/api/debug/kv", get(handle_debug_kv))
        .route("/api/debug/blob", get(handle_debug_blob))
        .route("/api/debug/empty", post(handle_debug_empty))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(ctx);

    info!(bind = %bind_addr, "wardrobe server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

/// Flat JSON error body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            code: self.code.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

/// Maps domain errors to HTTP responses by their concrete type; anything
/// unrecognized is a 500.
fn classify(err: anyhow::Error) -> AppError {
    if let Some(e) = err.downcast_ref::<Precondition>() {
        return bad_request(e.to_string());
    }
    if let Some(e) = err.downcast_ref::<NotFound>() {
        return not_found_error(e.to_string());
    }
    if let Some(e) = err.downcast_ref::<ServiceUnavailable>() {
        return AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "upstream_unavailable",
            message: e.to_string(),
        };
    }
    if let Some(e) = err.downcast_ref::<PartialDelete>() {
        return AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "partial_delete",
            message: e.to_string(),
        };
    }
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{err:#}"),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/wardrobe ============

/// Handler for `POST /api/wardrobe`.
///
/// Accepts a multipart form whose `images` fields carry the image files.
/// The response reports successful items and per-image errors; a batch
/// with at least one success is still a 200.
async fn handle_ingest(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<Json<crate::models::IngestOutcome>, AppError> {
    let mut images = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some("images") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload.jpg".to_string());
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "image/jpeg".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read '{}': {}", filename, e)))?;
        images.push(UploadImage {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    let outcome = ingest(&ctx, images).await.map_err(classify)?;
    Ok(Json(outcome))
}

// ============ GET /api/wardrobe ============

#[derive(Deserialize)]
struct ListQuery {
    category: Option<String>,
}

/// Handler for `GET /api/wardrobe`.
///
/// Returns every item in the inventory, optionally filtered to one
/// canonical category spelling.
async fn handle_list(
    State(ctx): State<AppContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<crate::models::WardrobeItem>>, AppError> {
    let mut items = load_inventory(&ctx.metadata, &ctx.config.scan)
        .await
        .map_err(classify)?;
    if let Some(category) = query.category {
        items.retain(|item| item.category.as_str() == category);
    }
    Ok(Json(items))
}

// ============ DELETE /api/wardrobe/{id} ============

#[derive(Serialize)]
struct DeleteResponse {
    deleted: String,
}

async fn handle_delete(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    delete_item(&ctx, &id).await.map_err(classify)?;
    Ok(Json(DeleteResponse { deleted: id }))
}

// ============ POST /api/sync ============

async fn handle_sync(
    State(ctx): State<AppContext>,
) -> Result<Json<crate::models::SyncReport>, AppError> {
    let report = reconcile(&ctx).await.map_err(classify)?;
    Ok(Json(report))
}

// ============ POST /api/recommend ============

async fn handle_recommend(
    State(ctx): State<AppContext>,
    Json(request): Json<OutfitRequest>,
) -> Result<Json<crate::recommend::OutfitRecommendation>, AppError> {
    let recommendation = recommend(&ctx, &request).await.map_err(classify)?;
    Ok(Json(recommendation))
}

// ============ GET /api/blob/{id} ============

/// Handler for `GET /api/blob/{id}`.
///
/// Resolves the stored object whose pathname carries the given item id
/// and redirects to its retrievable URL.
async fn handle_blob_redirect(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Redirect, AppError> {
    let objects = ctx.objects.list().await.map_err(classify)?;
    let found = objects
        .into_iter()
        .find(|o| ObjectRef::parse(&o.pathname).is_some_and(|r| r.id == id));
    match found {
        Some(object) => Ok(Redirect::temporary(&object.url)),
        None => Err(not_found_error(format!("no stored image for id {}", id))),
    }
}

// ============ Debug surface ============

/// Handler for `GET /api/debug/kv`: the exhaustive metadata scan with
/// every key's resolved value.
async fn handle_debug_kv(
    State(ctx): State<AppContext>,
) -> Result<Json<crate::scan::ScanOutcome>, AppError> {
    let pattern = format!("{}*", WARDROBE_PREFIX);
    let outcome = scan_all(&ctx.metadata, &pattern, &ctx.config.scan)
        .await
        .map_err(classify)?;
    Ok(Json(outcome))
}

/// Handler for `GET /api/debug/blob`: the raw object-store listing.
async fn handle_debug_blob(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<crate::store::StoredObject>>, AppError> {
    let objects = ctx.objects.list().await.map_err(classify)?;
    Ok(Json(objects))
}

/// Handler for `POST /api/debug/empty`: purge both stores.
async fn handle_debug_empty(
    State(ctx): State<AppContext>,
) -> Result<Json<crate::models::PurgeReport>, AppError> {
    let report = purge_all(&ctx).await.map_err(classify)?;
    Ok(Json(report))
}
