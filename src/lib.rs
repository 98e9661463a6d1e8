//! # Closet Keeper
//!
//! A digital-wardrobe engine: garment photos in, a searchable catalogue
//! and outfit advice out.
//!
//! Uploaded images are stored in an object store, described by a vision
//! oracle, normalized into a fixed category taxonomy, and persisted as
//! flat records in a metadata store. A cursor-based scanner enumerates
//! the catalogue exhaustively, a reconciliation pass repairs metadata
//! for orphaned images, and a recommender turns the inventory plus the
//! user's mood, weather, and occasion into a concrete outfit.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌──────────────┐   ┌───────────┐
//! │ Images  │──▶│   Pipeline    │──▶│  Stores   │
//! │ (HTTP/  │   │ store+oracle │   │ blob + kv │
//! │  CLI)   │   │ +normalize   │   └─────┬─────┘
//! └─────────┘   └──────────────┘         │
//!                      ┌────────────────┤
//!                      ▼                ▼
//!                ┌──────────┐     ┌──────────┐
//!                │   CLI    │     │   HTTP   │
//!                │ (closet) │     │  (JSON)  │
//!                └──────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! closet init                       # write a starter config
//! closet ingest photo1.jpg photo2.jpg
//! closet list --category Tops
//! closet recommend --mood relaxed --weather rainy --occasion work
//! closet sync                       # repair metadata for orphaned images
//! closet serve                      # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`normalize`] | Category taxonomy and attribute parsing |
//! | [`store`] | Object/metadata store traits and clients |
//! | [`oracle`] | Vision/language oracle abstraction |
//! | [`ingest`] | Image ingestion pipeline |
//! | [`scan`] | Exhaustive cursor-based key scanner |
//! | [`sync`] | Store reconciliation, deletion, purge |
//! | [`recommend`] | Outfit recommendation |
//! | [`server`] | JSON HTTP server |

use std::sync::Arc;

use anyhow::Result;

pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod oracle;
pub mod recommend;
pub mod scan;
pub mod server;
pub mod store;
pub mod sync;

use crate::config::Config;
use crate::oracle::{OpenAiOracle, Oracle};
use crate::store::blob_http::BlobStoreClient;
use crate::store::kv_http::KvStoreClient;
use crate::store::{MetadataStore, ObjectStore};

/// Shared application context: configuration plus the three external
/// collaborators behind trait objects. Cloning is cheap; every clone
/// shares the same clients.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub objects: Arc<dyn ObjectStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub oracle: Arc<dyn Oracle>,
}

impl AppContext {
    /// Build a context with explicit collaborators. Tests use this with
    /// in-memory stores and a scripted oracle.
    pub fn new(
        config: Config,
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        oracle: Arc<dyn Oracle>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            objects,
            metadata,
            oracle,
        }
    }

    /// Build the production context: HTTP store clients and the OpenAI
    /// oracle, with credentials read from the environment.
    pub fn from_config(config: Config) -> Result<Self> {
        let objects = Arc::new(BlobStoreClient::from_config(&config.objects)?);
        let metadata = Arc::new(KvStoreClient::from_config(&config.metadata)?);
        let oracle = Arc::new(OpenAiOracle::from_config(&config.oracle)?);
        Ok(Self {
            config: Arc::new(config),
            objects,
            metadata,
            oracle,
        })
    }
}
