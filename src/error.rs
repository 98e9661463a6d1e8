//! Error taxonomy for the wardrobe service.
//!
//! Most functions return `anyhow::Result` and attach context the usual way.
//! The types here exist for the failure classes the boundary must tell
//! apart — the HTTP layer and CLI downcast through `anyhow::Error` to map
//! them to status codes:
//!
//! | Type | Meaning | HTTP mapping |
//! |------|---------|--------------|
//! | [`Precondition`] | missing required input or configuration | 400 |
//! | [`NotFound`] | a referenced item or object does not exist | 404 |
//! | [`ServiceUnavailable`] | an external store or the oracle failed | 502 |
//! | [`PartialDelete`] | dual-write deletion removed only one half | 500 (distinct code) |
//!
//! Per-item failures inside an ingestion batch are not errors in this
//! sense: they are collected into the batch outcome and never abort it.

use thiserror::Error;

/// A required input or configuration value is missing or invalid.
///
/// Fails the whole operation immediately (4xx-equivalent).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct Precondition(pub String);

/// The referenced item, key, or object does not exist.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct NotFound(pub String);

/// An external collaborator (object store, metadata store, or oracle)
/// could not be reached or returned a failure response.
///
/// Surfaced with the underlying message attached; never retried
/// automatically.
#[derive(Debug, Error)]
#[error("{service} unavailable: {message}")]
pub struct ServiceUnavailable {
    /// Which collaborator failed (`"object store"`, `"metadata store"`, `"oracle"`).
    pub service: &'static str,
    /// The underlying error message.
    pub message: String,
}

/// A dual-write deletion removed the metadata record but failed to remove
/// the backing object (or vice versa).
///
/// Surfaced distinctly from full failure so the caller knows the system
/// may now be in a half-deleted state. No two-phase-commit guarantee is
/// made; the remaining half is named for manual remediation.
#[derive(Debug, Error)]
#[error(
    "item {id} partially deleted: metadata record removed but object '{pathname}' remains: {message}"
)]
pub struct PartialDelete {
    /// The wardrobe item id being deleted.
    pub id: String,
    /// Pathname of the object that may still exist.
    pub pathname: String,
    /// The underlying error from the failed half.
    pub message: String,
}

/// Build a precondition error as an `anyhow::Error`.
pub fn precondition(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(Precondition(message.into()))
}

/// Build a not-found error as an `anyhow::Error`.
pub fn not_found(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(NotFound(message.into()))
}

/// Build a service-unavailable error as an `anyhow::Error`.
pub fn service_unavailable(
    service: &'static str,
    message: impl Into<String>,
) -> anyhow::Error {
    anyhow::Error::new(ServiceUnavailable {
        service,
        message: message.into(),
    })
}
