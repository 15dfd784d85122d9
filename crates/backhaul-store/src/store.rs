//! The [`SegmentStore`] contract.
//!
//! A deliberately thin surface over an object store: flat string keys,
//! whole-object reads and writes, unordered listing. The orchestrator
//! never assumes any ordering from [`list`](SegmentStore::list) — the
//! restore planner always re-sorts by the timestamps encoded in the keys.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Metadata for one stored artifact, as returned by listing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoredObject {
    /// Full object key.
    pub key: String,
    /// Store-assigned last-modified time.
    pub last_modified: DateTime<Utc>,
    /// Object size in bytes.
    pub size_bytes: u64,
}

/// Object-store gateway for backup artifacts.
///
/// Writes are idempotent by construction: artifact keys are derived
/// deterministically from their content's capture time, so re-uploading
/// after a failed-but-actually-successful put overwrites with identical
/// bytes and leaves exactly one catalog entry.
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Writes an object, overwriting any existing object at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write does not complete.
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StoreError>;

    /// Reads an object in full.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] (or a backend not-found) if no
    /// object exists at `key`.
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Lists all objects whose key starts with `prefix`.
    ///
    /// No ordering is guaranteed; callers must sort.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on listing failure.
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StoreError>;

    /// Deletes an object. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Verifies the backing container exists and is reachable.
    ///
    /// Provisioning is out of scope; this is a preflight check so a
    /// session fails at start rather than on its first upload.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ContainerUnavailable`] if the container
    /// cannot be reached.
    async fn ensure_container(&self) -> Result<(), StoreError>;
}
