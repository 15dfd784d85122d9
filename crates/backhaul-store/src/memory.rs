//! In-memory segment store.
//!
//! Backs tests and local dry runs. Overwrite semantics match a real
//! object store: a second `put` to the same key replaces the entry and
//! refreshes its last-modified time, leaving a single catalog entry.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::store::{SegmentStore, StoredObject};

#[derive(Debug, Clone)]
struct Entry {
    bytes: Bytes,
    last_modified: DateTime<Utc>,
}

/// In-memory [`SegmentStore`] implementation.
#[derive(Debug, Default)]
pub struct MemorySegmentStore {
    objects: Mutex<BTreeMap<String, Entry>>,
    fail_puts: Mutex<u32>,
}

impl MemorySegmentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` puts fail, for exercising retry paths.
    pub fn fail_next_puts(&self, n: u32) {
        *self.fail_puts.lock() = n;
    }

    /// Returns the number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    /// Returns `true` if the store holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// Returns all keys in lexicographic order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    /// Inserts an object with an explicit last-modified time.
    ///
    /// Test helper for building catalogs with known timestamps.
    pub fn insert_at(&self, key: impl Into<String>, bytes: Bytes, last_modified: DateTime<Utc>) {
        self.objects.lock().insert(
            key.into(),
            Entry {
                bytes,
                last_modified,
            },
        );
    }
}

#[async_trait]
impl SegmentStore for MemorySegmentStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StoreError> {
        {
            let mut remaining = self.fail_puts.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::ContainerUnavailable(
                    "memory".to_string(),
                    "injected put failure".to_string(),
                ));
            }
        }
        self.objects.lock().insert(
            key.to_string(),
            Entry {
                bytes,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.objects
            .lock()
            .get(key)
            .map(|e| e.bytes.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StoreError> {
        Ok(self
            .objects
            .lock()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| StoredObject {
                key: k.clone(),
                last_modified: e.last_modified,
                size_bytes: e.bytes.len() as u64,
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.lock().remove(key);
        Ok(())
    }

    async fn ensure_container(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
