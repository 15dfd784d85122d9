//! Shipper counters.
//!
//! Lock-free counters shared between a running shipper task and its
//! handle. Monotonic except for `last_shipped_unix_ms`, which tracks the
//! most recent successful upload.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one shipper instance.
#[derive(Debug, Default)]
pub struct ShipperMetrics {
    /// Segments uploaded successfully.
    pub segments_shipped: AtomicU64,
    /// Payload bytes uploaded successfully.
    pub bytes_shipped: AtomicU64,
    /// Captures that found no new log entries.
    pub empty_captures: AtomicU64,
    /// Failed capture attempts.
    pub capture_errors: AtomicU64,
    /// Failed upload attempts.
    pub upload_errors: AtomicU64,
    /// Unix milliseconds of the last successful upload (0 = never).
    pub last_shipped_unix_ms: AtomicU64,
}

impl ShipperMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one successful upload.
    pub fn record_shipped(&self, size_bytes: u64, unix_ms: u64) {
        self.segments_shipped.fetch_add(1, Ordering::Relaxed);
        self.bytes_shipped.fetch_add(size_bytes, Ordering::Relaxed);
        self.last_shipped_unix_ms.store(unix_ms, Ordering::Relaxed);
    }

    /// Returns total segments shipped.
    #[must_use]
    pub fn segments_shipped(&self) -> u64 {
        self.segments_shipped.load(Ordering::Relaxed)
    }

    /// Returns total errors (capture + upload).
    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.capture_errors.load(Ordering::Relaxed) + self.upload_errors.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_shipped() {
        let metrics = ShipperMetrics::new();
        metrics.record_shipped(1024, 1_700_000_000_000);
        metrics.record_shipped(512, 1_700_000_060_000);

        assert_eq!(metrics.segments_shipped(), 2);
        assert_eq!(metrics.bytes_shipped.load(Ordering::Relaxed), 1536);
        assert_eq!(
            metrics.last_shipped_unix_ms.load(Ordering::Relaxed),
            1_700_000_060_000
        );
        assert_eq!(metrics.total_errors(), 0);
    }
}
