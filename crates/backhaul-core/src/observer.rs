//! Observer seam for shipping progress events.
//!
//! The shipper reports progress through this trait instead of writing to
//! any global console or progress state, so presentation stays outside
//! the core state machine. All methods have no-op defaults; implement
//! only what you need.

use std::time::Duration;

use tracing::{info, warn};

use crate::error::CaptureError;
use crate::segment::Segment;
use backhaul_store::StoreError;

/// Receives shipper lifecycle and progress events.
pub trait ShipperObserver: Send + Sync {
    /// A segment was captured and staged locally.
    fn on_segment_captured(&self, _segment: &Segment) {}

    /// A capture found no new log entries; nothing will be uploaded.
    fn on_empty_capture(&self, _source_tag: &str) {}

    /// A segment was uploaded and its local file removed.
    fn on_segment_shipped(&self, _key: &str, _size_bytes: u64, _elapsed: Duration) {}

    /// A capture attempt failed; the shipper will back off and retry.
    fn on_capture_error(&self, _error: &CaptureError) {}

    /// An upload attempt failed; the shipper will back off and retry the
    /// same segment.
    fn on_upload_error(&self, _key: &str, _error: &StoreError) {}

    /// The shipper reached its terminal state.
    fn on_stopped(&self) {}
}

/// Observer that logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ShipperObserver for TracingObserver {
    fn on_segment_captured(&self, segment: &Segment) {
        info!(
            source = %segment.source_tag,
            captured_at = %segment.captured_at,
            size_bytes = segment.size_bytes,
            entries = segment.entries,
            "segment captured"
        );
    }

    fn on_empty_capture(&self, source_tag: &str) {
        info!(source = source_tag, "no new log entries, skipping upload");
    }

    #[allow(clippy::cast_possible_truncation)]
    fn on_segment_shipped(&self, key: &str, size_bytes: u64, elapsed: Duration) {
        info!(key, size_bytes, elapsed_ms = elapsed.as_millis() as u64, "segment shipped");
    }

    fn on_capture_error(&self, error: &CaptureError) {
        warn!(error = %error, "capture failed, will retry");
    }

    fn on_upload_error(&self, key: &str, error: &StoreError) {
        warn!(key, error = %error, "upload failed, will retry");
    }

    fn on_stopped(&self) {
        info!("shipper stopped");
    }
}

/// Observer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ShipperObserver for NullObserver {}
