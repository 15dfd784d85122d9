//! Captured segment and base snapshot types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// One discrete, immutable unit of captured log data.
///
/// Created by the capture unit, uploaded and then deleted locally by the
/// shipper. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Which database produced this segment.
    pub source_tag: String,
    /// Capture time; non-decreasing across segments from one shipper.
    pub captured_at: DateTime<Utc>,
    /// Local staging path of the payload (transient).
    pub payload_path: PathBuf,
    /// Payload size in bytes.
    pub size_bytes: u64,
    /// Logical log entries in the payload. Zero means the capture found
    /// no new data — a valid outcome, not an error.
    pub entries: u64,
}

impl Segment {
    /// Returns `true` if the segment carries no log entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

/// A full-database backup artifact anchoring a restore.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BaseSnapshot {
    /// Object key of the archive.
    pub key: String,
    /// Point of database consistency the snapshot represents.
    pub timestamp: DateTime<Utc>,
    /// Archive size in bytes.
    pub size_bytes: u64,
}
