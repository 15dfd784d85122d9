//! Log capture unit.
//!
//! Each call to [`CaptureUnit::capture`] produces one self-contained
//! segment covering exactly the log range not covered by any prior
//! successful capture in this session. The lower bound comes from the
//! engine's own log-position cursor (see [`crate::cursor`]), not from
//! wall-clock time, so a delayed capture widens the next segment instead
//! of losing data.
//!
//! The cursor lives in memory for the session's lifetime only: a fresh
//! session starts from "now" (`since = None`).

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::cursor::LogPosition;
use crate::error::CaptureError;
use crate::segment::Segment;

/// One captured log range, as returned by the engine collaborator.
#[derive(Debug, Clone)]
pub struct CapturedRange {
    /// Raw segment payload.
    pub bytes: Bytes,
    /// Logical entries in the range. Zero = nothing new.
    pub entries: u64,
    /// Cursor to resume from on the next capture.
    pub position: LogPosition,
}

/// Engine-side capture collaborator.
///
/// Implementations wrap whatever produces a log range for one engine
/// (an oplog dump, a WAL read). The unit never interprets the payload.
#[async_trait]
pub trait LogSource: Send {
    /// Tag identifying the database this source captures from.
    fn source_tag(&self) -> &str;

    /// Captures all log entries after `since`. `None` means "from now":
    /// the source picks its current position and returns an empty range.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Source`] on any engine-side failure.
    async fn capture_range(
        &mut self,
        since: Option<&LogPosition>,
    ) -> Result<CapturedRange, CaptureError>;
}

/// Produces staged [`Segment`]s from a [`LogSource`].
///
/// Owns the session cursor and the staging directory. The staging
/// directory is exclusively owned by the shipper that created this unit;
/// nothing else writes there.
pub struct CaptureUnit {
    source: Box<dyn LogSource>,
    staging_dir: PathBuf,
    cursor: Option<LogPosition>,
    last_captured_at: Option<DateTime<Utc>>,
}

impl CaptureUnit {
    /// Creates a capture unit staging into `staging_dir`.
    #[must_use]
    pub fn new(source: Box<dyn LogSource>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            staging_dir: staging_dir.into(),
            cursor: None,
            last_captured_at: None,
        }
    }

    /// Returns the current session cursor, if a capture has succeeded.
    #[must_use]
    pub fn cursor(&self) -> Option<&LogPosition> {
        self.cursor.as_ref()
    }

    /// Returns the tag of the underlying source.
    #[must_use]
    pub fn source_tag(&self) -> &str {
        self.source.source_tag()
    }

    /// Seeds the capture-time clamp from an already-stored timestamp.
    ///
    /// The clamp in [`capture`](Self::capture) only sees captures made
    /// within this session. Seeding it with the latest segment timestamp
    /// already in the catalog extends the ordering guarantee across
    /// restarts: even if the wall clock stepped backwards between
    /// sessions, new keys still sort after every existing one. A later
    /// seed never lowers an existing clamp.
    pub fn seed_captured_at(&mut self, at: DateTime<Utc>) {
        self.last_captured_at = Some(self.last_captured_at.map_or(at, |cur| cur.max(at)));
    }

    /// Captures one segment of "new changes since the last capture".
    ///
    /// The cursor advances only when the whole capture (including
    /// staging) succeeds, so a failed capture is retried over the same
    /// range. `captured_at` is clamped to be non-decreasing within the
    /// session even under clock adjustment; the clamp covers earlier
    /// sessions only if it was seeded from the catalog via
    /// [`seed_captured_at`](Self::seed_captured_at).
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError`] on collaborator or staging failure.
    pub async fn capture(&mut self) -> Result<Segment, CaptureError> {
        let range = self.source.capture_range(self.cursor.as_ref()).await?;

        // Strictly increasing capture times keep segment keys distinct
        // even under clock adjustment (keys have second resolution).
        let now = Utc::now();
        let captured_at = match self.last_captured_at {
            Some(last) if now <= last => last + chrono::Duration::seconds(1),
            _ => now,
        };

        let tag = self.source.source_tag().to_string();
        let file_name = format!(
            "{}_{}.seg",
            tag,
            captured_at.format(backhaul_store::TIMESTAMP_FORMAT)
        );
        let payload_path = self.staging_dir.join(file_name);

        tokio::fs::create_dir_all(&self.staging_dir).await?;
        tokio::fs::write(&payload_path, &range.bytes).await?;

        debug!(
            source = %tag,
            entries = range.entries,
            position = %range.position,
            "log range captured"
        );

        self.cursor = Some(range.position);
        self.last_captured_at = Some(captured_at);

        Ok(Segment {
            source_tag: tag,
            captured_at,
            payload_path,
            size_bytes: range.bytes.len() as u64,
            entries: range.entries,
        })
    }
}

impl std::fmt::Debug for CaptureUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureUnit")
            .field("source_tag", &self.source.source_tag())
            .field("staging_dir", &self.staging_dir)
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::WalLsn;
    use crate::testing::ScriptedLogSource;

    #[tokio::test]
    async fn test_capture_stages_payload_and_advances_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedLogSource::new("orders")
            .with_range(b"entries-1".to_vec(), 3, WalLsn::new(100).into());
        let mut unit = CaptureUnit::new(Box::new(source), dir.path());

        assert!(unit.cursor().is_none());
        let segment = unit.capture().await.unwrap();

        assert_eq!(segment.source_tag, "orders");
        assert_eq!(segment.entries, 3);
        assert_eq!(segment.size_bytes, 9);
        assert_eq!(unit.cursor(), Some(&WalLsn::new(100).into()));

        let staged = std::fs::read(&segment.payload_path).unwrap();
        assert_eq!(staged, b"entries-1");
    }

    #[tokio::test]
    async fn test_cursor_is_passed_back_to_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedLogSource::new("orders")
            .with_range(b"a".to_vec(), 1, WalLsn::new(10).into())
            .with_range(b"b".to_vec(), 1, WalLsn::new(20).into());
        let observed = source.observed_cursors();
        let mut unit = CaptureUnit::new(Box::new(source), dir.path());

        unit.capture().await.unwrap();
        unit.capture().await.unwrap();

        let seen = observed.lock().clone();
        assert_eq!(seen, vec![None, Some(WalLsn::new(10).into())]);
    }

    #[tokio::test]
    async fn test_empty_capture_is_success_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let source =
            ScriptedLogSource::new("orders").with_range(Vec::new(), 0, WalLsn::new(5).into());
        let mut unit = CaptureUnit::new(Box::new(source), dir.path());

        let segment = unit.capture().await.unwrap();
        assert!(segment.is_empty());
        // Cursor still advances: "nothing new" is covered ground.
        assert_eq!(unit.cursor(), Some(&WalLsn::new(5).into()));
    }

    #[tokio::test]
    async fn test_seeded_clamp_keeps_captures_after_catalog_tail() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedLogSource::new("orders")
            .with_range(b"a".to_vec(), 1, WalLsn::new(10).into())
            .with_range(b"b".to_vec(), 1, WalLsn::new(20).into());
        let mut unit = CaptureUnit::new(Box::new(source), dir.path());

        // Catalog tail far in the future, as after a backward clock step.
        let tail = Utc::now() + chrono::Duration::hours(24);
        unit.seed_captured_at(tail);

        let first = unit.capture().await.unwrap();
        let second = unit.capture().await.unwrap();
        assert!(first.captured_at > tail);
        assert!(second.captured_at > first.captured_at);

        // Seeding never lowers the clamp.
        unit.seed_captured_at(tail - chrono::Duration::hours(1));
        let third = unit.capture().await.unwrap();
        assert!(third.captured_at > second.captured_at);
    }

    #[tokio::test]
    async fn test_failed_capture_leaves_cursor_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedLogSource::new("orders")
            .with_range(b"a".to_vec(), 1, WalLsn::new(10).into())
            .with_failure("connection reset")
            .with_range(b"b".to_vec(), 2, WalLsn::new(20).into());
        let observed = source.observed_cursors();
        let mut unit = CaptureUnit::new(Box::new(source), dir.path());

        unit.capture().await.unwrap();
        assert!(unit.capture().await.is_err());
        assert_eq!(unit.cursor(), Some(&WalLsn::new(10).into()));

        unit.capture().await.unwrap();
        assert_eq!(unit.cursor(), Some(&WalLsn::new(20).into()));

        // The retry after the failure re-used the pre-failure cursor.
        let seen = observed.lock().clone();
        assert_eq!(seen[1], Some(WalLsn::new(10).into()));
        assert_eq!(seen[2], Some(WalLsn::new(10).into()));
    }
}
