//! Mock collaborators for tests.
//!
//! Scripted stand-ins for the engine-facing traits, used by this crate's
//! own tests and available to downstream crates testing against the
//! orchestrator.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use backhaul_store::{SegmentStore, StoreError, StoredObject};

use crate::capture::{CapturedRange, LogSource};
use crate::cursor::{LogPosition, WalLsn};
use crate::eligibility::{EligibilityProbe, ReplicationProbe};
use crate::error::{CaptureError, EligibilityError, TargetError};
use crate::observer::ShipperObserver;
use crate::replay::RestoreTarget;
use crate::segment::Segment;

/// One scripted step for [`ScriptedLogSource`].
enum ScriptedStep {
    Range(CapturedRange),
    Failure(String),
}

/// Log source that replays a fixed script, then returns empty ranges.
///
/// Records every `since` cursor it is called with, so tests can assert
/// the unit resumes from the right position after failures.
pub struct ScriptedLogSource {
    tag: String,
    steps: Mutex<VecDeque<ScriptedStep>>,
    observed: Arc<Mutex<Vec<Option<LogPosition>>>>,
    fallback_position: Mutex<WalLsn>,
}

impl ScriptedLogSource {
    /// Creates a source with an empty script (every capture is empty).
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            steps: Mutex::new(VecDeque::new()),
            observed: Arc::new(Mutex::new(Vec::new())),
            fallback_position: Mutex::new(WalLsn::new(1_000_000)),
        }
    }

    /// Appends a successful capture step.
    #[must_use]
    pub fn with_range(self, bytes: Vec<u8>, entries: u64, position: LogPosition) -> Self {
        self.steps.lock().push_back(ScriptedStep::Range(CapturedRange {
            bytes: Bytes::from(bytes),
            entries,
            position,
        }));
        self
    }

    /// Appends a failing capture step.
    #[must_use]
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.steps
            .lock()
            .push_back(ScriptedStep::Failure(message.into()));
        self
    }

    /// Returns the shared record of observed `since` cursors.
    #[must_use]
    pub fn observed_cursors(&self) -> Arc<Mutex<Vec<Option<LogPosition>>>> {
        Arc::clone(&self.observed)
    }
}

#[async_trait]
impl LogSource for ScriptedLogSource {
    fn source_tag(&self) -> &str {
        &self.tag
    }

    async fn capture_range(
        &mut self,
        since: Option<&LogPosition>,
    ) -> Result<CapturedRange, CaptureError> {
        self.observed.lock().push(since.copied());
        match self.steps.lock().pop_front() {
            Some(ScriptedStep::Range(range)) => Ok(range),
            Some(ScriptedStep::Failure(msg)) => Err(CaptureError::Source(msg)),
            None => {
                // Script exhausted: empty range at an advancing position.
                let mut pos = self.fallback_position.lock();
                *pos = pos.advance(1);
                Ok(CapturedRange {
                    bytes: Bytes::new(),
                    entries: 0,
                    position: (*pos).into(),
                })
            }
        }
    }
}

/// Eligibility probe returning a fixed outcome.
pub struct MockProbe {
    name: String,
    outcome: Result<ReplicationProbe, String>,
}

impl MockProbe {
    /// Probe reporting a healthy three-member replica set.
    #[must_use]
    pub fn eligible(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: Ok(ReplicationProbe {
                set_name: Some("rs0".to_string()),
                is_set_member: true,
                members: vec![
                    "node-a:27017".to_string(),
                    "node-b:27017".to_string(),
                    "node-c:27017".to_string(),
                ],
            }),
        }
    }

    /// Probe reporting a standalone, non-replicated source.
    #[must_use]
    pub fn standalone(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: Ok(ReplicationProbe::default()),
        }
    }

    /// Probe that fails with a connectivity error.
    #[must_use]
    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: Err("connection refused".to_string()),
        }
    }
}

#[async_trait]
impl EligibilityProbe for MockProbe {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> Result<ReplicationProbe, EligibilityError> {
        self.outcome
            .clone()
            .map_err(EligibilityError::Probe)
    }
}

/// Restore target that records applied artifacts in memory.
///
/// Can be scripted to fail on the Nth segment to exercise the replay
/// engine's partial-failure reporting.
#[derive(Default)]
pub struct MockRestoreTarget {
    base: Mutex<Option<Bytes>>,
    applied: Mutex<Vec<Bytes>>,
    databases: Mutex<Option<Vec<String>>>,
    fail_at_segment: Mutex<Option<usize>>,
}

impl MockRestoreTarget {
    /// Creates a target that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the zero-based `index`-th `apply_segment` call fail.
    #[must_use]
    pub fn failing_at_segment(self, index: usize) -> Self {
        *self.fail_at_segment.lock() = Some(index);
        self
    }

    /// Returns the restored base archive, if any.
    #[must_use]
    pub fn base(&self) -> Option<Bytes> {
        self.base.lock().clone()
    }

    /// Returns the database subset the base restore was given.
    #[must_use]
    pub fn databases(&self) -> Option<Vec<String>> {
        self.databases.lock().clone()
    }

    /// Returns the segment payloads applied so far, in order.
    #[must_use]
    pub fn applied(&self) -> Vec<Bytes> {
        self.applied.lock().clone()
    }
}

#[async_trait]
impl RestoreTarget for MockRestoreTarget {
    async fn restore_base(
        &mut self,
        archive: Bytes,
        databases: Option<&[String]>,
    ) -> Result<(), TargetError> {
        *self.base.lock() = Some(archive);
        *self.databases.lock() = databases.map(<[String]>::to_vec);
        Ok(())
    }

    async fn apply_segment(&mut self, segment: Bytes) -> Result<(), TargetError> {
        let index = self.applied.lock().len();
        if *self.fail_at_segment.lock() == Some(index) {
            return Err(TargetError::Command(format!(
                "replay exited non-zero at segment {index}"
            )));
        }
        self.applied.lock().push(segment);
        Ok(())
    }
}

/// Observer that collects events for assertions.
#[derive(Default)]
pub struct CollectingObserver {
    shipped: Mutex<Vec<String>>,
    capture_errors: Mutex<u64>,
    upload_errors: Mutex<u64>,
    empty_captures: Mutex<u64>,
    stopped: Mutex<bool>,
}

impl CollectingObserver {
    /// Keys of shipped segments, in upload order.
    #[must_use]
    pub fn shipped_keys(&self) -> Vec<String> {
        self.shipped.lock().clone()
    }

    /// Number of capture errors observed.
    #[must_use]
    pub fn capture_errors(&self) -> u64 {
        *self.capture_errors.lock()
    }

    /// Number of upload errors observed.
    #[must_use]
    pub fn upload_errors(&self) -> u64 {
        *self.upload_errors.lock()
    }

    /// Number of empty captures observed.
    #[must_use]
    pub fn empty_captures(&self) -> u64 {
        *self.empty_captures.lock()
    }

    /// Whether `on_stopped` fired.
    #[must_use]
    pub fn stopped(&self) -> bool {
        *self.stopped.lock()
    }
}

impl ShipperObserver for CollectingObserver {
    fn on_segment_captured(&self, _segment: &Segment) {}

    fn on_empty_capture(&self, _source_tag: &str) {
        *self.empty_captures.lock() += 1;
    }

    fn on_segment_shipped(&self, key: &str, _size_bytes: u64, _elapsed: Duration) {
        self.shipped.lock().push(key.to_string());
    }

    fn on_capture_error(&self, _error: &CaptureError) {
        *self.capture_errors.lock() += 1;
    }

    fn on_upload_error(&self, _key: &str, _error: &StoreError) {
        *self.upload_errors.lock() += 1;
    }

    fn on_stopped(&self) {
        *self.stopped.lock() = true;
    }
}

/// Store wrapper that delays every `put`, for shutdown-grace tests.
pub struct SlowStore {
    inner: Arc<dyn SegmentStore>,
    put_delay: Duration,
}

impl SlowStore {
    /// Wraps `inner`, delaying each `put` by `put_delay`.
    #[must_use]
    pub fn new(inner: Arc<dyn SegmentStore>, put_delay: Duration) -> Self {
        Self { inner, put_delay }
    }
}

#[async_trait]
impl SegmentStore for SlowStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StoreError> {
        tokio::time::sleep(self.put_delay).await;
        self.inner.put(key, bytes).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.inner.get(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StoreError> {
        self.inner.list(prefix).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }

    async fn ensure_container(&self) -> Result<(), StoreError> {
        self.inner.ensure_container().await
    }
}
