//! Continuous shipper state machine.
//!
//! Runs Capture → Upload → Delete-local on a timer as a single
//! sequential loop inside one tokio task, so at most one capture/upload
//! cycle is ever in flight — no locking needed for that guarantee.
//!
//! ## States
//!
//! ```text
//! capturing ──ok──▶ uploading ──ok──▶ waiting_interval ─▶ capturing
//!     │errors           │err                 ▲
//!     ▼                 ▼                    │
//! retry_backoff ◀───────┘          (interval elapses)
//!     └──────────▶ capturing
//! stopped ◀── cancellation, from any state
//! ```
//!
//! Capture and upload errors are non-fatal: they are logged, reported to
//! the observer, and retried with a fixed backoff, indefinitely. Only
//! cancellation stops the loop. A failed upload keeps its local segment
//! file and is retried before any new capture; the deterministic key
//! makes the retry an idempotent overwrite.
//!
//! Every wait and the upload itself are cancellation-aware, so shutdown
//! latency is bounded by the grace period, never by the interval.

use std::pin::pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use backhaul_store::{KeyLayout, SegmentStore};

use crate::capture::CaptureUnit;
use crate::health::HealthStatus;
use crate::metrics::ShipperMetrics;
use crate::observer::{ShipperObserver, TracingObserver};
use crate::segment::Segment;

/// Timing configuration for the shipper.
#[derive(Debug, Clone)]
pub struct ShipperConfig {
    /// Delay between capture cycles.
    pub capture_interval: Duration,
    /// Delay before retrying after a capture or upload failure.
    pub retry_backoff: Duration,
    /// Maximum time an in-flight upload may finish after cancellation.
    pub shutdown_grace: Duration,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_secs(10 * 60),
            retry_backoff: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(20),
        }
    }
}

impl ShipperConfig {
    /// Sets the capture interval.
    #[must_use]
    pub fn with_capture_interval(mut self, interval: Duration) -> Self {
        self.capture_interval = interval;
        self
    }

    /// Sets the retry backoff.
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Sets the shutdown grace period.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Run state of a shipper instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShipperState {
    /// Invoking the log capture unit.
    Capturing,
    /// Pushing a segment to the object store.
    Uploading,
    /// Sleeping between cycles.
    WaitingInterval,
    /// Sleeping after a failure.
    RetryBackoff,
    /// Terminal: cancellation observed.
    Stopped,
}

impl std::fmt::Display for ShipperState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Capturing => write!(f, "capturing"),
            Self::Uploading => write!(f, "uploading"),
            Self::WaitingInterval => write!(f, "waiting_interval"),
            Self::RetryBackoff => write!(f, "retry_backoff"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Continuous log shipper for one backup session.
pub struct Shipper {
    capture: CaptureUnit,
    store: Arc<dyn SegmentStore>,
    layout: KeyLayout,
    config: ShipperConfig,
    observer: Arc<dyn ShipperObserver>,
}

impl Shipper {
    /// Creates a shipper. Events go to [`TracingObserver`] unless
    /// overridden with [`with_observer`](Self::with_observer).
    #[must_use]
    pub fn new(
        capture: CaptureUnit,
        store: Arc<dyn SegmentStore>,
        layout: KeyLayout,
        config: ShipperConfig,
    ) -> Self {
        Self {
            capture,
            store,
            layout,
            config,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replaces the progress observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ShipperObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Spawns the shipper loop as a background task.
    ///
    /// The returned handle is the only way to stop the loop; dropping it
    /// cancels the shipper.
    #[must_use]
    pub fn spawn(self) -> ShipperHandle {
        let state = Arc::new(RwLock::new(ShipperState::Capturing));
        let metrics = Arc::new(ShipperMetrics::new());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let grace = self.config.shutdown_grace;

        let task_state = Arc::clone(&state);
        let task_metrics = Arc::clone(&metrics);
        let task = tokio::spawn(self.run(task_state, task_metrics, shutdown_rx));

        ShipperHandle {
            state,
            metrics,
            grace,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        state: Arc<RwLock<ShipperState>>,
        metrics: Arc<ShipperMetrics>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        info!(
            source = self.capture.source_tag(),
            interval_s = self.config.capture_interval.as_secs(),
            "shipper started"
        );

        // Upload failures park the segment here; it is retried before
        // any new capture so segments keep arriving in capture order.
        let mut pending: Option<Segment> = None;

        'cycle: loop {
            let segment = if let Some(retry) = pending.take() {
                retry
            } else {
                *state.write() = ShipperState::Capturing;
                match self.capture.capture().await {
                    Ok(segment) => {
                        self.observer.on_segment_captured(&segment);
                        segment
                    }
                    Err(e) => {
                        metrics.capture_errors.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %e, "capture failed");
                        self.observer.on_capture_error(&e);
                        *state.write() = ShipperState::RetryBackoff;
                        if wait_or_shutdown(self.config.retry_backoff, &mut shutdown_rx).await {
                            break 'cycle;
                        }
                        continue;
                    }
                }
            };

            if segment.is_empty() {
                metrics.empty_captures.fetch_add(1, Ordering::Relaxed);
                self.observer.on_empty_capture(&segment.source_tag);
                remove_staged(&segment).await;
                *state.write() = ShipperState::WaitingInterval;
                if wait_or_shutdown(self.config.capture_interval, &mut shutdown_rx).await {
                    break 'cycle;
                }
                continue;
            }

            *state.write() = ShipperState::Uploading;
            let key = self
                .layout
                .segment_key(&segment.source_tag, segment.captured_at);

            let payload = match tokio::fs::read(&segment.payload_path).await {
                Ok(bytes) => Bytes::from(bytes),
                Err(e) => {
                    // Staged file is gone; nothing to retry, recapture.
                    metrics.upload_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(key, error = %e, "staged segment unreadable, will recapture");
                    *state.write() = ShipperState::RetryBackoff;
                    if wait_or_shutdown(self.config.retry_backoff, &mut shutdown_rx).await {
                        break 'cycle;
                    }
                    continue;
                }
            };

            let started = Instant::now();
            let size_bytes = segment.size_bytes;
            let mut upload = pin!(self.store.put(&key, payload));

            let result = tokio::select! {
                res = &mut upload => res,
                _ = &mut shutdown_rx => {
                    // Cancellation during upload: let it finish within
                    // the grace period, then stop either way. On timeout
                    // the segment stays local; a future run re-uploads
                    // it under the same key.
                    match tokio::time::timeout(self.config.shutdown_grace, &mut upload).await {
                        Ok(Ok(())) => {
                            metrics.record_shipped(size_bytes, unix_ms_now());
                            remove_staged(&segment).await;
                            self.observer
                                .on_segment_shipped(&key, size_bytes, started.elapsed());
                        }
                        Ok(Err(e)) => {
                            warn!(key, error = %e, "in-flight upload failed during shutdown");
                        }
                        Err(_) => {
                            warn!(
                                key,
                                grace_s = self.config.shutdown_grace.as_secs(),
                                "grace period expired, segment remains staged locally"
                            );
                        }
                    }
                    break 'cycle;
                }
            };

            match result {
                Ok(()) => {
                    metrics.record_shipped(size_bytes, unix_ms_now());
                    remove_staged(&segment).await;
                    self.observer
                        .on_segment_shipped(&key, size_bytes, started.elapsed());
                    *state.write() = ShipperState::WaitingInterval;
                    if wait_or_shutdown(self.config.capture_interval, &mut shutdown_rx).await {
                        break 'cycle;
                    }
                }
                Err(e) => {
                    metrics.upload_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(key, error = %e, "upload failed, segment kept for retry");
                    self.observer.on_upload_error(&key, &e);
                    pending = Some(segment);
                    *state.write() = ShipperState::RetryBackoff;
                    if wait_or_shutdown(self.config.retry_backoff, &mut shutdown_rx).await {
                        break 'cycle;
                    }
                }
            }
        }

        *state.write() = ShipperState::Stopped;
        self.observer.on_stopped();
        info!(source = self.capture.source_tag(), "shipper stopped");
    }
}

impl std::fmt::Debug for Shipper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shipper")
            .field("source", &self.capture.source_tag())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handle to a running shipper.
///
/// Carries the only cancellation path: no global signal handlers are
/// registered anywhere in this crate.
#[derive(Debug)]
pub struct ShipperHandle {
    state: Arc<RwLock<ShipperState>>,
    metrics: Arc<ShipperMetrics>,
    grace: Duration,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ShipperHandle {
    /// Returns the current run state.
    #[must_use]
    pub fn state(&self) -> ShipperState {
        *self.state.read()
    }

    /// Returns the shipper's counters.
    #[must_use]
    pub fn metrics(&self) -> &ShipperMetrics {
        &self.metrics
    }

    /// Derives a health status from the run state.
    #[must_use]
    pub fn health(&self) -> HealthStatus {
        match self.state() {
            ShipperState::Stopped => HealthStatus::Unhealthy("stopped".into()),
            ShipperState::RetryBackoff => HealthStatus::Degraded("retrying after error".into()),
            _ => HealthStatus::Healthy,
        }
    }

    /// Signals cancellation. The loop observes it inside any wait or
    /// in-flight upload; it does not wait for the next iteration.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Waits for the loop to reach its terminal state.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "shipper task aborted");
            }
        }
    }

    /// Signals cancellation and waits for the loop to stop.
    ///
    /// The wait is bounded by the in-flight grace period plus scheduling
    /// slack; the loop itself enforces the grace period.
    pub async fn stop(mut self) {
        self.shutdown();
        debug!(grace_s = self.grace.as_secs(), "waiting for shipper to stop");
        self.join().await;
    }
}

/// Sleeps for `duration` unless cancellation arrives first.
///
/// Returns `true` if cancellation was observed.
async fn wait_or_shutdown(duration: Duration, shutdown_rx: &mut oneshot::Receiver<()>) -> bool {
    tokio::select! {
        _ = &mut *shutdown_rx => true,
        () = tokio::time::sleep(duration) => false,
    }
}

/// Removes a staged segment file; failure to remove is logged, not fatal.
async fn remove_staged(segment: &Segment) {
    if let Err(e) = tokio::fs::remove_file(&segment.payload_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %segment.payload_path.display(), error = %e, "failed to remove staged segment");
        }
    }
}

#[allow(clippy::cast_sign_loss)]
fn unix_ms_now() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::WalLsn;
    use crate::testing::{CollectingObserver, ScriptedLogSource, SlowStore};
    use backhaul_store::{EngineKind, MemorySegmentStore};

    fn layout() -> KeyLayout {
        KeyLayout::new("backups/test", EngineKind::Relational)
    }

    fn fast_config() -> ShipperConfig {
        ShipperConfig::default()
            .with_capture_interval(Duration::from_secs(60))
            .with_retry_backoff(Duration::from_secs(10))
            .with_shutdown_grace(Duration::from_secs(20))
    }

    /// Advances paused virtual time so the loop can run `cycles` cycles.
    async fn advance_cycles(cycles: u32) {
        for _ in 0..cycles {
            tokio::time::sleep(Duration::from_secs(61)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ships_segments_in_capture_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySegmentStore::new());
        let source = ScriptedLogSource::new("billing")
            .with_range(b"r1".to_vec(), 1, WalLsn::new(10).into())
            .with_range(b"r2".to_vec(), 2, WalLsn::new(20).into())
            .with_range(b"r3".to_vec(), 3, WalLsn::new(30).into());
        let capture = CaptureUnit::new(Box::new(source), dir.path());

        let handle = Shipper::new(capture, Arc::clone(&store) as _, layout(), fast_config()).spawn();
        advance_cycles(5).await;
        handle.stop().await;

        let keys = store.keys();
        assert_eq!(keys.len(), 3);

        // Uploaded capture times are strictly ordered, and key order
        // matches capture order.
        let parsed: Vec<_> = keys
            .iter()
            .map(|k| layout().parse_segment_key(k).unwrap().timestamp)
            .collect();
        assert!(parsed.windows(2).all(|w| w[0] < w[1]));
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failure_retries_same_segment() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySegmentStore::new());
        store.fail_next_puts(1);
        let source = ScriptedLogSource::new("billing").with_range(
            b"only".to_vec(),
            1,
            WalLsn::new(10).into(),
        );
        let capture = CaptureUnit::new(Box::new(source), dir.path());
        let observer = Arc::new(CollectingObserver::default());

        let handle = Shipper::new(capture, Arc::clone(&store) as _, layout(), fast_config())
            .with_observer(Arc::clone(&observer) as _)
            .spawn();
        advance_cycles(3).await;
        let metrics_errors = handle.metrics().upload_errors.load(Ordering::Relaxed);
        let shipped = handle.metrics().segments_shipped();
        handle.stop().await;

        // Retry after the injected failure left exactly one catalog
        // entry with the original content.
        assert_eq!(metrics_errors, 1);
        assert_eq!(shipped, 1);
        assert_eq!(store.len(), 1);
        let key = store.keys().remove(0);
        assert_eq!(
            store.get(&key).await.unwrap(),
            bytes::Bytes::from_static(b"only")
        );
        assert_eq!(observer.upload_errors(), 1);
        assert_eq!(observer.shipped_keys(), vec![key]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_captures_skip_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySegmentStore::new());
        let source = ScriptedLogSource::new("billing");
        let capture = CaptureUnit::new(Box::new(source), dir.path());
        let observer = Arc::new(CollectingObserver::default());

        let handle = Shipper::new(capture, Arc::clone(&store) as _, layout(), fast_config())
            .with_observer(Arc::clone(&observer) as _)
            .spawn();
        advance_cycles(3).await;
        let empties = handle.metrics().empty_captures.load(Ordering::Relaxed);
        handle.stop().await;

        assert!(empties >= 2);
        assert!(store.is_empty());
        assert!(observer.shipped_keys().is_empty());
        // No staged files left behind either.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_interval_wait_is_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySegmentStore::new());
        let source = ScriptedLogSource::new("billing");
        let capture = CaptureUnit::new(Box::new(source), dir.path());

        let config = fast_config().with_capture_interval(Duration::from_secs(3600));
        let mut handle = Shipper::new(capture, Arc::clone(&store) as _, layout(), config).spawn();

        // Let the first (empty) cycle finish so the loop is inside the
        // hour-long interval wait.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.state(), ShipperState::WaitingInterval);

        handle.shutdown();
        // Must stop within the grace period, not after the remaining
        // interval: a 30s virtual timeout would fire first otherwise.
        tokio::time::timeout(Duration::from_secs(30), handle.join())
            .await
            .expect("shipper stopped within the grace window");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_grace_lets_inflight_upload_finish() {
        let dir = tempfile::tempdir().unwrap();
        let inner = Arc::new(MemorySegmentStore::new());
        let store = Arc::new(SlowStore::new(
            Arc::clone(&inner) as _,
            Duration::from_secs(10),
        ));
        let source = ScriptedLogSource::new("billing").with_range(
            b"slow".to_vec(),
            1,
            WalLsn::new(10).into(),
        );
        let capture = CaptureUnit::new(Box::new(source), dir.path());

        let mut handle =
            Shipper::new(capture, Arc::clone(&store) as _, layout(), fast_config()).spawn();

        // Enter the upload, then cancel while it is in flight.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.state(), ShipperState::Uploading);
        handle.shutdown();
        handle.join().await;

        // The 10s upload fit inside the 20s grace period.
        assert_eq!(inner.len(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_errors_do_not_terminate_loop() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySegmentStore::new());
        let source = ScriptedLogSource::new("billing")
            .with_failure("transient")
            .with_failure("transient")
            .with_range(b"ok".to_vec(), 1, WalLsn::new(10).into());
        let capture = CaptureUnit::new(Box::new(source), dir.path());

        let handle =
            Shipper::new(capture, Arc::clone(&store) as _, layout(), fast_config()).spawn();
        advance_cycles(3).await;
        let capture_errors = handle.metrics().capture_errors.load(Ordering::Relaxed);
        let shipped = handle.metrics().segments_shipped();
        handle.stop().await;

        assert_eq!(capture_errors, 2);
        assert_eq!(shipped, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ShipperState::WaitingInterval.to_string(), "waiting_interval");
        assert_eq!(ShipperState::Stopped.to_string(), "stopped");
    }
}
