//! Backup session wiring.
//!
//! A [`BackupSession`] ties the pieces together for one source database:
//! the eligibility gate in front of the shipper on the capture side, and
//! the planner in front of the replay engine on the restore side. It
//! holds no background state itself; shipping runs under the returned
//! [`ShipperHandle`].

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::info;

use backhaul_core::eligibility::check_eligibility;
use backhaul_core::{
    BaseSnapshot, CaptureUnit, EligibilityProbe, LogSource, PlanningError, ReplayEngine,
    ReplayReport, RestorePlanner, RestoreTarget, Shipper, ShipperHandle, ShipperObserver,
};
use backhaul_store::{KeyLayout, SegmentStore};

use crate::config::SessionConfig;
use crate::error::BackhaulError;

/// One restore invocation's options.
///
/// A point-in-time target and a database subset are mutually exclusive:
/// segment replay operates on the whole log stream and cannot be scoped
/// to a subset, so combining the two is rejected up front instead of
/// silently ignoring one of them.
#[derive(Debug, Clone, Default)]
pub struct RestoreRequest {
    /// Restore point. `None` means "latest reachable state".
    pub target_time: Option<DateTime<Utc>>,
    /// Restrict the base restore to these databases. Forces a
    /// snapshot-only restore.
    pub databases: Option<Vec<String>>,
}

impl RestoreRequest {
    /// Restores the latest reachable state.
    #[must_use]
    pub fn latest() -> Self {
        Self::default()
    }

    /// Restores to the given point in time.
    #[must_use]
    pub fn point_in_time(target: DateTime<Utc>) -> Self {
        Self {
            target_time: Some(target),
            ..Self::default()
        }
    }

    /// Restores only the named databases from the base snapshot.
    #[must_use]
    pub fn databases(databases: Vec<String>) -> Self {
        Self {
            databases: Some(databases),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), PlanningError> {
        if self.target_time.is_some() && self.databases.is_some() {
            return Err(PlanningError::ConflictingRequest);
        }
        Ok(())
    }
}

/// Backup lifecycle coordinator for one source database.
pub struct BackupSession {
    store: Arc<dyn SegmentStore>,
    layout: KeyLayout,
    config: SessionConfig,
    observer: Option<Arc<dyn ShipperObserver>>,
}

impl BackupSession {
    /// Creates a session over `store` with the given configuration.
    #[must_use]
    pub fn new(store: Arc<dyn SegmentStore>, config: SessionConfig) -> Self {
        let layout = KeyLayout::new(&config.prefix, config.engine);
        Self {
            store,
            layout,
            config,
            observer: None,
        }
    }

    /// Routes shipper progress events to `observer` instead of the
    /// default tracing observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ShipperObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Returns the session's key layout.
    #[must_use]
    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    /// Returns a restore planner over this session's catalog.
    #[must_use]
    pub fn planner(&self) -> RestorePlanner {
        RestorePlanner::new(Arc::clone(&self.store), self.layout.clone())
    }

    /// Starts continuous log shipping for `source`.
    ///
    /// Runs the eligibility gate and verifies the container is reachable
    /// before spawning the shipper; both are start-time preconditions,
    /// so an ineligible source never produces a half-started loop. The
    /// capture-time clamp is seeded from the latest segment already in
    /// the catalog, so keys keep sorting after existing ones even if the
    /// wall clock stepped backwards since the previous session.
    ///
    /// # Errors
    ///
    /// Returns [`BackhaulError::Eligibility`] if the gate rejects the
    /// source, or [`BackhaulError::Store`] if the container is
    /// unreachable or the catalog cannot be listed.
    pub async fn start_log_shipping(
        &self,
        probe: &dyn EligibilityProbe,
        source: Box<dyn LogSource>,
    ) -> Result<ShipperHandle, BackhaulError> {
        check_eligibility(probe).await?;
        self.store.ensure_container().await?;

        let mut capture = CaptureUnit::new(source, &self.config.staging_dir);
        if let Some(tail) = self.latest_segment_time(capture.source_tag()).await? {
            capture.seed_captured_at(tail);
        }
        let mut shipper = Shipper::new(
            capture,
            Arc::clone(&self.store),
            self.layout.clone(),
            self.config.shipper.clone(),
        );
        if let Some(observer) = &self.observer {
            shipper = shipper.with_observer(Arc::clone(observer));
        }

        info!(prefix = self.layout.prefix(), "log shipping started");
        Ok(shipper.spawn())
    }

    /// Returns the capture time of the newest stored segment for `tag`.
    async fn latest_segment_time(
        &self,
        tag: &str,
    ) -> Result<Option<DateTime<Utc>>, BackhaulError> {
        let objects = self.store.list(&self.layout.log_prefix()).await?;
        Ok(objects
            .iter()
            .filter_map(|o| self.layout.parse_segment_key(&o.key))
            .filter(|p| p.source_tag == tag)
            .map(|p| p.timestamp)
            .max())
    }

    /// Uploads a base snapshot archive, anchoring the log stream.
    ///
    /// `timestamp` is the snapshot's consistency point and becomes part
    /// of the key, so restores planned later can bound segment selection
    /// against it.
    ///
    /// # Errors
    ///
    /// Returns [`BackhaulError::Store`] on upload failure.
    pub async fn upload_snapshot(
        &self,
        source_tag: &str,
        timestamp: DateTime<Utc>,
        archive: Bytes,
    ) -> Result<BaseSnapshot, BackhaulError> {
        let key = self.layout.snapshot_key(source_tag, timestamp);
        let size_bytes = archive.len() as u64;
        self.store.put(&key, archive).await?;
        info!(key, size_bytes, "base snapshot uploaded");
        Ok(BaseSnapshot {
            key,
            timestamp,
            size_bytes,
        })
    }

    /// Restores the source database per `request`.
    ///
    /// Plans against the session catalog, then replays against `target`.
    /// A subset restore applies the base snapshot only; a point-in-time
    /// (or latest) restore replays every in-range segment in order.
    ///
    /// # Errors
    ///
    /// Returns [`BackhaulError::Planning`] for an unsatisfiable or
    /// conflicting request, or [`BackhaulError::Replay`] if application
    /// fails part-way.
    pub async fn restore<T: RestoreTarget>(
        &self,
        request: &RestoreRequest,
        target: &mut T,
    ) -> Result<ReplayReport, BackhaulError> {
        request.validate().map_err(BackhaulError::Planning)?;
        let planner = self.planner();

        let plan = if let Some(databases) = &request.databases {
            // Subset restores come from the base snapshot alone.
            let snapshot = planner
                .latest_snapshot()
                .await?
                .ok_or(PlanningError::NoSnapshot(Utc::now()))?;
            let target_time = snapshot.timestamp;
            info!(
                snapshot = %snapshot.key,
                databases = databases.len(),
                "snapshot-only subset restore"
            );
            planner.plan(&snapshot, target_time).await?
        } else {
            let target_time = request.target_time.unwrap_or_else(Utc::now);
            planner.plan_to(target_time).await?
        };

        let engine = ReplayEngine::new(Arc::clone(&self.store));
        let report = engine
            .apply(&plan, target, request.databases.as_deref())
            .await?;
        Ok(report)
    }
}

impl std::fmt::Debug for BackupSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupSession")
            .field("prefix", &self.layout.prefix())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::TimeZone;

    use backhaul_core::testing::{MockProbe, MockRestoreTarget, ScriptedLogSource};
    use backhaul_core::{ShipperConfig, WalLsn};
    use backhaul_store::{EngineKind, MemorySegmentStore};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 24, 8, 0, 0).unwrap()
    }

    fn session(store: Arc<MemorySegmentStore>, dir: &std::path::Path) -> BackupSession {
        let config = SessionConfig::new("backups/prod", EngineKind::Document, dir).with_shipper(
            ShipperConfig::default()
                .with_capture_interval(Duration::from_secs(60))
                .with_retry_backoff(Duration::from_secs(10)),
        );
        BackupSession::new(store as _, config)
    }

    #[tokio::test]
    async fn test_conflicting_restore_request_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySegmentStore::new());
        let session = session(store, dir.path());

        let request = RestoreRequest {
            target_time: Some(t0()),
            databases: Some(vec!["orders".to_string()]),
        };
        let mut target = MockRestoreTarget::new();
        let err = session.restore(&request, &mut target).await.unwrap_err();

        assert!(matches!(
            err,
            BackhaulError::Planning(PlanningError::ConflictingRequest)
        ));
        // Nothing touched the target.
        assert!(target.base().is_none());
    }

    #[tokio::test]
    async fn test_standalone_source_cannot_start_shipping() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySegmentStore::new());
        let session = session(store, dir.path());

        let probe = MockProbe::standalone("orders");
        let source = Box::new(ScriptedLogSource::new("orders"));
        let err = session
            .start_log_shipping(&probe, source)
            .await
            .unwrap_err();
        assert!(matches!(err, BackhaulError::Eligibility(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eligible_source_ships_into_session_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySegmentStore::new());
        let session = session(Arc::clone(&store), dir.path());

        let probe = MockProbe::eligible("orders");
        let source = Box::new(ScriptedLogSource::new("orders").with_range(
            b"ops".to_vec(),
            4,
            WalLsn::new(10).into(),
        ));
        let handle = session.start_log_shipping(&probe, source).await.unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        handle.stop().await;

        let keys = store.keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("backups/prod/oplogs/orders_"));
        assert!(keys[0].ends_with(".bson"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_session_keys_sort_after_existing_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySegmentStore::new());
        let session = session(Arc::clone(&store), dir.path());
        let layout = session.layout().clone();

        // A previous session shipped with a wall clock ahead of ours.
        let tail = Utc::now() + chrono::Duration::days(1);
        let existing = layout.segment_key("orders", tail);
        store
            .put(&existing, Bytes::from_static(b"old"))
            .await
            .unwrap();

        let probe = MockProbe::eligible("orders");
        let source = Box::new(ScriptedLogSource::new("orders").with_range(
            b"new".to_vec(),
            1,
            WalLsn::new(10).into(),
        ));
        let handle = session.start_log_shipping(&probe, source).await.unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        handle.stop().await;

        let keys = store.keys();
        assert_eq!(keys.len(), 2);
        let shipped = keys.iter().find(|k| **k != existing).unwrap();
        let shipped_at = layout.parse_segment_key(shipped).unwrap().timestamp;
        assert!(shipped_at > tail);
        assert!(shipped.as_str() > existing.as_str());
    }

    #[tokio::test]
    async fn test_point_in_time_restore_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySegmentStore::new());
        let session = session(Arc::clone(&store), dir.path());

        session
            .upload_snapshot("orders", t0(), Bytes::from_static(b"base"))
            .await
            .unwrap();
        let layout = session.layout().clone();
        for offset in [1, 3, 7] {
            let ts = t0() + chrono::Duration::minutes(offset);
            store
                .put(&layout.segment_key("orders", ts), Bytes::from_static(b"seg"))
                .await
                .unwrap();
        }

        let request = RestoreRequest::point_in_time(t0() + chrono::Duration::minutes(5));
        let mut target = MockRestoreTarget::new();
        let report = session.restore(&request, &mut target).await.unwrap();

        assert_eq!(report.segments_applied, 2);
        assert!(target.base().is_some());
        assert!(target.databases().is_none());
    }

    #[tokio::test]
    async fn test_subset_restore_is_snapshot_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySegmentStore::new());
        let session = session(Arc::clone(&store), dir.path());

        session
            .upload_snapshot("orders", t0(), Bytes::from_static(b"base"))
            .await
            .unwrap();
        let layout = session.layout().clone();
        let ts = t0() + chrono::Duration::minutes(1);
        store
            .put(&layout.segment_key("orders", ts), Bytes::from_static(b"seg"))
            .await
            .unwrap();

        let request = RestoreRequest::databases(vec!["billing".to_string()]);
        let mut target = MockRestoreTarget::new();
        let report = session.restore(&request, &mut target).await.unwrap();

        // The in-range segment is deliberately not replayed.
        assert_eq!(report.segments_applied, 0);
        assert_eq!(target.databases().unwrap(), vec!["billing".to_string()]);
    }

    #[tokio::test]
    async fn test_upload_snapshot_key_is_catalog_visible() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySegmentStore::new());
        let session = session(Arc::clone(&store), dir.path());

        let snapshot = session
            .upload_snapshot("orders", t0(), Bytes::from_static(b"base"))
            .await
            .unwrap();
        assert_eq!(snapshot.key, "backups/prod/orders_20260824_080000.archive");

        let listed = session.planner().list_snapshots().await.unwrap();
        assert_eq!(listed, vec![snapshot]);
    }
}
