//! Snapshot + segment replay.
//!
//! Executes a [`RestorePlan`]: fetch and restore the base snapshot, then
//! fetch and apply every planned segment strictly in plan order. The
//! engine stops at the first failure and reports exactly how far it got;
//! it never skips a segment and never retries one, because log
//! application is not idempotent.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use backhaul_store::SegmentStore;

use crate::error::{ReplayError, TargetError};
use crate::planner::RestorePlan;

/// Engine-side collaborator that materializes restored state.
///
/// Implementations wrap the engine's native restore tooling (an archive
/// loader for the base, a log applier for segments). Methods take `&mut
/// self` because a restore is an exclusive, stateful operation on the
/// target database.
#[async_trait]
pub trait RestoreTarget: Send {
    /// Restores the base snapshot archive, optionally limited to the
    /// named databases.
    async fn restore_base(
        &mut self,
        archive: Bytes,
        databases: Option<&[String]>,
    ) -> Result<(), TargetError>;

    /// Applies one log segment on top of the current state.
    async fn apply_segment(&mut self, segment: Bytes) -> Result<(), TargetError>;
}

/// Outcome of a completed replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// Key of the restored base snapshot.
    pub snapshot_key: String,
    /// Number of segments applied.
    pub segments_applied: usize,
    /// Total bytes fetched and handed to the target.
    pub bytes_applied: u64,
}

/// Applies a restore plan against a [`RestoreTarget`].
pub struct ReplayEngine {
    store: Arc<dyn SegmentStore>,
}

impl ReplayEngine {
    /// Creates an engine fetching artifacts from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SegmentStore>) -> Self {
        Self { store }
    }

    /// Executes `plan` against `target`.
    ///
    /// Base first, then segments in plan order. On failure the returned
    /// error carries the count of fully-applied segments so an operator
    /// knows the exact state left behind.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError`] on the first fetch or apply failure.
    pub async fn apply<T: RestoreTarget>(
        &self,
        plan: &RestorePlan,
        target: &mut T,
        databases: Option<&[String]>,
    ) -> Result<ReplayReport, ReplayError> {
        let base = self
            .store
            .get(&plan.snapshot.key)
            .await
            .map_err(|source| ReplayError::Fetch {
                key: plan.snapshot.key.clone(),
                applied: 0,
                source,
            })?;
        let mut bytes_applied = base.len() as u64;

        target
            .restore_base(base, databases)
            .await
            .map_err(|source| ReplayError::Base {
                key: plan.snapshot.key.clone(),
                source,
            })?;
        info!(key = %plan.snapshot.key, "base snapshot restored");

        let total = plan.segments.len();
        for (index, segment) in plan.segments.iter().enumerate() {
            let payload =
                self.store
                    .get(&segment.key)
                    .await
                    .map_err(|source| ReplayError::Fetch {
                        key: segment.key.clone(),
                        applied: index,
                        source,
                    })?;
            bytes_applied += payload.len() as u64;

            target
                .apply_segment(payload)
                .await
                .map_err(|source| ReplayError::Segment {
                    index,
                    total,
                    key: segment.key.clone(),
                    applied: index,
                    source,
                })?;
            debug!(key = %segment.key, index, total, "segment applied");
        }

        info!(
            snapshot = %plan.snapshot.key,
            segments = total,
            bytes = bytes_applied,
            "replay complete"
        );
        Ok(ReplayReport {
            snapshot_key: plan.snapshot.key.clone(),
            segments_applied: total,
            bytes_applied,
        })
    }
}

impl std::fmt::Debug for ReplayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayEngine").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::RestorePlanner;
    use crate::testing::MockRestoreTarget;
    use backhaul_store::{EngineKind, KeyLayout, MemorySegmentStore};
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 24, 9, 0, 0).unwrap()
    }

    async fn seeded_plan(
        segment_payloads: &[&'static [u8]],
    ) -> (Arc<MemorySegmentStore>, RestorePlan) {
        let store = Arc::new(MemorySegmentStore::new());
        let layout = KeyLayout::new("backups/prod", EngineKind::Document);

        store
            .put(
                &layout.snapshot_key("orders", t0()),
                Bytes::from_static(b"base-archive"),
            )
            .await
            .unwrap();
        for (i, payload) in segment_payloads.iter().enumerate() {
            let ts = t0() + chrono::Duration::minutes(i as i64 + 1);
            store
                .put(&layout.segment_key("orders", ts), Bytes::from_static(payload))
                .await
                .unwrap();
        }

        let planner = RestorePlanner::new(Arc::clone(&store) as _, layout);
        let plan = planner
            .plan_to(t0() + chrono::Duration::hours(1))
            .await
            .unwrap();
        (store, plan)
    }

    #[tokio::test]
    async fn test_replay_applies_base_then_segments_in_order() {
        let (store, plan) = seeded_plan(&[b"seg-0", b"seg-1", b"seg-2"]).await;
        let engine = ReplayEngine::new(store as _);
        let mut target = MockRestoreTarget::new();

        let report = engine.apply(&plan, &mut target, None).await.unwrap();

        assert_eq!(report.segments_applied, 3);
        assert_eq!(target.base().unwrap(), Bytes::from_static(b"base-archive"));
        let applied = target.applied();
        assert_eq!(applied.len(), 3);
        assert_eq!(applied[0], Bytes::from_static(b"seg-0"));
        assert_eq!(applied[2], Bytes::from_static(b"seg-2"));
    }

    #[tokio::test]
    async fn test_replay_stops_at_first_failing_segment() {
        let (store, plan) = seeded_plan(&[b"seg-0", b"seg-1", b"seg-2"]).await;
        let engine = ReplayEngine::new(store as _);
        let mut target = MockRestoreTarget::new().failing_at_segment(1);

        let err = engine.apply(&plan, &mut target, None).await.unwrap_err();

        // Segment 0 applied, segment 1 failed, segment 2 never attempted.
        assert_eq!(err.segments_applied(), 1);
        assert!(matches!(
            err,
            ReplayError::Segment {
                index: 1,
                total: 3,
                ..
            }
        ));
        assert_eq!(target.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_segment_surfaces_as_fetch_error() {
        let (store, plan) = seeded_plan(&[b"seg-0", b"seg-1"]).await;
        store.delete(&plan.segments[1].key).await.unwrap();

        let engine = ReplayEngine::new(store as _);
        let mut target = MockRestoreTarget::new();
        let err = engine.apply(&plan, &mut target, None).await.unwrap_err();

        assert!(matches!(err, ReplayError::Fetch { applied: 1, .. }));
        assert_eq!(target.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_only_plan_restores_base_alone() {
        let (store, mut plan) = seeded_plan(&[]).await;
        plan.target = t0();

        let engine = ReplayEngine::new(store as _);
        let mut target = MockRestoreTarget::new();
        let report = engine.apply(&plan, &mut target, None).await.unwrap();

        assert_eq!(report.segments_applied, 0);
        assert!(target.base().is_some());
        assert!(target.applied().is_empty());
    }

    #[tokio::test]
    async fn test_database_subset_reaches_base_restore() {
        let (store, plan) = seeded_plan(&[]).await;
        let engine = ReplayEngine::new(store as _);
        let mut target = MockRestoreTarget::new();

        let subset = vec!["orders".to_string(), "billing".to_string()];
        engine
            .apply(&plan, &mut target, Some(&subset))
            .await
            .unwrap();

        assert_eq!(target.databases().unwrap(), subset);
    }
}
