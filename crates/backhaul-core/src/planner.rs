//! Point-in-time restore planning.
//!
//! A restore plan is a pure function of the catalog, the chosen base
//! snapshot, and the target timestamp: recomputing it from the same
//! inputs yields the same ordering. The planner only reads the object
//! store; nothing here mutates the catalog except the explicit
//! [`prune_segments_before`](RestorePlanner::prune_segments_before)
//! maintenance operation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use backhaul_store::{KeyLayout, SegmentStore};

use crate::error::PlanningError;
use crate::segment::BaseSnapshot;

/// A stored log segment selected into a plan.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SegmentRef {
    /// Object key of the segment.
    pub key: String,
    /// Capture time encoded in the key.
    pub captured_at: DateTime<Utc>,
    /// Segment size in bytes.
    pub size_bytes: u64,
}

/// Ordered artifacts needed to reach a target timestamp.
///
/// `segments` is ascending by `(captured_at, key)`; every segment lies
/// strictly after the snapshot and at or before the target.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RestorePlan {
    /// Anchoring base snapshot.
    pub snapshot: BaseSnapshot,
    /// Segments to replay, in application order.
    pub segments: Vec<SegmentRef>,
    /// The requested restore point.
    pub target: DateTime<Utc>,
}

impl RestorePlan {
    /// Returns `true` if the plan restores to exactly the snapshot time.
    #[must_use]
    pub fn is_snapshot_only(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total bytes the plan will fetch.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.snapshot.size_bytes + self.segments.iter().map(|s| s.size_bytes).sum::<u64>()
    }
}

/// Computes restore plans from the stored catalog.
pub struct RestorePlanner {
    store: Arc<dyn SegmentStore>,
    layout: KeyLayout,
}

impl RestorePlanner {
    /// Creates a planner over the given store and key layout.
    #[must_use]
    pub fn new(store: Arc<dyn SegmentStore>, layout: KeyLayout) -> Self {
        Self { store, layout }
    }

    /// Lists all base snapshots for the session, ascending by timestamp.
    ///
    /// Anything under the reserved log subfolder is excluded, so base
    /// and incremental artifacts can never be confused.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::Store`] if the catalog cannot be listed.
    pub async fn list_snapshots(&self) -> Result<Vec<BaseSnapshot>, PlanningError> {
        let objects = self.store.list(&format!("{}/", self.layout.prefix())).await?;
        let mut snapshots: Vec<BaseSnapshot> = objects
            .into_iter()
            .filter_map(|o| {
                let parsed = self.layout.parse_snapshot_key(&o.key)?;
                Some(BaseSnapshot {
                    key: o.key,
                    timestamp: parsed.timestamp,
                    size_bytes: o.size_bytes,
                })
            })
            .collect();
        snapshots.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.key.cmp(&b.key)));
        Ok(snapshots)
    }

    /// Returns the most recent base snapshot, if any exists.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::Store`] if the catalog cannot be listed.
    pub async fn latest_snapshot(&self) -> Result<Option<BaseSnapshot>, PlanningError> {
        Ok(self.list_snapshots().await?.pop())
    }

    /// Selects the most recent base snapshot at or before `target`.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::NoSnapshot`] if none qualifies.
    pub async fn select_snapshot(
        &self,
        target: DateTime<Utc>,
    ) -> Result<BaseSnapshot, PlanningError> {
        let snapshot = self
            .list_snapshots()
            .await?
            .into_iter()
            .filter(|s| s.timestamp <= target)
            .next_back()
            .ok_or(PlanningError::NoSnapshot(target))?;
        debug!(key = %snapshot.key, timestamp = %snapshot.timestamp, "base snapshot selected");
        Ok(snapshot)
    }

    /// Computes the plan reaching `target` from `snapshot`.
    ///
    /// Segments are filtered to `snapshot.timestamp < captured_at <=
    /// target` and sorted ascending by `(captured_at, key)` — the key
    /// tie-break keeps the plan deterministic even if two segments ever
    /// carried the same capture second. An empty range is a valid plan
    /// (restore to exactly the snapshot time), not an error.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidTarget`] if `target` precedes the
    /// snapshot, or [`PlanningError::Store`] on catalog failure.
    pub async fn plan(
        &self,
        snapshot: &BaseSnapshot,
        target: DateTime<Utc>,
    ) -> Result<RestorePlan, PlanningError> {
        if target < snapshot.timestamp {
            return Err(PlanningError::InvalidTarget {
                target,
                snapshot: snapshot.timestamp,
            });
        }

        let objects = self.store.list(&self.layout.log_prefix()).await?;
        let mut segments: Vec<SegmentRef> = objects
            .into_iter()
            .filter_map(|o| {
                let parsed = self.layout.parse_segment_key(&o.key)?;
                Some(SegmentRef {
                    key: o.key,
                    captured_at: parsed.timestamp,
                    size_bytes: o.size_bytes,
                })
            })
            .filter(|s| s.captured_at > snapshot.timestamp && s.captured_at <= target)
            .collect();

        segments.sort_by(|a, b| {
            a.captured_at
                .cmp(&b.captured_at)
                .then_with(|| a.key.cmp(&b.key))
        });

        info!(
            snapshot = %snapshot.key,
            target = %target,
            segments = segments.len(),
            "restore plan computed"
        );

        Ok(RestorePlan {
            snapshot: snapshot.clone(),
            segments,
            target,
        })
    }

    /// Convenience: selects the snapshot for `target`, then plans.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError`] from either step.
    pub async fn plan_to(&self, target: DateTime<Utc>) -> Result<RestorePlan, PlanningError> {
        let snapshot = self.select_snapshot(target).await?;
        self.plan(&snapshot, target).await
    }

    /// Deletes log segments captured at or before `cutoff`.
    ///
    /// Maintenance operation for segments superseded by a newer base
    /// snapshot. Returns the number of segments deleted.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::Store`] on listing or delete failure.
    pub async fn prune_segments_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, PlanningError> {
        let objects = self.store.list(&self.layout.log_prefix()).await?;
        let mut removed = 0;
        for object in objects {
            let Some(parsed) = self.layout.parse_segment_key(&object.key) else {
                continue;
            };
            if parsed.timestamp <= cutoff {
                self.store.delete(&object.key).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, cutoff = %cutoff, "pruned superseded log segments");
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for RestorePlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestorePlanner")
            .field("prefix", &self.layout.prefix())
            .finish_non_exhaustive()
    }
}
