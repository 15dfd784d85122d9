//! Core error taxonomy.
//!
//! Recoverable and fatal errors are kept in separate types because their
//! propagation rules differ: [`CaptureError`] and upload failures
//! (surfaced as [`backhaul_store::StoreError`]) never escape the shipper
//! loop — they are logged, reported to the observer, and retried with
//! backoff. [`EligibilityError`], [`PlanningError`], and [`ReplayError`]
//! always escape to the caller, because continuing past them risks an
//! inconsistent restored state.

use chrono::{DateTime, Utc};
use thiserror::Error;

use backhaul_store::StoreError;

/// Fatal start-time error: the source database cannot support log shipping.
#[derive(Debug, Error)]
pub enum EligibilityError {
    /// The administrative probe ran but found no replication evidence.
    #[error("source '{0}' is not configured for log shipping (no replica set / cluster membership)")]
    NotEligible(String),

    /// The probe itself could not be completed. Fail-closed: treated as
    /// ineligible by callers.
    #[error("eligibility probe failed: {0}")]
    Probe(String),
}

/// Recoverable failure producing a log segment.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The engine-side capture collaborator failed.
    #[error("log capture failed: {0}")]
    Source(String),

    /// Writing the captured payload to local staging failed.
    #[error("segment staging failed: {0}")]
    Staging(#[from] std::io::Error),
}

/// Fatal error for one restore invocation: no valid plan exists.
#[derive(Debug, Error)]
pub enum PlanningError {
    /// The target timestamp precedes the chosen base snapshot.
    #[error("invalid target {target}: precedes base snapshot at {snapshot}")]
    InvalidTarget {
        /// Requested restore point.
        target: DateTime<Utc>,
        /// Consistency point of the chosen snapshot.
        snapshot: DateTime<Utc>,
    },

    /// No base snapshot exists at or before the target.
    #[error("no base snapshot found at or before {0}")]
    NoSnapshot(DateTime<Utc>),

    /// A point-in-time target and a database-subset restore were both
    /// requested. The combination is rejected explicitly rather than
    /// silently dropping one of the two.
    #[error("conflicting restore request: point-in-time target and database subset are mutually exclusive")]
    ConflictingRequest,

    /// The catalog could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure reported by a restore-path collaborator.
#[derive(Debug, Error)]
pub enum TargetError {
    /// The restore command failed; message carries the collaborator's
    /// summary, never its raw output.
    #[error("restore command failed: {0}")]
    Command(String),

    /// Local I/O while handing bytes to the collaborator.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal, possibly partially-applied error for one restore invocation.
///
/// Replay is not retried automatically: log application is not
/// idempotent, and blind re-application risks double-applied changes.
/// The error carries the exact point of partial completion so an
/// operator can resume or diagnose.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Restoring the base snapshot failed; no segments were touched.
    #[error("base snapshot restore failed ({key}): {source}")]
    Base {
        /// Snapshot key that failed to restore.
        key: String,
        /// Collaborator failure.
        source: TargetError,
    },

    /// A segment failed mid-sequence.
    #[error(
        "segment {index} of {total} failed ({key}); {applied} segment(s) were applied: {source}"
    )]
    Segment {
        /// Zero-based index of the failing segment in the plan.
        index: usize,
        /// Total segments in the plan.
        total: usize,
        /// Key of the failing segment.
        key: String,
        /// Number of segments fully applied before the failure.
        applied: usize,
        /// Collaborator failure.
        source: TargetError,
    },

    /// An artifact named by the plan could not be fetched.
    #[error("failed to fetch '{key}' ({applied} segment(s) were applied): {source}")]
    Fetch {
        /// Key that could not be fetched.
        key: String,
        /// Number of segments fully applied before the failure.
        applied: usize,
        /// Store failure.
        source: StoreError,
    },
}

impl ReplayError {
    /// Returns the number of segments successfully applied before the
    /// failure, if any replay was attempted.
    #[must_use]
    pub fn segments_applied(&self) -> usize {
        match self {
            ReplayError::Base { .. } => 0,
            ReplayError::Segment { applied, .. } | ReplayError::Fetch { applied, .. } => *applied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_error_reports_applied_prefix() {
        let err = ReplayError::Segment {
            index: 1,
            total: 3,
            key: "b/oplogs/db_20260824_101530.bson".to_string(),
            applied: 1,
            source: TargetError::Command("exit status 1".to_string()),
        };
        assert_eq!(err.segments_applied(), 1);
        let msg = err.to_string();
        assert!(msg.contains("segment 1 of 3"));
        assert!(msg.contains("1 segment(s) were applied"));
    }

    #[test]
    fn test_planning_error_messages() {
        let err = PlanningError::ConflictingRequest;
        assert!(err.to_string().contains("mutually exclusive"));
    }
}
