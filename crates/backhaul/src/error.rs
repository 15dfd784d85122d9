//! Session-level error type.

use thiserror::Error;

use backhaul_core::{EligibilityError, PlanningError, ReplayError};
use backhaul_store::StoreError;

/// Any fatal error a [`BackupSession`](crate::BackupSession) operation
/// can return.
///
/// The shipper's recoverable capture/upload errors never appear here;
/// they stay inside the loop (see `backhaul_core::error`).
#[derive(Debug, Error)]
pub enum BackhaulError {
    /// The source database cannot support log shipping.
    #[error(transparent)]
    Eligibility(#[from] EligibilityError),

    /// No valid restore plan exists for the request.
    #[error(transparent)]
    Planning(#[from] PlanningError),

    /// Replay failed, possibly after applying a prefix of the plan.
    #[error(transparent)]
    Replay(#[from] ReplayError),

    /// Object store failure outside planning and replay.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_errors_keep_their_messages() {
        let err = BackhaulError::from(EligibilityError::NotEligible("orders".to_string()));
        assert!(err.to_string().contains("orders"));

        let err = BackhaulError::from(PlanningError::ConflictingRequest);
        assert!(err.to_string().contains("mutually exclusive"));
    }
}
