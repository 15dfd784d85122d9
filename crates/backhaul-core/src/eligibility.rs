//! Replica/primary eligibility gate.
//!
//! Continuous log capture only works when the source database keeps a
//! replayable log — in practice, when it is configured as a member of a
//! replicated cluster. The gate runs a read-only administrative probe
//! before the shipper starts. It is a start-time precondition, not a
//! per-iteration check, and it fails closed: a probe that cannot complete
//! is treated as "not eligible", never as an assumption of eligibility.

use async_trait::async_trait;
use tracing::warn;

use crate::error::EligibilityError;

/// Evidence returned by the administrative probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationProbe {
    /// Explicit cluster/replica-set identifier, if configured.
    pub set_name: Option<String>,
    /// Explicit "is part of a set" flag.
    pub is_set_member: bool,
    /// Known cluster members.
    pub members: Vec<String>,
}

impl ReplicationProbe {
    /// Returns `true` if any piece of evidence indicates the source can
    /// support log shipping. A non-empty member list alone is sufficient.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.set_name.is_some() || self.is_set_member || !self.members.is_empty()
    }
}

/// Read-only administrative probe of the source database.
#[async_trait]
pub trait EligibilityProbe: Send + Sync {
    /// Name identifying the probed source, for error reporting.
    fn source_name(&self) -> &str;

    /// Runs the probe.
    ///
    /// # Errors
    ///
    /// Returns [`EligibilityError::Probe`] on any connectivity or
    /// protocol failure.
    async fn probe(&self) -> Result<ReplicationProbe, EligibilityError>;
}

/// Runs the gate, fail-closed.
///
/// # Errors
///
/// Returns [`EligibilityError::NotEligible`] when the probe finds no
/// replication evidence, or when the probe itself fails.
pub async fn check_eligibility(probe: &dyn EligibilityProbe) -> Result<(), EligibilityError> {
    match probe.probe().await {
        Ok(evidence) if evidence.is_eligible() => Ok(()),
        Ok(_) => Err(EligibilityError::NotEligible(
            probe.source_name().to_string(),
        )),
        Err(e) => {
            warn!(source = probe.source_name(), error = %e, "eligibility probe failed, treating as ineligible");
            Err(EligibilityError::NotEligible(
                probe.source_name().to_string(),
            ))
        }
    }
}
