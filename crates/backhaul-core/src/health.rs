//! Shipper health reporting.

use std::fmt;

/// Health of a running shipper.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HealthStatus {
    /// Shipping normally.
    Healthy,

    /// Still running but degraded (e.g. retrying after errors).
    /// Contains a description of the degradation.
    Degraded(String),

    /// Not shipping (stopped or failed to start).
    /// Contains a description of the failure.
    Unhealthy(String),

    /// Status unknown (not yet started).
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Returns `true` if the shipper is fully healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Returns `true` if the shipper is still making progress.
    #[must_use]
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded(msg) => write!(f, "Degraded: {msg}"),
            HealthStatus::Unhealthy(msg) => write!(f, "Unhealthy: {msg}"),
            HealthStatus::Unknown => write!(f, "Unknown"),
        }
    }
}
