//! # Backhaul
//!
//! Database backup lifecycle and point-in-time restore over
//! S3-compatible object storage.
//!
//! A [`BackupSession`] coordinates the two halves of the lifecycle for
//! one source database:
//!
//! - **Shipping**: after the eligibility gate passes, a background
//!   shipper captures transaction-log segments on a fixed cadence and
//!   uploads them under the session prefix, surviving transient capture
//!   and upload failures.
//! - **Restore**: a planner selects a base snapshot plus the ordered,
//!   time-bounded segment sequence, and the replay engine applies them
//!   strictly in order against a [`RestoreTarget`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use backhaul::{BackupSession, RestoreRequest, SessionConfig};
//! use backhaul_store::{EngineKind, S3Config, S3SegmentStore};
//!
//! # async fn run(
//! #     probe: &dyn backhaul::EligibilityProbe,
//! #     source: Box<dyn backhaul::LogSource>,
//! # ) -> Result<(), backhaul::BackhaulError> {
//! let store = S3SegmentStore::connect(&S3Config::new("backups", "us-east-1"))?;
//! let config = SessionConfig::new("prod/orders", EngineKind::Document, "/var/lib/backhaul");
//! let session = BackupSession::new(Arc::new(store), config);
//!
//! let handle = session.start_log_shipping(probe, source).await?;
//! // ... later:
//! handle.stop().await;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Session configuration.
pub mod config;

/// Session-level error type.
pub mod error;

/// Backup session wiring.
pub mod session;

pub use config::SessionConfig;
pub use error::BackhaulError;
pub use session::{BackupSession, RestoreRequest};

pub use backhaul_core::{
    CapturedRange, EligibilityProbe, HealthStatus, LogPosition, LogSource, OplogTimestamp,
    ReplayReport, RestorePlan, RestoreTarget, ShipperConfig, ShipperHandle, ShipperObserver,
    ShipperState, WalLsn,
};
pub use backhaul_store::{EngineKind, S3Config, S3SegmentStore, SegmentStore, StoreError};
