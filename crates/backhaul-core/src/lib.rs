//! # Backhaul Core
//!
//! The incremental log-shipping and point-in-time restore orchestrator.
//!
//! Capture flows one direction: database → local staging segment → object
//! store, driven by the [`Shipper`](shipper::Shipper) state machine on a
//! fixed cadence. Restore flows the other way: the
//! [`RestorePlanner`](planner::RestorePlanner) selects a base snapshot and
//! the ordered, time-bounded segment sequence, and the
//! [`ReplayEngine`](replay::ReplayEngine) applies them strictly in order.
//!
//! ## Core Invariant
//!
//! ```text
//! Snapshot(T0) + Segments(T0..=target).replay_in_order() = Consistent state at target
//! ```
//!
//! Database-facing work (capturing a log range, restoring an archive,
//! applying a segment) is delegated to collaborator traits so the state
//! machines stay engine-agnostic; mocks live in [`testing`].

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Log capture unit and the `LogSource` collaborator trait.
pub mod capture;

/// Engine-native log position cursors.
pub mod cursor;

/// Replica/primary eligibility gate.
pub mod eligibility;

/// Core error taxonomy.
pub mod error;

/// Shipper health reporting.
pub mod health;

/// Shipper counters.
pub mod metrics;

/// Observer seam for shipping progress events.
pub mod observer;

/// Point-in-time restore planning.
pub mod planner;

/// Snapshot + segment replay.
pub mod replay;

/// Captured segment and base snapshot types.
pub mod segment;

/// Continuous shipper state machine.
pub mod shipper;

/// Mock collaborators for tests.
pub mod testing;

pub use capture::{CaptureUnit, CapturedRange, LogSource};
pub use cursor::{LogPosition, OplogTimestamp, WalLsn};
pub use eligibility::{EligibilityProbe, ReplicationProbe};
pub use error::{CaptureError, EligibilityError, PlanningError, ReplayError, TargetError};
pub use health::HealthStatus;
pub use metrics::ShipperMetrics;
pub use observer::{NullObserver, ShipperObserver, TracingObserver};
pub use planner::{RestorePlan, RestorePlanner, SegmentRef};
pub use replay::{ReplayEngine, ReplayReport, RestoreTarget};
pub use segment::{BaseSnapshot, Segment};
pub use shipper::{Shipper, ShipperConfig, ShipperHandle, ShipperState};
