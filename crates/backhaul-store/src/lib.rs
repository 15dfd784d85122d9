//! # Backhaul Store
//!
//! Object-store gateway for backup artifacts.
//!
//! This crate defines the [`SegmentStore`] contract the rest of Backhaul
//! programs against — `put`/`get`/`list`/`delete` over flat string keys —
//! together with the bit-exact [key layout](key) that encodes capture
//! timestamps into sortable object names. Restore correctness depends on
//! that layout: base snapshots and log segments must never be confused,
//! and segment keys must sort in capture order.
//!
//! Two implementations are provided:
//!
//! - [`MemorySegmentStore`] — in-process catalog for tests.
//! - [`S3SegmentStore`] — S3 and S3-compatible endpoints (`MinIO`,
//!   `LocalStack`) via the `object_store` crate.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Store error types.
pub mod error;

/// Artifact key layout (snapshots vs. log segments).
pub mod key;

/// In-memory store for tests.
pub mod memory;

/// S3-compatible store backed by `object_store`.
pub mod s3;

/// The `SegmentStore` trait and stored-object metadata.
pub mod store;

pub use error::StoreError;
pub use key::{EngineKind, KeyLayout, ParsedArtifact, TIMESTAMP_FORMAT};
pub use memory::MemorySegmentStore;
pub use s3::{S3Config, S3SegmentStore};
pub use store::{SegmentStore, StoredObject};
