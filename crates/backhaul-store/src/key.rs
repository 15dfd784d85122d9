//! Artifact key layout.
//!
//! All backup artifacts for one session live under a single key prefix:
//!
//! ```text
//! {prefix}/{source_tag}_{yyyyMMdd_HHmmss}.{snapshot_ext}   # base snapshots
//! {prefix}/{subfolder}/{source_tag}_{yyyyMMdd_HHmmss}.{segment_ext}
//! ```
//!
//! The log subfolder (`oplogs` for the document engine, `wals` for the
//! relational engine) is a reserved literal: snapshot selection lists the
//! prefix root and skips anything under it, so base and incremental
//! artifacts can never be confused. Timestamps use a fixed-width format so
//! lexicographic key order equals capture order for a given source tag.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Fixed-width, lexicographically sortable timestamp format used in keys.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Database engine a backup session targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum EngineKind {
    /// Document store; ships operation-log segments.
    Document,
    /// Relational store; ships write-ahead-log segments.
    Relational,
}

impl EngineKind {
    /// Reserved subfolder holding this engine's log segments.
    #[must_use]
    pub const fn log_subfolder(self) -> &'static str {
        match self {
            Self::Document => "oplogs",
            Self::Relational => "wals",
        }
    }

    /// File extension for log segments.
    #[must_use]
    pub const fn segment_ext(self) -> &'static str {
        match self {
            Self::Document => "bson",
            Self::Relational => "wal",
        }
    }

    /// File extension for base snapshot archives.
    #[must_use]
    pub const fn snapshot_ext(self) -> &'static str {
        match self {
            Self::Document => "archive",
            Self::Relational => "tar",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => write!(f, "document"),
            Self::Relational => write!(f, "relational"),
        }
    }
}

/// An artifact name parsed back out of a stored key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArtifact {
    /// Source tag embedded in the key.
    pub source_tag: String,
    /// Capture (or snapshot consistency) timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Key layout for one backup session.
///
/// Owns the session prefix and the engine choice; every key the session
/// reads or writes is derived through this type, keeping the layout in
/// one place.
#[derive(Debug, Clone)]
pub struct KeyLayout {
    prefix: String,
    engine: EngineKind,
}

impl KeyLayout {
    /// Creates a layout rooted at `prefix` for the given engine.
    ///
    /// A trailing `/` on the prefix is stripped so key derivation is
    /// unambiguous.
    #[must_use]
    pub fn new(prefix: impl Into<String>, engine: EngineKind) -> Self {
        let mut prefix = prefix.into();
        while prefix.ends_with('/') {
            prefix.pop();
        }
        Self { prefix, engine }
    }

    /// Returns the session prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the engine this layout serves.
    #[must_use]
    pub const fn engine(&self) -> EngineKind {
        self.engine
    }

    /// Returns the listing prefix for log segments, with trailing `/`.
    #[must_use]
    pub fn log_prefix(&self) -> String {
        format!("{}/{}/", self.prefix, self.engine.log_subfolder())
    }

    /// Derives the deterministic key for a log segment.
    ///
    /// The same `(source_tag, captured_at)` pair always yields the same
    /// key, which is what makes upload retries idempotent.
    #[must_use]
    pub fn segment_key(&self, source_tag: &str, captured_at: DateTime<Utc>) -> String {
        format!(
            "{}/{}/{}_{}.{}",
            self.prefix,
            self.engine.log_subfolder(),
            source_tag,
            captured_at.format(TIMESTAMP_FORMAT),
            self.engine.segment_ext()
        )
    }

    /// Derives the key for a base snapshot archive.
    #[must_use]
    pub fn snapshot_key(&self, source_tag: &str, timestamp: DateTime<Utc>) -> String {
        format!(
            "{}/{}_{}.{}",
            self.prefix,
            source_tag,
            timestamp.format(TIMESTAMP_FORMAT),
            self.engine.snapshot_ext()
        )
    }

    /// Returns `true` if `key` lies under the reserved log subfolder.
    #[must_use]
    pub fn is_segment_key(&self, key: &str) -> bool {
        key.starts_with(self.log_prefix().as_str())
    }

    /// Parses a log segment key back into its source tag and timestamp.
    ///
    /// Returns `None` for keys outside the log subfolder or with a name
    /// that does not match the layout.
    #[must_use]
    pub fn parse_segment_key(&self, key: &str) -> Option<ParsedArtifact> {
        let name = key.strip_prefix(self.log_prefix().as_str())?;
        parse_artifact_name(name, self.engine.segment_ext())
    }

    /// Parses a base snapshot key back into its source tag and timestamp.
    ///
    /// Keys under the log subfolder are rejected outright.
    #[must_use]
    pub fn parse_snapshot_key(&self, key: &str) -> Option<ParsedArtifact> {
        if self.is_segment_key(key) {
            return None;
        }
        let name = key.strip_prefix(&self.prefix)?.strip_prefix('/')?;
        if name.contains('/') {
            return None;
        }
        parse_artifact_name(name, self.engine.snapshot_ext())
    }
}

/// Parses `{tag}_{yyyyMMdd_HHmmss}.{ext}`.
///
/// The tag itself may contain underscores, so the timestamp is taken from
/// the fixed-width tail rather than by splitting on `_`.
fn parse_artifact_name(name: &str, ext: &str) -> Option<ParsedArtifact> {
    let stem = name.strip_suffix(ext)?.strip_suffix('.')?;
    // "{tag}_" + 15 chars of timestamp
    if stem.len() < 17 || !stem.is_char_boundary(stem.len() - 15) {
        return None;
    }
    let (head, ts) = stem.split_at(stem.len() - 15);
    let tag = head.strip_suffix('_')?;
    if tag.is_empty() {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok()?;
    Some(ParsedArtifact {
        source_tag: tag.to_string(),
        timestamp: naive.and_utc(),
    })
}
