//! Session configuration.

use std::path::PathBuf;

use backhaul_core::ShipperConfig;
use backhaul_store::EngineKind;

/// Configuration for one backup session.
///
/// A session binds one source database to one object-store prefix. The
/// prefix plus the engine kind fix the key layout; the staging directory
/// must be exclusively owned by this session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Object-store prefix all session artifacts live under.
    pub prefix: String,
    /// Engine kind, fixing the log subfolder and file extensions.
    pub engine: EngineKind,
    /// Local directory for staged segments awaiting upload.
    pub staging_dir: PathBuf,
    /// Shipper timing.
    pub shipper: ShipperConfig,
}

impl SessionConfig {
    /// Creates a config with default shipper timing.
    #[must_use]
    pub fn new(prefix: impl Into<String>, engine: EngineKind, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            engine,
            staging_dir: staging_dir.into(),
            shipper: ShipperConfig::default(),
        }
    }

    /// Sets the shipper timing.
    #[must_use]
    pub fn with_shipper(mut self, shipper: ShipperConfig) -> Self {
        self.shipper = shipper;
        self
    }
}
