//! Schema version descriptor shared by persisted artifacts.
//!
//! `manifest.json` is the single artifact that gates `resume`, so it is the
//! one that carries a [`SchemaVersion`]; the other checkpoint files
//! (`coverage.map`, `prng.state`, `weights.bin`, `corpus/index.json`) are
//! only ever read back by the same binary version that wrote them within a
//! run and are covered by the manifest's check.

use serde::{Deserialize, Serialize};

/// Semantic version describing the schema of a serialized payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major version incremented for breaking changes.
    pub major: u32,
    /// Minor version incremented for additive changes.
    pub minor: u32,
    /// Patch version incremented for bug fixes and documentation updates.
    pub patch: u32,
}

impl SchemaVersion {
    /// Creates a new schema version descriptor.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The schema version this build of choronzon writes and reads.
    pub const CURRENT: SchemaVersion = SchemaVersion::new(1, 0, 0);

    /// Whether a manifest written at `self` can be resumed by this build.
    /// Minor and patch bumps are additive and forward-compatible; a major
    /// bump is not.
    pub const fn is_compatible(&self, current: SchemaVersion) -> bool {
        self.major == current.major
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}
