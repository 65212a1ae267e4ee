//! Identifiers for MOSAIC render passes.
//!
//! Pass ids are random UUIDs; they only exist to correlate log lines and
//! responses of a single orchestrator invocation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pass identifier - identifies a single render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PassId(Uuid);

impl PassId {
    /// Create a new random PassId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from UUID bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PassId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pass_{}", self.0)
    }
}
