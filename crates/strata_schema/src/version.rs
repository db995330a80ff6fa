//! Server-version ordering and the column-identity era tag.

use serde::{Deserialize, Serialize};

/// Monotonic server release version, encoded as
/// `major * 1_000_000 + minor * 1_000 + patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerVersion(pub u32);

impl ServerVersion {
    /// First release that assigns cluster-wide column oids.
    pub const COLUMN_OID_VERSION: ServerVersion = ServerVersion::new(5, 5, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        ServerVersion(major * 1_000_000 + minor * 1_000 + patch)
    }

    pub fn on_or_after(self, other: ServerVersion) -> bool {
        self >= other
    }
}

/// Identity scheme a relation was created under.
///
/// Fixed forever at creation time. Mutation-time code matches on this
/// tag instead of re-comparing the creation version against the current
/// threshold constant, so old relations keep their behavior even if the
/// threshold moves in a later release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityEra {
    /// Columns carry oids drawn from the cluster-wide counter.
    OidAssigned,
    /// Pre-oid relation; every column identity stays `Unassigned`.
    Legacy,
}

impl IdentityEra {
    /// Resolves the era for a relation created at `version`.
    pub fn for_created_version(version: ServerVersion) -> Self {
        if version.on_or_after(ServerVersion::COLUMN_OID_VERSION) {
            IdentityEra::OidAssigned
        } else {
            IdentityEra::Legacy
        }
    }
}
