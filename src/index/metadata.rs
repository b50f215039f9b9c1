/// Versioned descriptor of indexed coverage and session state
///
/// One metadata record is persisted next to the three index collections.
/// Bumping INDEX_VERSION forces a full rebuild on next access, which is
/// the sole supported migration path for the derived indexes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::DateKey;

/// Current layout version of the persisted indexes
///
/// Increment this whenever the shape or semantics of the persisted
/// collections change.
pub const INDEX_VERSION: u32 = 2;

/// Persistent descriptor of what the indexes currently cover
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Layout version the collections were written with
    pub version: u32,
    /// Oldest date (inclusive) the indexes cover; moves backward as
    /// backfill progresses, never forward within a version
    pub indexed_from: Option<DateKey>,
    /// Oldest completion date present anywhere in the primary store
    pub oldest_data: Option<DateKey>,
    /// Newest date the indexes cover
    pub last_indexed: Option<DateKey>,
    /// True once indexed coverage reaches the oldest data
    pub backfill_complete: bool,
    /// Host-requested pause of backfill chunking
    pub backfill_paused: bool,
    /// Set when an index mutation could not be persisted; forces a
    /// rebuild at next session start
    pub rebuild_needed: bool,
}

impl IndexMetadata {
    /// Metadata for a store that has never been indexed
    pub fn unindexed() -> Self {
        Self {
            version: INDEX_VERSION,
            indexed_from: None,
            oldest_data: None,
            last_indexed: None,
            backfill_complete: false,
            backfill_paused: false,
            rebuild_needed: false,
        }
    }

    /// Decide whether this metadata demands a rebuild, and why
    pub fn needs_rebuild(&self) -> Option<RebuildReason> {
        if self.version != INDEX_VERSION {
            Some(RebuildReason::VersionMismatch)
        } else if self.rebuild_needed {
            Some(RebuildReason::RebuildFlagged)
        } else if self.indexed_from.is_none() || self.last_indexed.is_none() {
            Some(RebuildReason::MissingWindow)
        } else {
            None
        }
    }
}

/// Why a rebuild was triggered, kept for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebuildReason {
    /// No metadata record was found at all
    MissingMetadata,
    /// Stored version differs from INDEX_VERSION
    VersionMismatch,
    /// A previous session flagged the indexes for rebuild
    RebuildFlagged,
    /// Metadata exists but the bootstrap window fields are absent
    MissingWindow,
    /// The startup integrity check failed
    IntegrityFailure,
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RebuildReason::MissingMetadata => "missing metadata",
            RebuildReason::VersionMismatch => "version mismatch",
            RebuildReason::RebuildFlagged => "rebuild flagged",
            RebuildReason::MissingWindow => "missing window",
            RebuildReason::IntegrityFailure => "integrity failure",
        };
        f.write_str(s)
    }
}
