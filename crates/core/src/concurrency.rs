//! Optimistic concurrency token.

use serde::{Deserialize, Serialize};

/// Version of a stored ledger row.
///
/// Starts at 1 when the row is created and is incremented by exactly one on every
/// successful write.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version assigned to a freshly created row.
    pub const INITIAL: Version = Version(1);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl core::fmt::Display for Version {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Optimistic concurrency expectation supplied with every commit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The row must not exist yet (lazy create).
    Absent,
    /// The row must still be at exactly this version.
    Exact(Version),
}

impl ExpectedVersion {
    /// `actual` is `None` when no row is stored.
    pub fn matches(self, actual: Option<Version>) -> bool {
        match (self, actual) {
            (ExpectedVersion::Absent, None) => true,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            _ => false,
        }
    }

    /// Version the row carries once a commit with this expectation succeeds.
    pub fn committed_version(self) -> Version {
        match self {
            ExpectedVersion::Absent => Version::INITIAL,
            ExpectedVersion::Exact(v) => v.next(),
        }
    }
}
