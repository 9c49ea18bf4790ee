//! Version identifiers
//!
//! Versions are monotonic within a single store instance. They serve both as
//! lookup keys and as the ordering key for conflict detection: a proposal
//! computed against version N is only safely applicable while head == N.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::BsaError;

/// Monotonic version identifier for a committed snapshot
///
/// Rendered as `v{n}` on the wire and in logs.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VersionId(pub u64);

impl VersionId {
    /// First version ever assigned by a store
    pub const FIRST: VersionId = VersionId(1);

    #[inline]
    pub fn new(id: u64) -> Self {
        VersionId(id)
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// The next identifier in commit order
    #[inline]
    pub fn next(self) -> VersionId {
        VersionId(self.0 + 1)
    }
}

impl fmt::Debug for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version(v{})", self.0)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for VersionId {
    type Err = BsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix('v')
            .ok_or_else(|| BsaError::InvalidVersionId(s.to_string()))?;
        let n: u64 = digits
            .parse()
            .map_err(|_| BsaError::InvalidVersionId(s.to_string()))?;
        if n == 0 {
            return Err(BsaError::InvalidVersionId(s.to_string()));
        }
        Ok(VersionId(n))
    }
}

impl Serialize for VersionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
