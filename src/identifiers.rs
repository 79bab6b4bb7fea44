//! Identifier types for the merge engine
//!
//! Type-safe wrappers that keep allocator identity and cluster identity from being
//! mixed up with plain integers.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use ulid::Ulid;

/// Type-safe wrapper for row allocator identifiers
///
/// Every [`MatchDocAllocator`](crate::row_store::MatchDocAllocator) gets a fresh
/// ULID-based id, and every [`MatchDoc`](crate::row_store::MatchDoc) handle carries the
/// id of the allocator that owns its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct AllocatorId(u128);

/// Identifier of the cluster (index table replica set) a shard result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ClusterId(u32);

impl AllocatorId {
    /// Generate a new ULID-based allocator identifier
    pub fn new() -> Self {
        Self(Ulid::new().0)
    }

    /// Create an AllocatorId from a ULID
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid.0)
    }

    /// Convert to ULID
    pub fn as_ulid(self) -> Ulid {
        Ulid(self.0)
    }

    /// Create from a raw value (mainly for testing)
    pub fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Get the raw u128 value
    pub fn raw(self) -> u128 {
        self.0
    }
}

impl Default for AllocatorId {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl Display for AllocatorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ulid())
    }
}

impl Display for ClusterId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "cluster-{}", self.0)
    }
}

impl FromStr for AllocatorId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_ulid(Ulid::from_str(s)?))
    }
}

impl From<u32> for ClusterId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}
