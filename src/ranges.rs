//! Covered partition ranges
//!
//! Each shard reports which slices of the partition key space it searched, per
//! cluster. Merging gathers every shard's ranges per cluster, sorts them and
//! coalesces touching or overlapping ranges, so `[0,10]`, `[11,20]` and `[25,30]`
//! become `[0,20]` and `[25,30]`.

use crate::identifiers::ClusterId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Inclusive range `[from, to]` of the partition key space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoveredRange {
    pub from: u32,
    pub to: u32,
}

impl CoveredRange {
    /// Build a range, swapping the bounds if they are reversed
    pub fn new(from: u32, to: u32) -> Self {
        if from <= to {
            Self { from, to }
        } else {
            Self { from: to, to: from }
        }
    }

    pub fn contains(&self, point: u32) -> bool {
        self.from <= point && point <= self.to
    }

    /// Number of key points covered
    pub fn width(&self) -> u64 {
        u64::from(self.to - self.from) + 1
    }

    /// Whether `next`, starting at or after `self.from`, touches or overlaps this range
    fn joins(&self, next: &CoveredRange) -> bool {
        u64::from(next.from) <= u64::from(self.to) + 1
    }
}

impl Display for CoveredRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.from, self.to)
    }
}

/// Ranges covered per cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoveredRanges {
    ranges: BTreeMap<ClusterId, Vec<CoveredRange>>,
}

impl CoveredRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, cluster: ClusterId, range: CoveredRange) {
        self.ranges.entry(cluster).or_default().push(range);
    }

    pub fn with_range(mut self, cluster: ClusterId, from: u32, to: u32) -> Self {
        self.add(cluster, CoveredRange::new(from, to));
        self
    }

    pub fn get(&self, cluster: ClusterId) -> &[CoveredRange] {
        self.ranges.get(&cluster).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn clusters(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.ranges.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.values().all(Vec::is_empty)
    }

    /// Move every range of `other` into this set without coalescing
    pub fn absorb(&mut self, other: CoveredRanges) {
        for (cluster, ranges) in other.ranges {
            self.ranges.entry(cluster).or_default().extend(ranges);
        }
    }

    /// Sort and coalesce each cluster's ranges in place
    pub fn coalesce(&mut self) {
        for ranges in self.ranges.values_mut() {
            *ranges = coalesce_ranges(std::mem::take(ranges));
        }
    }

    /// Total key points covered for `cluster`, after coalescing
    pub fn coverage(&self, cluster: ClusterId) -> u64 {
        coalesce_ranges(self.get(cluster).to_vec())
            .iter()
            .map(CoveredRange::width)
            .sum()
    }
}

/// Sort ranges and merge each one into its predecessor when `next.from <= cur.to + 1`
pub fn coalesce_ranges(mut ranges: Vec<CoveredRange>) -> Vec<CoveredRange> {
    ranges.sort();
    let mut merged: Vec<CoveredRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(current) if current.joins(&range) => current.to = current.to.max(range.to),
            _ => merged.push(range),
        }
    }
    merged
}

/// Union every shard's covered ranges, coalesced per cluster
pub fn merge_covered_ranges<I>(inputs: I) -> CoveredRanges
where
    I: IntoIterator<Item = CoveredRanges>,
{
    let mut merged = CoveredRanges::new();
    for ranges in inputs {
        merged.absorb(ranges);
    }
    merged.coalesce();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLUSTER: ClusterId = ClusterId::new(1);

    #[test]
    fn test_adjacent_and_disjoint_ranges() {
        let merged = merge_covered_ranges(vec![
            CoveredRanges::new().with_range(CLUSTER, 11, 20),
            CoveredRanges::new().with_range(CLUSTER, 0, 10),
            CoveredRanges::new().with_range(CLUSTER, 25, 30),
        ]);
        assert_eq!(
            merged.get(CLUSTER),
            &[CoveredRange::new(0, 20), CoveredRange::new(25, 30)]
        );
        assert_eq!(merged.coverage(CLUSTER), 27);
    }

    #[test]
    fn test_overlap_and_containment() {
        let merged = coalesce_ranges(vec![
            CoveredRange::new(0, 100),
            CoveredRange::new(10, 20),
            CoveredRange::new(90, 150),
        ]);
        assert_eq!(merged, vec![CoveredRange::new(0, 150)]);
    }

    #[test]
    fn test_clusters_kept_apart() {
        let other = ClusterId::new(2);
        let merged = merge_covered_ranges(vec![
            CoveredRanges::new().with_range(CLUSTER, 0, 10),
            CoveredRanges::new().with_range(other, 11, 20),
        ]);
        assert_eq!(merged.clusters().collect::<Vec<_>>(), vec![CLUSTER, other]);
        assert_eq!(merged.get(other), &[CoveredRange::new(11, 20)]);
    }

    #[test]
    fn test_upper_bound_does_not_overflow() {
        let merged = coalesce_ranges(vec![CoveredRange::new(u32::MAX - 1, u32::MAX), CoveredRange::new(5, 9)]);
        assert_eq!(merged.len(), 2);
        assert_eq!(CoveredRange::new(0, u32::MAX).width(), u64::from(u32::MAX) + 1);
    }

    #[test]
    fn test_reversed_bounds_normalized() {
        let range = CoveredRange::new(9, 3);
        assert_eq!((range.from, range.to), (3, 9));
        assert!(range.contains(5));
        assert_eq!(range.to_string(), "[3,9]");
    }
}
