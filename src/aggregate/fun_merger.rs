//! Per-function aggregate value mergers
//!
//! An [`AggFunMerger`] combines one function column of a source row into the same
//! column of a destination row. Both rows must live in the same allocator. Mergers
//! cannot fail: a row whose value cannot be read is left untouched.
//!
//! Mergers are picked once per aggregate result by [`create_agg_fun_merger`], which
//! maps the function name to an [`AggFunKind`] and the column's runtime
//! [`ValueType`] to one generic implementation.

use crate::row_store::{Arena, ColumnType, MatchDoc, MatchDocAllocator, Reference, ReferenceBase, ValueType};
use crate::sketch::HllSketch;
use std::fmt::Debug;

/// Aggregate function kinds that know how to merge partial results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggFunKind {
    Sum,
    Max,
    Min,
    Count,
    DistinctCount,
}

impl AggFunKind {
    /// Resolve a function name, ignoring ASCII case
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sum" => Some(Self::Sum),
            "max" => Some(Self::Max),
            "min" => Some(Self::Min),
            "count" => Some(Self::Count),
            "distinct_count" | "dcount" => Some(Self::DistinctCount),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Max => "max",
            Self::Min => "min",
            Self::Count => "count",
            Self::DistinctCount => "distinct_count",
        }
    }
}

/// Merges one function column of `src` into `dst`
pub trait AggFunMerger: Debug {
    fn kind(&self) -> AggFunKind;

    fn merge(&self, allocator: &mut MatchDocAllocator, dst: MatchDoc, src: MatchDoc, pool: &Arena);
}

/// Numeric column types that sum/max/min/count can combine
pub trait NumericValue: ColumnType + Copy + PartialOrd {
    /// Addition that never panics
    fn merge_add(self, other: Self) -> Self;
}

macro_rules! integer_values {
    ($($ty:ty),*) => {
        $(impl NumericValue for $ty {
            fn merge_add(self, other: Self) -> Self {
                self.wrapping_add(other)
            }
        })*
    };
}

macro_rules! float_values {
    ($($ty:ty),*) => {
        $(impl NumericValue for $ty {
            fn merge_add(self, other: Self) -> Self {
                self + other
            }
        })*
    };
}

integer_values!(i32, i64, u32, u64);
float_values!(f32, f64);

fn read_pair<'a, T: NumericValue>(
    allocator: &'a mut MatchDocAllocator,
    reference: &Reference<T>,
    dst: MatchDoc,
    src: MatchDoc,
) -> Option<(&'a mut T, T)> {
    allocator.get_pair_mut(reference, dst, src).map(|(d, s)| (d, *s))
}

/// `dst += src`
#[derive(Debug)]
pub struct SumMerger<T> {
    reference: Reference<T>,
}

impl<T: NumericValue> AggFunMerger for SumMerger<T> {
    fn kind(&self) -> AggFunKind {
        AggFunKind::Sum
    }

    fn merge(&self, allocator: &mut MatchDocAllocator, dst: MatchDoc, src: MatchDoc, _pool: &Arena) {
        if let Some((d, s)) = read_pair(allocator, &self.reference, dst, src) {
            *d = d.merge_add(s);
        }
    }
}

/// `dst = max(dst, src)`
#[derive(Debug)]
pub struct MaxMerger<T> {
    reference: Reference<T>,
}

impl<T: NumericValue> AggFunMerger for MaxMerger<T> {
    fn kind(&self) -> AggFunKind {
        AggFunKind::Max
    }

    fn merge(&self, allocator: &mut MatchDocAllocator, dst: MatchDoc, src: MatchDoc, _pool: &Arena) {
        if let Some((d, s)) = read_pair(allocator, &self.reference, dst, src) {
            if s > *d {
                *d = s;
            }
        }
    }
}

/// `dst = min(dst, src)`
#[derive(Debug)]
pub struct MinMerger<T> {
    reference: Reference<T>,
}

impl<T: NumericValue> AggFunMerger for MinMerger<T> {
    fn kind(&self) -> AggFunKind {
        AggFunKind::Min
    }

    fn merge(&self, allocator: &mut MatchDocAllocator, dst: MatchDoc, src: MatchDoc, _pool: &Arena) {
        if let Some((d, s)) = read_pair(allocator, &self.reference, dst, src) {
            if s < *d {
                *d = s;
            }
        }
    }
}

/// Partial counts add up
#[derive(Debug)]
pub struct CountMerger<T> {
    reference: Reference<T>,
}

impl<T: NumericValue> AggFunMerger for CountMerger<T> {
    fn kind(&self) -> AggFunKind {
        AggFunKind::Count
    }

    fn merge(&self, allocator: &mut MatchDocAllocator, dst: MatchDoc, src: MatchDoc, _pool: &Arena) {
        if let Some((d, s)) = read_pair(allocator, &self.reference, dst, src) {
            *d = d.merge_add(s);
        }
    }
}

/// Union of two distinct-count sketches
#[derive(Debug)]
pub struct DistinctCountMerger {
    reference: Reference<HllSketch>,
}

impl AggFunMerger for DistinctCountMerger {
    fn kind(&self) -> AggFunKind {
        AggFunKind::DistinctCount
    }

    fn merge(&self, allocator: &mut MatchDocAllocator, dst: MatchDoc, src: MatchDoc, pool: &Arena) {
        if let Some((d, s)) = allocator.get_pair_mut(&self.reference, dst, src) {
            d.merge(s, pool);
        }
    }
}

fn numeric_merger<T: NumericValue>(kind: AggFunKind, reference: Reference<T>) -> Option<Box<dyn AggFunMerger>> {
    match kind {
        AggFunKind::Sum => Some(Box::new(SumMerger { reference })),
        AggFunKind::Max => Some(Box::new(MaxMerger { reference })),
        AggFunKind::Min => Some(Box::new(MinMerger { reference })),
        AggFunKind::Count => Some(Box::new(CountMerger { reference })),
        AggFunKind::DistinctCount => None,
    }
}

/// Pick the merger for a function column
///
/// Returns None for unknown function names and for function/column-type
/// combinations that cannot be merged, such as `sum` over strings.
pub fn create_agg_fun_merger(fun_name: &str, reference: &ReferenceBase) -> Option<Box<dyn AggFunMerger>> {
    let kind = AggFunKind::from_name(fun_name)?;
    match reference.value_type() {
        ValueType::Int32 => numeric_merger::<i32>(kind, reference.typed()?),
        ValueType::Int64 => numeric_merger::<i64>(kind, reference.typed()?),
        ValueType::UInt32 => numeric_merger::<u32>(kind, reference.typed()?),
        ValueType::UInt64 => numeric_merger::<u64>(kind, reference.typed()?),
        ValueType::Float => numeric_merger::<f32>(kind, reference.typed()?),
        ValueType::Double => numeric_merger::<f64>(kind, reference.typed()?),
        ValueType::Sketch if kind == AggFunKind::DistinctCount => Some(Box::new(DistinctCountMerger {
            reference: reference.typed()?,
        })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_rows<T: ColumnType>(a: T, b: T) -> (MatchDocAllocator, ReferenceBase, MatchDoc, MatchDoc) {
        let mut allocator = MatchDocAllocator::new();
        let reference = allocator.declare::<T>("value").unwrap();
        let dst = allocator.allocate();
        let src = allocator.allocate();
        reference.set(&mut allocator, dst, a);
        reference.set(&mut allocator, src, b);
        let base = allocator.find_reference_without_type("value").unwrap();
        (allocator, base, dst, src)
    }

    fn merged<T: ColumnType + PartialEq>(fun: &str, a: T, b: T) -> T {
        let pool = Arena::new();
        let (mut allocator, base, dst, src) = two_rows(a, b);
        let merger = create_agg_fun_merger(fun, &base).expect("merger");
        merger.merge(&mut allocator, dst, src, &pool);
        allocator.get(&base.typed::<T>().unwrap(), dst).unwrap().clone()
    }

    #[test]
    fn test_sum_merger() {
        assert_eq!(merged("sum", 4444i64, 4443i64), 8887);
        assert_eq!(merged("SUM", 1.5f64, 2.25f64), 3.75);
    }

    #[test]
    fn test_sum_wraps_instead_of_panicking() {
        assert_eq!(merged("sum", u32::MAX, 2u32), 1);
    }

    #[test]
    fn test_max_min_mergers() {
        assert_eq!(merged("max", 3i32, 9i32), 9);
        assert_eq!(merged("max", 9i32, 3i32), 9);
        assert_eq!(merged("min", 3u64, 9u64), 3);
        assert_eq!(merged("min", 2.5f32, -1.0f32), -1.0);
    }

    #[test]
    fn test_count_merger_is_additive() {
        assert_eq!(merged("count", 111i64, 111i64), 222);
    }

    #[test]
    fn test_merger_is_not_idempotent() {
        let pool = Arena::new();
        let (mut allocator, base, dst, src) = two_rows(5i64, 5i64);
        let merger = create_agg_fun_merger("sum", &base).unwrap();
        merger.merge(&mut allocator, dst, src, &pool);
        merger.merge(&mut allocator, dst, src, &pool);
        assert_eq!(allocator.get(&base.typed::<i64>().unwrap(), dst), Some(&15));
    }

    #[test]
    fn test_distinct_count_merger() {
        let pool = Arena::new();
        let mut left = HllSketch::default();
        let mut right = HllSketch::default();
        for i in 0..50u64 {
            left.insert_u64(i);
            right.insert_u64(i + 25);
        }
        let (mut allocator, base, dst, src) = two_rows(left, right);
        let merger = create_agg_fun_merger("distinct_count", &base).unwrap();
        assert_eq!(merger.kind(), AggFunKind::DistinctCount);
        merger.merge(&mut allocator, dst, src, &pool);
        assert_eq!(allocator.get(&base.typed::<HllSketch>().unwrap(), dst).unwrap().estimate(), 75);
    }

    #[test]
    fn test_unsupported_combinations() {
        let (_, string_base, _, _) = two_rows(String::from("a"), String::from("b"));
        assert!(create_agg_fun_merger("sum", &string_base).is_none());

        let (_, int_base, _, _) = two_rows(1i64, 2i64);
        assert!(create_agg_fun_merger("distinct_count", &int_base).is_none());
        assert!(create_agg_fun_merger("median", &int_base).is_none());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(AggFunKind::from_name("dcount"), Some(AggFunKind::DistinctCount));
        assert_eq!(AggFunKind::from_name("Count").map(|k| k.name()), Some("count"));
    }
}
