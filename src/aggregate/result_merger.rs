//! Row-level composite of function mergers

use super::aggregate_result::AggregateResult;
use super::fun_merger::{create_agg_fun_merger, AggFunKind, AggFunMerger};
use crate::error::MergeError;
use crate::row_store::{Arena, MatchDoc, MatchDocAllocator, ReferenceBase};
use crate::Result;

/// Applies one [`AggFunMerger`] per declared function, in declaration order
#[derive(Debug)]
pub struct AggFunResultMerger {
    mergers: Vec<Box<dyn AggFunMerger>>,
}

impl AggFunResultMerger {
    /// Pair each function name with its result column
    ///
    /// `fun_references` must not contain the group-key column.
    pub fn new(fun_names: &[String], fun_references: &[ReferenceBase]) -> Result<Self> {
        if fun_names.len() != fun_references.len() {
            return Err(MergeError::Aggregation(format!(
                "{} functions declared but {} function columns present",
                fun_names.len(),
                fun_references.len()
            )));
        }

        let mergers = fun_names
            .iter()
            .zip(fun_references)
            .map(|(name, reference)| {
                create_agg_fun_merger(name, reference).ok_or_else(|| {
                    MergeError::Aggregation(format!(
                        "no merger for function '{}' over {} column '{}'",
                        name,
                        reference.value_type(),
                        reference.name()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { mergers })
    }

    /// Build the merger for every function of `result`
    pub fn for_result(result: &AggregateResult) -> Result<Self> {
        Self::new(result.fun_names(), &result.fun_references())
    }

    /// Fold every function column of `src` into `dst`
    pub fn merge(&self, allocator: &mut MatchDocAllocator, dst: MatchDoc, src: MatchDoc, pool: &Arena) {
        for merger in &self.mergers {
            merger.merge(allocator, dst, src, pool);
        }
    }

    pub fn kinds(&self) -> Vec<AggFunKind> {
        self.mergers.iter().map(|m| m.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.mergers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mergers.is_empty()
    }
}
