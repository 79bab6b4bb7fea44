//! Shardmerge - merge and aggregation of multi-shard search results
//!
//! A distributed search fans a query out to many shards and gets one partial
//! result back from each. Shardmerge folds those partial results into the single
//! result the caller sees: group-by aggregates are merged per dimension, matched
//! documents are re-homed into one allocator and deduplicated by primary key,
//! and errors, trace logs, covered ranges and phase-two hits are combined
//! alongside. A failing shard never takes the rest of the query down with it.
//!
//! The three merges are available as free functions
//! ([`merge_aggregate_results`], [`dedup_match_docs`], [`merge_partial_results`])
//! and as ApiThing operations over a [`api::MergeContext`].

pub mod aggregate;
pub mod api;
pub mod config;
pub mod deduplication;
pub mod error;
pub mod identifiers;
pub mod monitoring;
pub mod ranges;
pub mod result_merger;
pub mod row_store;
pub mod sketch;
pub mod structures;
pub mod tracer;

#[cfg(test)]
pub mod test_utils;

pub use aggregate::{
    merge_aggregate_results, merge_aggregate_results_with_outcome, AggFunMerger, AggFunResultMerger, AggResultReader,
    AggregateMergeOutcome, AggregateResult, AggregateSpec,
};
pub use config::{MergerConfig, SketchConfig};
pub use deduplication::{dedup_match_docs, DedupTieBreak, DeduplicationStats, MatchDocDeduper, ShardDocs};
pub use error::{ErrorCode, ErrorResult, MergeError, MultiErrorResult};
pub use identifiers::{AllocatorId, ClusterId};
pub use monitoring::{MergeMetrics, MergeMonitor, MergeStats};
pub use ranges::{merge_covered_ranges, CoveredRange, CoveredRanges};
pub use result_merger::{merge_partial_results, MergeState, ResultMerger};
pub use row_store::{Arena, MatchDoc, MatchDocAllocator, Reference, ReferenceBase, ValueType};
pub use sketch::HllSketch;
pub use structures::{
    DisplayMode, Hit, MergePhase, MergeRequest, MergedResult, OutputRoute, PhaseOneSearchInfo, PhaseTwoSearchInfo,
    ShardResult,
};
pub use tracer::{TraceLevel, Tracer};

/// Type alias for Results using MergeError
pub type Result<T> = std::result::Result<T, MergeError>;
