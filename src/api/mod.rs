//! API module for the merge engine using the ApiThing pattern
//!
//! Every exposed merge is available as an operation over a single
//! [`MergeContext`] with a validated parameter object.

pub mod context;
pub mod operations;
pub mod parameters;

// Re-export core components for convenience
pub use apithing::ApiOperation;
pub use context::MergeContext;
pub use operations::{DedupMatchDocs, DedupOutput, GetMergeStats, MergeAggregateResults, MergePartialResults};
pub use parameters::{
    DedupMatchDocsParams, DedupMatchDocsParamsBuilder, GetMergeStatsParams, MergeAggregateResultsParams,
    MergeAggregateResultsParamsBuilder, MergePartialResultsParams, MergePartialResultsParamsBuilder,
};
