//! Core operation implementations for the merge API using the ApiThing pattern
//!
//! Each operation works with the [`MergeContext`] and its parameter structure:
//! it validates the parameters and the context configuration, runs the merge,
//! records the call's metrics in the context's monitor and returns the outcome.
//!
//! # Operations
//!
//! - [`MergeAggregateResults`]: Merge per-shard group-by results per dimension
//! - [`DedupMatchDocs`]: Re-home shard doc lists into one allocator, collapsing duplicates
//! - [`MergePartialResults`]: Run the full phase-one or phase-two merge
//! - [`GetMergeStats`]: Read the aggregated monitor statistics
//!
//! # Usage Examples
//!
//! ```rust
//! use shardmerge::api::{MergeContext, MergePartialResultsParams};
//! use shardmerge::api::operations::MergePartialResults;
//! use shardmerge::structures::{MergePhase, MergeRequest, OutputRoute, ShardResult};
//! use apithing::ApiOperation;
//!
//! let mut context = MergeContext::new();
//! let params = MergePartialResultsParams::builder()
//!     .shard(ShardResult::new("partition-0"))
//!     .request(MergeRequest::new(MergePhase::PhaseOne))
//!     .build()?;
//!
//! let merged = MergePartialResults::execute(&mut context, &params)?;
//! assert_eq!(merged.route, OutputRoute::Empty);
//! assert_eq!(context.operation_count(), 1);
//! # Ok::<(), shardmerge::error::MergeError>(())
//! ```

use crate::aggregate::{merge_aggregate_results_with_outcome, AggregateMergeOutcome};
use crate::api::context::MergeContext;
use crate::api::parameters::{
    DedupMatchDocsParams, GetMergeStatsParams, MergeAggregateResultsParams, MergePartialResultsParams,
};
use crate::deduplication::{DeduplicationStats, MatchDocDeduper};
use crate::error::{ErrorCode, MergeError};
use crate::monitoring::{MergeMetrics, MergeStats, MergeTimer};
use crate::result_merger::ResultMerger;
use crate::row_store::{Arena, MatchDoc, MatchDocAllocator};
use crate::structures::MergedResult;
use apithing::ApiOperation;

/// Merge per-shard aggregate results, one merged result per declared dimension
pub struct MergeAggregateResults;

/// Re-home shard doc lists into a fresh allocator and deduplicate them
pub struct DedupMatchDocs;

/// Merge full shard partial results for one search phase
pub struct MergePartialResults;

/// Read the statistics aggregated by the context's monitor
pub struct GetMergeStats;

/// Output of [`DedupMatchDocs`]
#[derive(Debug, Clone)]
pub struct DedupOutput {
    /// First error raised while re-homing, or `ErrorCode::None`
    pub code: ErrorCode,
    /// Owner of every doc in `docs`
    pub allocator: MatchDocAllocator,
    /// Surviving rows in output order
    pub docs: Vec<MatchDoc>,
    pub stats: DeduplicationStats,
}

impl DedupOutput {
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl ApiOperation<MergeContext, MergeAggregateResultsParams> for MergeAggregateResults {
    type Output = AggregateMergeOutcome;
    type Error = MergeError;

    fn execute(context: &mut MergeContext, parameters: &MergeAggregateResultsParams) -> Result<Self::Output, Self::Error> {
        parameters.validate()?;

        let timer = MergeTimer::start();
        let pool = Arena::new();
        let outcome = merge_aggregate_results_with_outcome(parameters.inputs.clone(), &parameters.group_exprs, &pool);

        let metrics = MergeMetrics {
            shards_seen: parameters.shard_count(),
            shards_errored: parameters.inputs.iter().filter(|input| input.is_none()).count(),
            shards_dropped: outcome.errors.count_code(ErrorCode::GroupExprMismatch)
                + outcome.errors.count_code(ErrorCode::AllocatorMergeFailed),
            agg_rows_in: outcome.rows_in,
            agg_rows_out: outcome.rows_out,
            aggregation_abandoned: outcome.abandoned,
            duration: timer.elapsed(),
            arena: pool.stats().snapshot(),
            ..MergeMetrics::default()
        };
        tracing::debug!(
            "Merged {} aggregate rows into {} across {} dimensions",
            metrics.agg_rows_in,
            metrics.agg_rows_out,
            outcome.results.len()
        );
        context.record_operation(metrics);

        Ok(outcome)
    }
}

impl ApiOperation<MergeContext, DedupMatchDocsParams> for DedupMatchDocs {
    type Output = DedupOutput;
    type Error = MergeError;

    fn execute(context: &mut MergeContext, parameters: &DedupMatchDocsParams) -> Result<Self::Output, Self::Error> {
        parameters.validate()?;
        context.get_config().validate()?;

        let timer = MergeTimer::start();
        let config = context.get_config();
        let mut deduper = MatchDocDeduper::new(config.dedup_tie_break, config.allocator_append_only);
        let mut allocator = MatchDocAllocator::new();
        let (code, docs) = deduper.dedup(&mut allocator, parameters.need_dedup, parameters.inputs.clone());

        if code.is_error() {
            tracing::warn!("Doc merge finished with {}", code);
        }

        let metrics = MergeMetrics {
            shards_seen: parameters.inputs.len(),
            shards_dropped: deduper.dropped_shards(),
            docs_in: parameters.total_docs(),
            docs_out: docs.len(),
            duration: timer.elapsed(),
            ..MergeMetrics::default()
        };
        context.record_operation(metrics);

        Ok(DedupOutput {
            code,
            allocator,
            docs,
            stats: deduper.stats().clone(),
        })
    }
}

impl ApiOperation<MergeContext, MergePartialResultsParams> for MergePartialResults {
    type Output = MergedResult;
    type Error = MergeError;

    fn execute(context: &mut MergeContext, parameters: &MergePartialResultsParams) -> Result<Self::Output, Self::Error> {
        parameters.validate()?;
        context.get_config().validate()?;

        let pool = Arena::new();
        let mut merger = ResultMerger::new(context.get_config().clone());
        let merged = merger.merge(parameters.inputs.clone(), &parameters.request, &pool);
        context.record_operation(merged.metrics.clone());

        Ok(merged)
    }
}

impl ApiOperation<MergeContext, GetMergeStatsParams> for GetMergeStats {
    type Output = MergeStats;
    type Error = MergeError;

    fn execute(context: &mut MergeContext, parameters: &GetMergeStatsParams) -> Result<Self::Output, Self::Error> {
        parameters.validate()?;

        let stats = context.monitor().stats();
        if parameters.reset {
            tracing::debug!("Resetting merge monitor after {} merges", stats.total_merges);
            context.monitor().reset();
        }
        Ok(stats)
    }
}
