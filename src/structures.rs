//! Core data structures for result merging
//!
//! This module provides the values that flow into and out of a merge call:
//! - [`ShardResult`]: one partition's partial result, consumed by the merge
//! - [`MergedResult`]: the combined, client-facing result
//! - [`MergeRequest`]: what the query asks the merge to do
//! - [`Hit`], [`PhaseOneSearchInfo`], [`PhaseTwoSearchInfo`]: phase-specific payloads
//!
//! # Usage Examples
//!
//! ```rust
//! use shardmerge::structures::{MergePhase, MergeRequest, ShardResult};
//!
//! let request = MergeRequest::new(MergePhase::PhaseOne).need_dedup(true);
//! let shard = ShardResult::new("partition-0").with_counts(120, 40);
//! assert_eq!(shard.total_count, 120);
//! assert!(request.need_dedup);
//! ```

use crate::aggregate::{AggregateResult, AggregateSpec};
use crate::deduplication::ShardDocs;
use crate::error::{ErrorCode, ErrorResult, MultiErrorResult};
use crate::identifiers::ClusterId;
use crate::monitoring::MergeMetrics;
use crate::ranges::CoveredRanges;
use crate::row_store::{MatchDoc, MatchDocAllocator};
use crate::tracer::Tracer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named values a shard publishes for the whole query
pub type VariableMap = BTreeMap<String, String>;

/// Global variables of all shards, in shard order
pub type GlobalVariables = Vec<VariableMap>;

/// Which half of a two-phase search is being merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MergePhase {
    /// Seek phase: match docs, aggregation, covered ranges
    #[default]
    PhaseOne,
    /// Fetch phase: summary hits
    PhaseTwo,
}

/// How the client wants matched docs laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplayMode {
    #[default]
    Normal,
    /// Sub-docs are returned flattened by the shards; there is no doc list to merge
    FlattenedSubDocs,
}

/// Where the merged result goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputRoute {
    /// Result carries docs or hits
    Normal,
    /// Nothing matched
    #[default]
    Empty,
    /// Every shard failed; only the errors are meaningful
    ErrorOnly,
}

/// One fetched document summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub cluster_id: ClusterId,
    pub global_doc_id: u64,
    pub score: f64,
    pub fields: BTreeMap<String, String>,
}

impl Hit {
    pub fn new(cluster_id: ClusterId, global_doc_id: u64, score: f64) -> Self {
        Self {
            cluster_id,
            global_doc_id,
            score,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Identity used for hit deduplication
    pub fn key(&self) -> (ClusterId, u64) {
        (self.cluster_id, self.global_doc_id)
    }
}

/// Phase-one counters; merging sums them, saturating at `u64::MAX`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOneSearchInfo {
    pub partition_count: u64,
    pub seek_doc_count: u64,
    pub match_doc_count: u64,
    pub seek_latency_us: u64,
    pub rank_latency_us: u64,
    pub rerank_latency_us: u64,
    /// Set when any shard cut its seek short
    pub use_truncate: bool,
}

impl PhaseOneSearchInfo {
    pub fn merge(&mut self, other: &PhaseOneSearchInfo) {
        self.partition_count = self.partition_count.saturating_add(other.partition_count);
        self.seek_doc_count = self.seek_doc_count.saturating_add(other.seek_doc_count);
        self.match_doc_count = self.match_doc_count.saturating_add(other.match_doc_count);
        self.seek_latency_us = self.seek_latency_us.saturating_add(other.seek_latency_us);
        self.rank_latency_us = self.rank_latency_us.saturating_add(other.rank_latency_us);
        self.rerank_latency_us = self.rerank_latency_us.saturating_add(other.rerank_latency_us);
        self.use_truncate |= other.use_truncate;
    }
}

/// Phase-two counters; merging sums them, saturating at `u64::MAX`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTwoSearchInfo {
    pub fetched_doc_count: u64,
    pub missing_doc_count: u64,
    pub summary_latency_us: u64,
}

impl PhaseTwoSearchInfo {
    pub fn merge(&mut self, other: &PhaseTwoSearchInfo) {
        self.fetched_doc_count = self.fetched_doc_count.saturating_add(other.fetched_doc_count);
        self.missing_doc_count = self.missing_doc_count.saturating_add(other.missing_doc_count);
        self.summary_latency_us = self.summary_latency_us.saturating_add(other.summary_latency_us);
    }
}

/// One partition's partial result
///
/// Built with consuming `with_*` setters and handed to the merge by value.
#[derive(Debug, Clone, Default)]
pub struct ShardResult {
    /// Name of the partition that produced this result
    pub partition: String,
    /// Matched docs, absent when the shard matched nothing
    pub match_docs: Option<ShardDocs>,
    pub total_count: u64,
    pub actual_count: u64,
    pub errors: MultiErrorResult,
    pub tracer: Option<Tracer>,
    /// `None` when the shard was expected to aggregate and reported nothing
    pub aggregate_results: Option<Vec<AggregateResult>>,
    pub covered_ranges: CoveredRanges,
    pub global_variables: GlobalVariables,
    pub hits: Vec<Hit>,
    pub phase_one_info: PhaseOneSearchInfo,
    pub phase_two_info: PhaseTwoSearchInfo,
}

impl ShardResult {
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            aggregate_results: Some(Vec::new()),
            ..Self::default()
        }
    }

    pub fn with_docs(mut self, docs: ShardDocs) -> Self {
        self.match_docs = Some(docs);
        self
    }

    pub fn with_counts(mut self, total_count: u64, actual_count: u64) -> Self {
        self.total_count = total_count;
        self.actual_count = actual_count;
        self
    }

    /// Record an error reported by the shard itself
    pub fn with_error(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
        let error = ErrorResult::new(code, message).with_partition(self.partition.clone());
        self.errors.add_error(error);
        self
    }

    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn with_aggregates(mut self, results: Vec<AggregateResult>) -> Self {
        self.aggregate_results = Some(results);
        self
    }

    /// Mark the aggregation metadata as missing
    pub fn without_aggregates(mut self) -> Self {
        self.aggregate_results = None;
        self
    }

    pub fn with_covered_range(mut self, cluster: ClusterId, from: u32, to: u32) -> Self {
        self.covered_ranges = self.covered_ranges.with_range(cluster, from, to);
        self
    }

    pub fn with_global_variables(mut self, variables: VariableMap) -> Self {
        self.global_variables.push(variables);
        self
    }

    pub fn with_hits(mut self, hits: Vec<Hit>) -> Self {
        self.hits = hits;
        self
    }

    pub fn with_phase_one_info(mut self, info: PhaseOneSearchInfo) -> Self {
        self.phase_one_info = info;
        self
    }

    pub fn with_phase_two_info(mut self, info: PhaseTwoSearchInfo) -> Self {
        self.phase_two_info = info;
        self
    }

    /// Whether the shard flagged its own result as failed
    pub fn has_error(&self) -> bool {
        self.errors.has_error()
    }

    pub fn doc_count(&self) -> usize {
        self.match_docs.as_ref().map_or(0, ShardDocs::len)
    }
}

/// What the query asks one merge call to do
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub phase: MergePhase,
    /// Deduplicate match docs by primary key
    pub need_dedup: bool,
    /// Deduplicate phase-two hits by `(cluster, global doc id)`
    pub dedup_hits: bool,
    pub display_mode: DisplayMode,
    /// Declared group-by dimensions, in order
    pub aggregates: Vec<AggregateSpec>,
    /// Overrides the configured tracing switch when set
    pub enable_tracing: Option<bool>,
    /// Overrides the configured hit sort direction when set
    pub hit_sort_descending: Option<bool>,
}

impl MergeRequest {
    pub fn new(phase: MergePhase) -> Self {
        Self {
            phase,
            ..Self::default()
        }
    }

    pub fn need_dedup(mut self, need_dedup: bool) -> Self {
        self.need_dedup = need_dedup;
        self
    }

    pub fn dedup_hits(mut self, dedup_hits: bool) -> Self {
        self.dedup_hits = dedup_hits;
        self
    }

    pub fn display_mode(mut self, display_mode: DisplayMode) -> Self {
        self.display_mode = display_mode;
        self
    }

    /// Declare the next group-by dimension
    pub fn aggregate(mut self, group_expr: impl Into<String>, fun_count: usize) -> Self {
        self.aggregates.push(AggregateSpec::new(group_expr, fun_count));
        self
    }

    pub fn enable_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = Some(enabled);
        self
    }

    pub fn hit_sort_descending(mut self, descending: bool) -> Self {
        self.hit_sort_descending = Some(descending);
        self
    }
}

/// Combined result of one merge call
#[derive(Debug, Clone, Default)]
pub struct MergedResult {
    pub phase: MergePhase,
    /// Owner of every doc in `match_docs`
    pub allocator: MatchDocAllocator,
    pub match_docs: Vec<MatchDoc>,
    pub aggregate_results: Vec<AggregateResult>,
    pub errors: MultiErrorResult,
    pub tracer: Option<Tracer>,
    pub covered_ranges: CoveredRanges,
    pub global_variables: GlobalVariables,
    pub hits: Vec<Hit>,
    pub phase_one_info: PhaseOneSearchInfo,
    pub phase_two_info: PhaseTwoSearchInfo,
    pub total_count: u64,
    pub actual_count: u64,
    /// Number of shards that contributed data
    pub src_count: usize,
    pub route: OutputRoute,
    pub metrics: MergeMetrics,
}

impl MergedResult {
    pub fn new(phase: MergePhase) -> Self {
        Self {
            phase,
            ..Self::default()
        }
    }

    pub fn doc_count(&self) -> usize {
        self.match_docs.len()
    }

    pub fn has_error(&self) -> bool {
        self.errors.has_error()
    }
}
