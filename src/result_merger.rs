//! Top-level merge of shard partial results
//!
//! [`ResultMerger`] combines every shard's [`ShardResult`] into one
//! [`MergedResult`] through a fixed sequence of steps. No step can fail the call:
//! a bad shard is dropped, the reason lands in the merged error list, and the
//! remaining shards still produce a result.
//!
//! The steps follow a one-way state machine:
//!
//! ```text
//! Init -> ErrorsMerged -> TracerMerged -> PhaseOneMerged -> Routed -> Done
//!                                      \> PhaseTwoMerged /
//! ErrorsMerged -> Routed   (every shard failed)
//! ```
//!
//! # Usage Examples
//!
//! ```rust
//! use shardmerge::result_merger::merge_partial_results;
//! use shardmerge::structures::{MergePhase, MergeRequest, OutputRoute, ShardResult};
//!
//! let inputs = vec![Some(ShardResult::new("p0")), Some(ShardResult::new("p1"))];
//! let merged = merge_partial_results(inputs, &MergeRequest::new(MergePhase::PhaseOne));
//!
//! assert_eq!(merged.route, OutputRoute::Empty);
//! assert_eq!(merged.src_count, 2);
//! ```

use crate::aggregate::merge_aggregate_results_with_outcome;
use crate::config::MergerConfig;
use crate::deduplication::MatchDocDeduper;
use crate::error::ErrorCode;
use crate::monitoring::{MergeMetrics, MergeTimer};
use crate::ranges::merge_covered_ranges;
use crate::row_store::{Arena, MatchDocAllocator};
use crate::structures::{DisplayMode, Hit, MergePhase, MergeRequest, MergedResult, OutputRoute, ShardResult};
use crate::tracer::Tracer;
use rustc_hash::FxHashSet;
use std::fmt::{self, Display, Formatter};

/// Progress of one merge call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeState {
    Init,
    ErrorsMerged,
    TracerMerged,
    PhaseOneMerged,
    PhaseTwoMerged,
    Routed,
    Done,
}

impl MergeState {
    /// Whether the merge may move from `self` to `next`
    pub fn can_transition_to(self, next: MergeState) -> bool {
        use MergeState::*;
        matches!(
            (self, next),
            (Init, ErrorsMerged)
                | (ErrorsMerged, TracerMerged)
                | (ErrorsMerged, Routed)
                | (TracerMerged, PhaseOneMerged)
                | (TracerMerged, PhaseTwoMerged)
                | (PhaseOneMerged, Routed)
                | (PhaseTwoMerged, Routed)
                | (Routed, Done)
        )
    }
}

impl Display for MergeState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Orchestrates the merge of shard partial results
#[derive(Debug, Clone)]
pub struct ResultMerger {
    config: MergerConfig,
    history: Vec<MergeState>,
}

impl Default for ResultMerger {
    fn default() -> Self {
        Self::new(MergerConfig::default())
    }
}

impl ResultMerger {
    pub fn new(config: MergerConfig) -> Self {
        Self {
            config,
            history: vec![MergeState::Init],
        }
    }

    pub fn config(&self) -> &MergerConfig {
        &self.config
    }

    /// Current state of the last merge call
    pub fn state(&self) -> MergeState {
        self.history.last().copied().unwrap_or(MergeState::Init)
    }

    /// States visited by the last merge call, starting with `Init`
    pub fn history(&self) -> &[MergeState] {
        &self.history
    }

    fn transition(&mut self, next: MergeState) {
        let current = self.state();
        if !current.can_transition_to(next) {
            tracing::error!("Invalid merge state transition {} -> {}", current, next);
        }
        tracing::trace!("Merge state {} -> {}", current, next);
        self.history.push(next);
    }

    /// Merge `inputs` as requested; `None` slots are shards whose result never arrived
    pub fn merge(&mut self, inputs: Vec<Option<ShardResult>>, request: &MergeRequest, pool: &Arena) -> MergedResult {
        let timer = MergeTimer::start();
        self.history = vec![MergeState::Init];

        let mut result = MergedResult::new(request.phase);
        let mut metrics = MergeMetrics::new();
        metrics.shards_seen = inputs.len();

        let mut shards = Vec::with_capacity(inputs.len());
        for (index, slot) in inputs.into_iter().enumerate() {
            match slot {
                Some(shard) => shards.push(shard),
                None => {
                    tracing::warn!("Result of shard {} is missing", index);
                    result
                        .errors
                        .add(ErrorCode::ShardResultMissing, format!("shard {} result missing", index));
                    metrics.shards_errored += 1;
                }
            }
        }

        let failed: Vec<bool> = shards.iter().map(ShardResult::has_error).collect();
        self.merge_errors(&mut shards, &mut result);
        self.transition(MergeState::ErrorsMerged);

        let all_failed = metrics.shards_seen > 0 && failed.iter().all(|&f| f);
        if all_failed {
            tracing::warn!("All {} shards failed, returning errors only", metrics.shards_seen);
            metrics.shards_errored = metrics.shards_seen;
            // Leave room for the terminal code so the final truncation keeps it.
            result.errors.truncate(self.config.max_errors.saturating_sub(1));
            result
                .errors
                .add(ErrorCode::AllShardsFailed, format!("all {} shards failed", metrics.shards_seen));
            result.route = OutputRoute::ErrorOnly;
            self.transition(MergeState::Routed);
            return self.finish(result, metrics, &timer, pool);
        }

        self.merge_tracer(&mut shards, request, &mut result);
        self.transition(MergeState::TracerMerged);

        // Shards that flagged an error contribute diagnostics only.
        let mut contributing = Vec::with_capacity(shards.len());
        for (shard, failed) in shards.into_iter().zip(failed) {
            if failed {
                metrics.shards_errored += 1;
            } else {
                contributing.push(shard);
            }
        }
        result.src_count = contributing.len();

        for shard in &contributing {
            result.total_count = result.total_count.saturating_add(shard.total_count);
            result.actual_count = result.actual_count.saturating_add(shard.actual_count);
        }

        match request.phase {
            MergePhase::PhaseOne => {
                self.merge_agg_results(&mut contributing, request, &mut result, &mut metrics, pool);
                Self::merge_covered_ranges(&mut contributing, &mut result);
                Self::merge_global_variables(&mut contributing, &mut result);
                if request.display_mode != DisplayMode::FlattenedSubDocs {
                    self.merge_match_docs(&mut contributing, request, &mut result, &mut metrics);
                }
                Self::merge_phase_one_search_infos(&contributing, &mut result);
                self.transition(MergeState::PhaseOneMerged);
            }
            MergePhase::PhaseTwo => {
                self.merge_hits(&mut contributing, request, &mut result, &mut metrics);
                Self::merge_phase_two_search_infos(&contributing, &mut result);
                self.transition(MergeState::PhaseTwoMerged);
            }
        }

        result.route = Self::route(&result, request);
        self.transition(MergeState::Routed);
        self.finish(result, metrics, &timer, pool)
    }

    fn finish(&mut self, mut result: MergedResult, mut metrics: MergeMetrics, timer: &MergeTimer, pool: &Arena) -> MergedResult {
        result.errors.truncate(self.config.max_errors);
        metrics.duration = timer.elapsed();
        metrics.arena = pool.stats().snapshot();
        result.metrics = metrics;
        self.transition(MergeState::Done);

        tracing::debug!(
            "Merged {} shards into {} docs, {} hits, {} aggregate dimensions ({:?}, {} errors)",
            result.src_count,
            result.match_docs.len(),
            result.hits.len(),
            result.aggregate_results.len(),
            result.route,
            result.errors.len()
        );
        result
    }

    fn merge_errors(&self, shards: &mut [ShardResult], result: &mut MergedResult) {
        for shard in shards {
            let errors = std::mem::take(&mut shard.errors);
            result.errors.merge(errors);
        }
    }

    fn merge_tracer(&self, shards: &mut [ShardResult], request: &MergeRequest, result: &mut MergedResult) {
        let enabled = request.enable_tracing.unwrap_or(self.config.enable_tracing);
        if !enabled {
            return;
        }
        let mut tracer = Tracer::default();
        for shard in shards {
            if let Some(shard_tracer) = shard.tracer.take() {
                tracer.merge(shard_tracer, &shard.partition);
            }
        }
        result.tracer = Some(tracer);
    }

    fn merge_agg_results(
        &self,
        shards: &mut [ShardResult],
        request: &MergeRequest,
        result: &mut MergedResult,
        metrics: &mut MergeMetrics,
        pool: &Arena,
    ) {
        if request.aggregates.is_empty() {
            return;
        }
        let inputs = shards.iter_mut().map(|shard| shard.aggregate_results.take()).collect();
        let outcome = merge_aggregate_results_with_outcome(inputs, &request.aggregates, pool);

        metrics.agg_rows_in = outcome.rows_in;
        metrics.agg_rows_out = outcome.rows_out;
        metrics.aggregation_abandoned = outcome.abandoned;
        result.errors.merge(outcome.errors);
        result.aggregate_results = outcome.results;
    }

    fn merge_covered_ranges(shards: &mut [ShardResult], result: &mut MergedResult) {
        result.covered_ranges = merge_covered_ranges(
            shards
                .iter_mut()
                .map(|shard| std::mem::take(&mut shard.covered_ranges)),
        );
    }

    fn merge_global_variables(shards: &mut [ShardResult], result: &mut MergedResult) {
        for shard in shards {
            result.global_variables.append(&mut shard.global_variables);
        }
    }

    fn merge_match_docs(
        &self,
        shards: &mut [ShardResult],
        request: &MergeRequest,
        result: &mut MergedResult,
        metrics: &mut MergeMetrics,
    ) {
        let inputs: Vec<_> = shards.iter_mut().filter_map(|shard| shard.match_docs.take()).collect();
        metrics.docs_in = inputs.iter().map(|docs| docs.len()).sum();

        let mut deduper = MatchDocDeduper::new(self.config.dedup_tie_break, self.config.allocator_append_only);
        let mut target = MatchDocAllocator::new();
        let (code, docs) = deduper.dedup(&mut target, request.need_dedup, inputs);
        if code.is_error() {
            result
                .errors
                .add(code, format!("match doc merge dropped {} shards", deduper.dropped_shards()));
        }

        metrics.shards_dropped += deduper.dropped_shards();
        metrics.docs_out = docs.len();
        result.allocator = target;
        result.match_docs = docs;
    }

    fn merge_phase_one_search_infos(shards: &[ShardResult], result: &mut MergedResult) {
        for shard in shards {
            result.phase_one_info.merge(&shard.phase_one_info);
        }
    }

    fn merge_hits(&self, shards: &mut [ShardResult], request: &MergeRequest, result: &mut MergedResult, metrics: &mut MergeMetrics) {
        let mut hits: Vec<Hit> = Vec::with_capacity(shards.iter().map(|shard| shard.hits.len()).sum());
        for shard in shards.iter_mut() {
            hits.append(&mut shard.hits);
        }
        metrics.hits_in = hits.len();

        if request.dedup_hits {
            let mut seen = FxHashSet::default();
            hits.retain(|hit| seen.insert(hit.key()));
        }

        if request.hit_sort_descending.unwrap_or(self.config.hit_sort_descending) {
            hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        } else {
            hits.sort_by(|a, b| a.score.total_cmp(&b.score));
        }

        metrics.hits_out = hits.len();
        result.hits = hits;
    }

    fn merge_phase_two_search_infos(shards: &[ShardResult], result: &mut MergedResult) {
        for shard in shards {
            result.phase_two_info.merge(&shard.phase_two_info);
        }
    }

    fn route(result: &MergedResult, request: &MergeRequest) -> OutputRoute {
        let empty = match request.phase {
            MergePhase::PhaseOne if request.display_mode == DisplayMode::FlattenedSubDocs => result.actual_count == 0,
            MergePhase::PhaseOne => result.match_docs.is_empty(),
            MergePhase::PhaseTwo => result.hits.is_empty(),
        };
        if empty {
            OutputRoute::Empty
        } else {
            OutputRoute::Normal
        }
    }
}

/// Merge shard partial results with the default configuration
pub fn merge_partial_results(inputs: Vec<Option<ShardResult>>, request: &MergeRequest) -> MergedResult {
    let pool = Arena::new();
    ResultMerger::default().merge(inputs, request, &pool)
}
