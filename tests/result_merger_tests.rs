//! Integration tests for the full partial-result merge

mod common;

use common::{hit, primary_keys, shard_docs, test_constants, user_aggregate};
use shardmerge::aggregate::AggResultReader;
use shardmerge::{
    merge_partial_results, Arena, ClusterId, CoveredRange, DedupTieBreak, ErrorCode, MergePhase, MergeRequest,
    MergerConfig, OutputRoute, PhaseOneSearchInfo, PhaseTwoSearchInfo, ResultMerger, ShardResult, Tracer,
};

fn phase_one() -> MergeRequest {
    MergeRequest::new(MergePhase::PhaseOne)
}

#[test]
fn test_phase_one_end_to_end() {
    let inputs = vec![
        Some(
            ShardResult::new("p0")
                .with_docs(shard_docs(&[1, 2], 0, 1))
                .with_counts(120, 2)
                .with_aggregates(vec![user_aggregate(&[("user1", 4444, 111), ("user2", 10, 1)])]),
        ),
        Some(
            ShardResult::new("p1")
                .with_docs(shard_docs(&[3, 4, 1], 1, 1))
                .with_counts(80, 3)
                .with_aggregates(vec![user_aggregate(&[("user1", 4443, 111), ("user3", 7, 1)])]),
        ),
    ];
    let request = phase_one().need_dedup(true).aggregate(test_constants::USER_GROUP_EXPR, 2);

    let merged = merge_partial_results(inputs, &request);
    assert_eq!(merged.route, OutputRoute::Normal);
    assert_eq!(merged.src_count, 2);
    assert_eq!(merged.total_count, 200);
    assert_eq!(merged.actual_count, 5);
    assert!(!merged.has_error());
    assert_eq!(primary_keys(&merged.allocator, &merged.match_docs), vec![1, 2, 3, 4]);

    assert_eq!(merged.aggregate_results.len(), 1);
    let reader = AggResultReader::new(&merged.aggregate_results[0]);
    assert_eq!(reader.get::<i64>("user1", 0), Some(&8887));
    assert_eq!(reader.get::<i64>("user1", 1), Some(&222));

    assert_eq!(merged.metrics.docs_in, 5);
    assert_eq!(merged.metrics.docs_out, 4);
    assert_eq!(merged.metrics.agg_rows_in, 4);
    assert_eq!(merged.metrics.agg_rows_out, 3);
}

#[test]
fn test_covered_ranges_coalesce_per_cluster() {
    let c0 = ClusterId::new(0);
    let c1 = ClusterId::new(1);
    let inputs = vec![
        Some(ShardResult::new("p0").with_covered_range(c0, 25, 30)),
        Some(ShardResult::new("p1").with_covered_range(c0, 0, 10).with_covered_range(c1, 0, 5)),
        Some(ShardResult::new("p2").with_covered_range(c0, 11, 20).with_covered_range(c1, 7, 9)),
    ];

    let merged = merge_partial_results(inputs, &phase_one());
    assert_eq!(
        merged.covered_ranges.get(c0),
        &[CoveredRange::new(0, 20), CoveredRange::new(25, 30)]
    );
    assert_eq!(
        merged.covered_ranges.get(c1),
        &[CoveredRange::new(0, 5), CoveredRange::new(7, 9)]
    );
    assert_eq!(merged.covered_ranges.coverage(c0), 27);
}

#[test]
fn test_one_missing_shard_is_isolated() {
    let inputs = vec![
        Some(ShardResult::new("p0").with_docs(shard_docs(&[1, 2], 0, 1)).with_counts(2, 2)),
        None,
        Some(ShardResult::new("p2").with_docs(shard_docs(&[3], 2, 1)).with_counts(1, 1)),
    ];

    let merged = merge_partial_results(inputs, &phase_one().need_dedup(true));
    assert_eq!(merged.route, OutputRoute::Normal);
    assert_eq!(primary_keys(&merged.allocator, &merged.match_docs), vec![1, 2, 3]);
    assert_eq!(merged.src_count, 2);
    assert_eq!(merged.errors.len(), 1);
    assert_eq!(merged.errors.errors()[0].code, ErrorCode::ShardResultMissing);
}

#[test]
fn test_shard_errors_carry_their_partition() {
    let inputs = vec![
        Some(ShardResult::new("p0").with_docs(shard_docs(&[1], 0, 1))),
        Some(ShardResult::new("p1").with_error(ErrorCode::ShardReportedError, "seek timed out")),
    ];

    let merged = merge_partial_results(inputs, &phase_one());
    assert_eq!(merged.doc_count(), 1);
    let error = &merged.errors.errors()[0];
    assert_eq!(error.code, ErrorCode::ShardReportedError);
    assert_eq!(error.source_partition.as_deref(), Some("p1"));
}

#[test]
fn test_all_shards_failed_returns_errors_only() {
    let inputs = vec![
        Some(
            ShardResult::new("p0")
                .with_docs(shard_docs(&[1], 0, 1))
                .with_error(ErrorCode::ShardReportedError, "disk"),
        ),
        Some(ShardResult::new("p1").with_error(ErrorCode::ShardReportedError, "oom")),
    ];

    let merged = merge_partial_results(inputs, &phase_one());
    assert_eq!(merged.route, OutputRoute::ErrorOnly);
    assert_eq!(merged.doc_count(), 0);
    assert_eq!(merged.src_count, 0);
    assert_eq!(merged.errors.count_code(ErrorCode::ShardReportedError), 2);
    assert_eq!(merged.errors.count_code(ErrorCode::AllShardsFailed), 1);
}

#[test]
fn test_all_shards_failed_past_error_limit() {
    let inputs: Vec<_> = (0..101)
        .map(|i| Some(ShardResult::new(format!("p{}", i)).with_error(ErrorCode::ShardReportedError, "oom")))
        .collect();

    let merged = merge_partial_results(inputs, &phase_one());
    assert_eq!(merged.route, OutputRoute::ErrorOnly);
    assert_eq!(merged.errors.len(), MergerConfig::default().max_errors);
    assert_eq!(merged.errors.count_code(ErrorCode::AllShardsFailed), 1);
}

#[test]
fn test_missing_aggregate_metadata_keeps_docs() {
    let inputs = vec![
        Some(
            ShardResult::new("p0")
                .with_docs(shard_docs(&[1], 0, 1))
                .with_aggregates(vec![user_aggregate(&[("user1", 1, 1)])]),
        ),
        Some(ShardResult::new("p1").with_docs(shard_docs(&[2], 1, 1)).without_aggregates()),
    ];
    let request = phase_one().aggregate(test_constants::USER_GROUP_EXPR, 2);

    let merged = merge_partial_results(inputs, &request);
    assert!(merged.aggregate_results.is_empty());
    assert!(merged.metrics.aggregation_abandoned);
    assert_eq!(merged.errors.count_code(ErrorCode::AggMetadataMismatch), 1);
    assert_eq!(merged.doc_count(), 2);
    assert_eq!(merged.route, OutputRoute::Normal);
}

#[test]
fn test_no_docs_routes_to_empty() {
    let inputs = vec![
        Some(ShardResult::new("p0").with_docs(shard_docs(&[], 0, 1))),
        Some(ShardResult::new("p1")),
    ];
    let merged = merge_partial_results(inputs, &phase_one());
    assert_eq!(merged.route, OutputRoute::Empty);
    assert_eq!(merged.src_count, 2);
}

#[test]
fn test_search_infos_are_summed() {
    let info = |seek: u64, truncated: bool| PhaseOneSearchInfo {
        partition_count: 1,
        seek_doc_count: seek,
        use_truncate: truncated,
        ..PhaseOneSearchInfo::default()
    };
    let inputs = vec![
        Some(ShardResult::new("p0").with_phase_one_info(info(100, false))),
        Some(ShardResult::new("p1").with_phase_one_info(info(50, true))),
    ];
    let merged = merge_partial_results(inputs, &phase_one());
    assert_eq!(merged.phase_one_info.partition_count, 2);
    assert_eq!(merged.phase_one_info.seek_doc_count, 150);
    assert!(merged.phase_one_info.use_truncate);

    let fetched = |count: u64| PhaseTwoSearchInfo {
        fetched_doc_count: count,
        ..PhaseTwoSearchInfo::default()
    };
    let inputs = vec![
        Some(ShardResult::new("p0").with_phase_two_info(fetched(3)).with_hits(vec![hit(0, 1, 1.0)])),
        Some(ShardResult::new("p1").with_phase_two_info(fetched(4))),
    ];
    let merged = merge_partial_results(inputs, &MergeRequest::new(MergePhase::PhaseTwo));
    assert_eq!(merged.phase_two_info.fetched_doc_count, 7);
}

#[test]
fn test_phase_two_dedup_and_sort_direction() {
    let inputs = || {
        vec![
            Some(ShardResult::new("p0").with_hits(vec![hit(0, 1, 0.4), hit(0, 2, 0.8)])),
            Some(ShardResult::new("p1").with_hits(vec![hit(0, 1, 0.9), hit(1, 1, 0.1)])),
        ]
    };

    let request = MergeRequest::new(MergePhase::PhaseTwo).dedup_hits(true);
    let merged = merge_partial_results(inputs(), &request);
    let scores: Vec<f64> = merged.hits.iter().map(|hit| hit.score).collect();
    assert_eq!(scores, vec![0.8, 0.4, 0.1]);

    let merged = merge_partial_results(inputs(), &request.clone().hit_sort_descending(false));
    let scores: Vec<f64> = merged.hits.iter().map(|hit| hit.score).collect();
    assert_eq!(scores, vec![0.1, 0.4, 0.8]);

    let merged = merge_partial_results(inputs(), &MergeRequest::new(MergePhase::PhaseTwo));
    assert_eq!(merged.hits.len(), 4);
}

#[test]
fn test_phase_two_without_hits_routes_to_empty() {
    let merged = merge_partial_results(vec![Some(ShardResult::new("p0"))], &MergeRequest::new(MergePhase::PhaseTwo));
    assert_eq!(merged.route, OutputRoute::Empty);
}

#[test]
fn test_config_tie_break_reaches_doc_merge() {
    let pool = Arena::new();
    let mut merger = ResultMerger::new(MergerConfig::new().dedup_tie_break(DedupTieBreak::LowerClusterWins));
    let inputs = vec![
        Some(ShardResult::new("p0").with_docs(shard_docs(&[5], 4, 1))),
        Some(ShardResult::new("p1").with_docs(shard_docs(&[5], 2, 1))),
    ];

    let merged = merger.merge(inputs, &phase_one().need_dedup(true), &pool);
    assert_eq!(common::clusters(&merged.allocator, &merged.match_docs), vec![2]);
}

#[test]
fn test_traces_are_tagged_with_partition() {
    let tracer = |message: &str| {
        let mut tracer = Tracer::default();
        tracer.info(message);
        tracer
    };
    let inputs = vec![
        Some(ShardResult::new("p0").with_tracer(tracer("seek 10 docs"))),
        Some(ShardResult::new("p1").with_tracer(tracer("seek 3 docs"))),
    ];

    let merged = merge_partial_results(inputs, &phase_one().enable_tracing(true));
    let tracer = merged.tracer.expect("tracing was enabled");
    assert_eq!(tracer.len(), 2);
    assert_eq!(tracer.entries()[1].source, "p1");
}

#[test]
fn test_merge_is_deterministic() {
    let inputs = || {
        vec![
            Some(ShardResult::new("p0").with_docs(shard_docs(&[3, 1, 2], 0, 1))),
            Some(ShardResult::new("p1").with_docs(shard_docs(&[2, 9], 1, 2))),
            Some(ShardResult::new("p2").with_docs(shard_docs(&[9, 4], 2, 2))),
        ]
    };
    let request = phase_one().need_dedup(true);
    let first = merge_partial_results(inputs(), &request);
    let second = merge_partial_results(inputs(), &request);
    assert_eq!(
        primary_keys(&first.allocator, &first.match_docs),
        primary_keys(&second.allocator, &second.match_docs)
    );
    assert_eq!(primary_keys(&first.allocator, &first.match_docs), vec![3, 1, 2, 9, 4]);
}
