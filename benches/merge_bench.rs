//! Performance benchmarks for the merge engine
//!
//! This benchmark suite covers:
//! - Aggregate merge-sort across shards with overlapping group keys
//! - Match doc re-homing with and without primary-key deduplication
//! - The full phase-one merge
//! - Distinct-count sketch unions

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shardmerge::deduplication::PRIMARY_KEY_COLUMN;
use shardmerge::{
    dedup_match_docs, merge_aggregate_results, merge_partial_results, AggregateResult, AggregateSpec, Arena,
    ClusterId, HllSketch, MatchDocAllocator, MergePhase, MergeRequest, ShardDocs, ShardResult, ValueType,
};

/// Benchmark configuration
struct BenchConfig {
    /// Number of shards per merge
    shard_count: usize,
    /// Rows or group keys per shard
    rows_per_shard: usize,
    /// Fraction of keys every shard shares with the others
    overlap: f64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            shard_count: 8,
            rows_per_shard: 1000,
            overlap: 0.25,
        }
    }
}

/// Keys of one shard: a shared prefix plus keys only this shard holds
fn shard_keys(config: &BenchConfig, shard: usize) -> Vec<u64> {
    let shared = (config.rows_per_shard as f64 * config.overlap) as u64;
    let own = config.rows_per_shard as u64 - shared;
    let start = 1_000_000 * (shard as u64 + 1);
    (0..shared).chain(start..start + own).collect()
}

fn shard_docs(keys: &[u64], cluster: usize) -> ShardDocs {
    let mut allocator = MatchDocAllocator::new();
    let pk = allocator.declare::<u64>(PRIMARY_KEY_COLUMN).unwrap();
    let score = allocator.declare::<f64>("score").unwrap();
    let docs = keys
        .iter()
        .map(|&key| {
            let doc = allocator.allocate();
            pk.set(&mut allocator, doc, key);
            score.set(&mut allocator, doc, key as f64 * 0.5);
            doc
        })
        .collect();
    ShardDocs::new(allocator, docs, ClusterId::new(cluster as u32), 1)
}

fn shard_aggregate(keys: &[u64]) -> AggregateResult {
    let mut result = AggregateResult::builder("user_id")
        .function("sum", "price", ValueType::Int64)
        .function("count", "", ValueType::Int64)
        .function("max", "score", ValueType::Double)
        .build()
        .unwrap();
    for &key in keys {
        let row = result.add_group(&format!("user{}", key));
        result.set_fun_value(row, 0, key as i64);
        result.set_fun_value(row, 1, 1i64);
        result.set_fun_value(row, 2, key as f64);
    }
    result
}

fn bench_aggregate_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_merge");
    let config = BenchConfig::default();
    let dims = vec![AggregateSpec::new("user_id", 3)];

    for shard_count in [2, 4, config.shard_count] {
        let inputs: Vec<_> = (0..shard_count)
            .map(|shard| Some(vec![shard_aggregate(&shard_keys(&config, shard))]))
            .collect();
        group.throughput(Throughput::Elements((shard_count * config.rows_per_shard) as u64));
        group.bench_with_input(BenchmarkId::new("shards", shard_count), &inputs, |b, inputs| {
            b.iter_with_setup(
                || inputs.clone(),
                |inputs| {
                    let pool = Arena::new();
                    black_box(merge_aggregate_results(inputs, &dims, &pool))
                },
            )
        });
    }

    group.finish();
}

fn bench_dedup(c: &mut Criterion) {
    let mut group = c.benchmark_group("dedup_match_docs");
    let config = BenchConfig::default();
    let inputs: Vec<_> = (0..config.shard_count)
        .map(|shard| shard_docs(&shard_keys(&config, shard), shard))
        .collect();
    group.throughput(Throughput::Elements((config.shard_count * config.rows_per_shard) as u64));

    for need_dedup in [false, true] {
        group.bench_with_input(BenchmarkId::new("need_dedup", need_dedup), &inputs, |b, inputs| {
            b.iter_with_setup(
                || inputs.clone(),
                |inputs| {
                    let mut target = MatchDocAllocator::new();
                    black_box(dedup_match_docs(&mut target, need_dedup, inputs))
                },
            )
        });
    }

    group.finish();
}

fn bench_partial_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("partial_merge");
    let config = BenchConfig::default();
    let inputs: Vec<_> = (0..config.shard_count)
        .map(|shard| {
            let keys = shard_keys(&config, shard);
            Some(
                ShardResult::new(format!("partition-{}", shard))
                    .with_docs(shard_docs(&keys, shard))
                    .with_aggregates(vec![shard_aggregate(&keys)])
                    .with_counts(keys.len() as u64, keys.len() as u64)
                    .with_covered_range(ClusterId::new(shard as u32), 0, 65535),
            )
        })
        .collect();
    let request = MergeRequest::new(MergePhase::PhaseOne)
        .need_dedup(true)
        .aggregate("user_id", 3);

    group.throughput(Throughput::Elements(config.shard_count as u64));
    group.bench_function("phase_one", |b| {
        b.iter_with_setup(|| inputs.clone(), |inputs| black_box(merge_partial_results(inputs, &request)))
    });

    group.finish();
}

fn bench_sketch_union(c: &mut Criterion) {
    let mut group = c.benchmark_group("sketch_union");
    let pool = Arena::new();

    for cardinality in [100u64, 10_000, 100_000] {
        let sketches: Vec<HllSketch> = (0..8u64)
            .map(|shard| {
                let mut sketch = HllSketch::default();
                for value in 0..cardinality {
                    sketch.insert_u64(value * 8 + shard);
                }
                sketch
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("cardinality", cardinality), &sketches, |b, sketches| {
            b.iter(|| {
                let mut union = HllSketch::default();
                for sketch in sketches {
                    union.merge(sketch, &pool);
                }
                black_box(union.estimate())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_aggregate_merge,
    bench_dedup,
    bench_partial_merge,
    bench_sketch_union
);
criterion_main!(benches);
