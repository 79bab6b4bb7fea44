//! Common test utilities for integration tests
//!
//! This module provides shared shard builders for integration tests that cannot
//! access the main crate's test_utils module.

#![allow(dead_code)]

use shardmerge::deduplication::PRIMARY_KEY_COLUMN;
use shardmerge::{AggregateResult, ClusterId, Hit, MatchDoc, MatchDocAllocator, ShardDocs, SketchConfig, ValueType};
use std::ops::Range;

/// Test constants for consistent test configuration across integration tests
pub mod test_constants {
    pub const USER_GROUP_EXPR: &str = "user_id";
    pub const ITEM_GROUP_EXPR: &str = "item_id";
    pub const CLUSTER_COLUMN: &str = "cluster";
    pub const ORIGIN_COLUMN: &str = "origin";
}

/// Doc list of one shard, with a `u64` primary key and the cluster id stored per row
pub fn shard_docs(keys: &[u64], cluster: u32, version: u64) -> ShardDocs {
    let mut allocator = MatchDocAllocator::new();
    let pk = allocator
        .declare::<u64>(PRIMARY_KEY_COLUMN)
        .expect("Failed to declare primary key");
    let cluster_ref = allocator
        .declare::<u32>(test_constants::CLUSTER_COLUMN)
        .expect("Failed to declare cluster column");

    let docs = keys
        .iter()
        .map(|&key| {
            let doc = allocator.allocate();
            pk.set(&mut allocator, doc, key);
            cluster_ref.set(&mut allocator, doc, cluster);
            doc
        })
        .collect();

    ShardDocs::new(allocator, docs, ClusterId::new(cluster), version)
}

/// Like [`shard_docs`], plus an `origin` column telling apart shards that share a cluster
pub fn shard_docs_with_origin(keys: &[u64], cluster: u32, version: u64, origin: u32) -> ShardDocs {
    let mut shard = shard_docs(keys, cluster, version);
    let origin_ref = shard
        .allocator
        .declare::<u32>(test_constants::ORIGIN_COLUMN)
        .expect("Failed to declare origin column");
    for &doc in &shard.docs {
        origin_ref.set(&mut shard.allocator, doc, origin);
    }
    shard
}

/// Origins stored on `docs`, in order
pub fn origins(allocator: &MatchDocAllocator, docs: &[MatchDoc]) -> Vec<u32> {
    let origin = allocator
        .find_reference::<u32>(test_constants::ORIGIN_COLUMN)
        .expect("allocator has no origin column");
    docs.iter()
        .map(|&doc| *allocator.get(&origin, doc).expect("doc is not live"))
        .collect()
}

/// Doc list without a primary key column
pub fn shard_docs_without_key(count: usize, cluster: u32) -> ShardDocs {
    let mut allocator = MatchDocAllocator::new();
    let cluster_ref = allocator
        .declare::<u32>(test_constants::CLUSTER_COLUMN)
        .expect("Failed to declare cluster column");
    let docs = (0..count)
        .map(|_| {
            let doc = allocator.allocate();
            cluster_ref.set(&mut allocator, doc, cluster);
            doc
        })
        .collect();
    ShardDocs::new(allocator, docs, ClusterId::new(cluster), 1)
}

/// Primary keys of `docs`, in order
pub fn primary_keys(allocator: &MatchDocAllocator, docs: &[MatchDoc]) -> Vec<u64> {
    let pk = allocator
        .find_reference::<u64>(PRIMARY_KEY_COLUMN)
        .expect("allocator has no u64 primary key");
    docs.iter()
        .map(|&doc| *allocator.get(&pk, doc).expect("doc is not live"))
        .collect()
}

/// Cluster ids stored on `docs`, in order
pub fn clusters(allocator: &MatchDocAllocator, docs: &[MatchDoc]) -> Vec<u32> {
    let cluster = allocator
        .find_reference::<u32>(test_constants::CLUSTER_COLUMN)
        .expect("allocator has no cluster column");
    docs.iter()
        .map(|&doc| *allocator.get(&cluster, doc).expect("doc is not live"))
        .collect()
}

/// `user_id` result with `sum(price)` and `count()` per group
pub fn user_aggregate(rows: &[(&str, i64, i64)]) -> AggregateResult {
    let mut result = AggregateResult::builder(test_constants::USER_GROUP_EXPR)
        .function("sum", "price", ValueType::Int64)
        .function("count", "", ValueType::Int64)
        .build()
        .expect("Failed to build aggregate result");
    for &(key, sum, count) in rows {
        let row = result.add_group(key);
        result.set_fun_value(row, 0, sum);
        result.set_fun_value(row, 1, count);
    }
    result
}

/// `item_id` result with `max(score)` and `min(score)` per group
pub fn item_aggregate(rows: &[(&str, f64, f64)]) -> AggregateResult {
    let mut result = AggregateResult::builder(test_constants::ITEM_GROUP_EXPR)
        .function("max", "score", ValueType::Double)
        .function("min", "score", ValueType::Double)
        .build()
        .expect("Failed to build aggregate result");
    for &(key, max, min) in rows {
        let row = result.add_group(key);
        result.set_fun_value(row, 0, max);
        result.set_fun_value(row, 1, min);
    }
    result
}

/// `user_id` result with `distinct_count(item)`; each group's sketch holds `values`
pub fn distinct_aggregate(rows: &[(&str, Range<u64>)]) -> AggregateResult {
    distinct_aggregate_with(&SketchConfig::default(), rows)
}

/// Distinct-count result whose sketches are built from `config`, as a shard would
pub fn distinct_aggregate_with(config: &SketchConfig, rows: &[(&str, Range<u64>)]) -> AggregateResult {
    let mut result = AggregateResult::builder(test_constants::USER_GROUP_EXPR)
        .function("distinct_count", "item", ValueType::Sketch)
        .build()
        .expect("Failed to build aggregate result");
    for (key, values) in rows {
        let mut sketch = config.new_sketch();
        for value in values.clone() {
            sketch.insert_u64(value);
        }
        let row = result.add_group(key);
        result.set_fun_value(row, 0, sketch);
    }
    result
}

pub fn hit(cluster: u32, doc: u64, score: f64) -> Hit {
    Hit::new(ClusterId::new(cluster), doc, score)
}
