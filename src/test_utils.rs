//! Test utilities for merge engine testing
//!
//! Standardized builders for shard inputs so unit tests across modules describe
//! shards by their keys and tags instead of repeating allocator plumbing.

use crate::aggregate::AggregateResult;
use crate::deduplication::{ShardDocs, PRIMARY_KEY_COLUMN};
use crate::identifiers::ClusterId;
use crate::row_store::{MatchDoc, MatchDocAllocator, ValueType};

/// Column recording the cluster a test row came from
pub const CLUSTER_COLUMN: &str = "cluster";

/// Shard doc list with a `u64` primary key per row and the cluster id stored per row
pub fn shard_docs(keys: &[u64], cluster: u32, version: u64) -> ShardDocs {
    let mut allocator = MatchDocAllocator::new();
    let pk = allocator
        .declare::<u64>(PRIMARY_KEY_COLUMN)
        .unwrap_or_else(|e| panic!("Failed to declare primary key: {}", e));
    let cluster_ref = allocator
        .declare::<u32>(CLUSTER_COLUMN)
        .unwrap_or_else(|e| panic!("Failed to declare cluster column: {}", e));

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

/// Primary keys of `docs`, in order
pub fn primary_keys(allocator: &MatchDocAllocator, docs: &[MatchDoc]) -> Vec<u64> {
    let pk = allocator
        .find_reference::<u64>(PRIMARY_KEY_COLUMN)
        .unwrap_or_else(|| panic!("allocator has no u64 primary key"));
    docs.iter()
        .map(|&doc| *allocator.get(&pk, doc).unwrap_or_else(|| panic!("{} is not live", doc)))
        .collect()
}

/// `user_id` aggregate result with `sum(price)` and `count()` per group
pub fn user_aggregate(rows: &[(&str, i64, i64)]) -> AggregateResult {
    let mut result = AggregateResult::builder("user_id")
        .function("sum", "price", ValueType::Int64)
        .function("count", "", ValueType::Int64)
        .build()
        .unwrap_or_else(|e| panic!("Failed to build aggregate result: {}", e));
    for &(key, sum, count) in rows {
        let row = result.add_group(key);
        result.set_fun_value(row, 0, sum);
        result.set_fun_value(row, 1, count);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_docs_builder() {
        let shard = shard_docs(&[4, 5], 3, 9);
        assert_eq!(shard.len(), 2);
        assert_eq!(shard.cluster_id, ClusterId::new(3));
        assert_eq!(shard.full_index_version, 9);
        assert_eq!(primary_keys(&shard.allocator, &shard.docs), vec![4, 5]);
    }

    #[test]
    fn test_user_aggregate_builder() {
        let result = user_aggregate(&[("user1", 1, 2)]);
        assert!(result.validate(2).is_ok());
        assert_eq!(result.len(), 1);
    }
}
