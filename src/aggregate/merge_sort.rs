//! Cross-shard merge of group-by aggregate results
//!
//! Every shard returns one [`AggregateResult`] per group-by dimension. Merging one
//! dimension works in a single canonical allocator:
//!
//! 1. Shards whose group expression differs from the declared one are dropped.
//! 2. The first shard with at least one row becomes canonical.
//! 3. Rows of every later shard are imported into the canonical allocator and the
//!    source shard is consumed.
//! 4. The combined row list is sorted by group key (stable, so earlier shards stay
//!    in front for equal keys).
//! 5. One pass with a write cursor folds each row into the previous row when the
//!    keys match, tombstones the folded row, and truncates the list after the cursor.
//!
//! Before any of that, the aggregation metadata of every shard is validated. A shard
//! whose aggregate list never arrived, has the wrong number of dimensions, or
//! declares the wrong number of functions makes the whole query's aggregation
//! unusable: nothing is merged and an empty set is returned.

use super::aggregate_result::AggregateResult;
use super::result_merger::AggFunResultMerger;
use crate::error::{ErrorCode, MultiErrorResult};
use crate::row_store::{Arena, MatchDoc};
use serde::{Deserialize, Serialize};

/// One declared group-by dimension of a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSpec {
    /// Group-key expression every shard must report verbatim
    pub group_expr: String,
    /// Number of aggregate functions declared for this dimension
    pub fun_count: usize,
}

impl AggregateSpec {
    pub fn new(group_expr: impl Into<String>, fun_count: usize) -> Self {
        Self {
            group_expr: group_expr.into(),
            fun_count,
        }
    }
}

/// Everything the aggregate merge learned besides the merged results
#[derive(Debug, Default)]
pub struct AggregateMergeOutcome {
    /// One merged result per dimension that had a contributing shard, in declaration order
    pub results: Vec<AggregateResult>,
    /// Dropped shards and the reason aggregation was abandoned, if it was
    pub errors: MultiErrorResult,
    /// Whether the metadata check abandoned aggregation for the whole query
    pub abandoned: bool,
    /// Group rows across all consistent input shards
    pub rows_in: usize,
    /// Group rows across all merged results
    pub rows_out: usize,
}

/// Merge every shard's aggregate results, one result per declared dimension
///
/// `inputs[i]` is shard `i`'s aggregate list; `None` means the shard was expected
/// to report aggregation metadata and did not.
pub fn merge_aggregate_results(
    inputs: Vec<Option<Vec<AggregateResult>>>,
    group_exprs: &[AggregateSpec],
    pool: &Arena,
) -> Vec<AggregateResult> {
    merge_aggregate_results_with_outcome(inputs, group_exprs, pool).results
}

/// Same as [`merge_aggregate_results`], keeping the diagnostics
pub fn merge_aggregate_results_with_outcome(
    inputs: Vec<Option<Vec<AggregateResult>>>,
    group_exprs: &[AggregateSpec],
    pool: &Arena,
) -> AggregateMergeOutcome {
    let mut outcome = AggregateMergeOutcome::default();

    if let Err(reason) = validate_metadata(&inputs, group_exprs) {
        tracing::warn!("Abandoning aggregate merge: {}", reason);
        outcome.errors.add(ErrorCode::AggMetadataMismatch, reason);
        outcome.abandoned = true;
        return outcome;
    }

    // Transpose shard-major lists into one column of shard results per dimension.
    let mut per_dimension: Vec<Vec<(usize, AggregateResult)>> = group_exprs.iter().map(|_| Vec::new()).collect();
    for (shard, list) in inputs.into_iter().enumerate() {
        for (dimension, result) in list.into_iter().flatten().enumerate() {
            per_dimension[dimension].push((shard, result));
        }
    }

    for (spec, shards) in group_exprs.iter().zip(per_dimension) {
        let merged = merge_dimension(shards, &spec.group_expr, pool, &mut outcome);
        if let Some(result) = merged {
            outcome.rows_out += result.len();
            outcome.results.push(result);
        }
    }

    tracing::debug!(
        "Merged {} aggregate dimensions: {} rows in, {} rows out",
        outcome.results.len(),
        outcome.rows_in,
        outcome.rows_out
    );
    outcome
}

fn validate_metadata(
    inputs: &[Option<Vec<AggregateResult>>],
    group_exprs: &[AggregateSpec],
) -> std::result::Result<(), String> {
    for (shard, list) in inputs.iter().enumerate() {
        let list = list
            .as_ref()
            .ok_or_else(|| format!("shard {} did not report aggregation metadata", shard))?;
        if list.is_empty() {
            continue;
        }
        if list.len() != group_exprs.len() {
            return Err(format!(
                "shard {} reported {} aggregate dimensions, query declares {}",
                shard,
                list.len(),
                group_exprs.len()
            ));
        }
        for (result, spec) in list.iter().zip(group_exprs) {
            result
                .validate(spec.fun_count)
                .map_err(|e| format!("shard {}: {}", shard, e))?;
        }
    }
    Ok(())
}

/// Merge one dimension's shard results into the first non-empty one
fn merge_dimension(
    shards: Vec<(usize, AggregateResult)>,
    group_expr: &str,
    pool: &Arena,
    outcome: &mut AggregateMergeOutcome,
) -> Option<AggregateResult> {
    let mut consistent = Vec::with_capacity(shards.len());
    for (shard, result) in shards {
        if result.group_expr_str() != group_expr {
            tracing::warn!(
                "Dropping aggregate result of shard {}: group expression '{}' does not match '{}'",
                shard,
                result.group_expr_str(),
                group_expr
            );
            outcome.errors.add(
                ErrorCode::GroupExprMismatch,
                format!("shard {} grouped by '{}'", shard, result.group_expr_str()),
            );
            continue;
        }
        outcome.rows_in += result.len();
        consistent.push((shard, result));
    }

    let canonical_index = match consistent.iter().position(|(_, result)| !result.is_empty()) {
        Some(index) => index,
        // Nothing to merge; an empty but consistent result still describes the dimension.
        None => return consistent.into_iter().next().map(|(_, result)| result),
    };

    let mut rest = consistent.split_off(canonical_index);
    let (_, mut canonical) = rest.remove(0);

    let merger = match AggFunResultMerger::for_result(&canonical) {
        Ok(merger) => merger,
        Err(e) => {
            tracing::warn!("Cannot merge aggregate dimension '{}': {}", group_expr, e);
            outcome.errors.add(ErrorCode::AggMetadataMismatch, e.to_string());
            return None;
        }
    };

    let total_rows = canonical.len() + rest.iter().map(|(_, r)| r.len()).sum::<usize>();
    let mut docs = pool.alloc_doc_buffer(total_rows);
    docs.extend_from_slice(canonical.docs());

    for (shard, result) in rest {
        if result.is_empty() {
            continue;
        }
        let (allocator, source_docs) = result.into_rows();
        match canonical.allocator_mut().merge_allocator(allocator, &source_docs) {
            Ok(imported) => docs.extend(imported),
            Err(e) => {
                tracing::warn!("Dropping aggregate result of shard {}: {}", shard, e);
                outcome
                    .errors
                    .add(ErrorCode::AllocatorMergeFailed, format!("shard {}: {}", shard, e));
            }
        }
    }

    let merged = merge_sorted_rows(&mut canonical, docs, &merger, pool);
    canonical.set_docs(merged);
    Some(canonical)
}

/// Sort rows by group key and fold runs of equal keys into their first row
fn merge_sorted_rows(
    result: &mut AggregateResult,
    mut docs: Vec<MatchDoc>,
    merger: &AggFunResultMerger,
    pool: &Arena,
) -> Vec<MatchDoc> {
    let Some(key) = result.group_key_reference() else {
        return docs;
    };

    {
        let allocator = result.allocator();
        docs.sort_by(|a, b| allocator.get(&key, *a).cmp(&allocator.get(&key, *b)));
    }

    if docs.is_empty() {
        return docs;
    }

    let allocator = result.allocator_mut();
    let mut cursor = 0;
    for next in 1..docs.len() {
        let same_key = allocator.get(&key, docs[cursor]) == allocator.get(&key, docs[next]);
        if same_key {
            merger.merge(allocator, docs[cursor], docs[next], pool);
            allocator.deallocate(docs[next]);
            tracing::trace!("Folded {} into {}", docs[next], docs[cursor]);
        } else {
            cursor += 1;
            docs[cursor] = docs[next];
        }
    }
    docs.truncate(cursor + 1);
    docs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggResultReader;
    use crate::row_store::ValueType;
    use crate::test_utils::user_aggregate as shard;

    fn spec() -> Vec<AggregateSpec> {
        vec![AggregateSpec::new("user_id", 2)]
    }

    #[test]
    fn test_two_shards_same_key() {
        let pool = Arena::new();
        let inputs = vec![
            Some(vec![shard(&[("user1", 4444, 111)])]),
            Some(vec![shard(&[("user1", 4443, 111)])]),
        ];
        let outcome = merge_aggregate_results_with_outcome(inputs, &spec(), &pool);
        assert!(!outcome.abandoned);
        assert_eq!(outcome.rows_in, 2);
        assert_eq!(outcome.rows_out, 1);

        let reader = AggResultReader::new(&outcome.results[0]);
        assert_eq!(reader.get::<i64>("user1", 0), Some(&8887));
        assert_eq!(reader.get::<i64>("user1", 1), Some(&222));
    }

    #[test]
    fn test_cloned_shard_result_is_merged() {
        let pool = Arena::new();
        let result = shard(&[("user1", 4444, 111)]);
        let inputs = vec![Some(vec![result.clone()]), Some(vec![result])];
        let outcome = merge_aggregate_results_with_outcome(inputs, &spec(), &pool);
        assert!(outcome.errors.is_empty());

        let reader = AggResultReader::new(&outcome.results[0]);
        assert_eq!(reader.get::<i64>("user1", 0), Some(&8888));
        assert_eq!(reader.get::<i64>("user1", 1), Some(&222));
    }

    #[test]
    fn test_rows_sorted_and_folded() {
        let pool = Arena::new();
        let inputs = vec![
            Some(vec![shard(&[("c", 1, 1), ("a", 2, 1)])]),
            Some(vec![shard(&[("b", 3, 1), ("a", 4, 1), ("c", 5, 1)])]),
        ];
        let merged = merge_aggregate_results(inputs, &spec(), &pool);
        let result = &merged[0];
        assert_eq!(result.len(), 3);
        assert_eq!(result.allocator().live_count(), 3);

        let reader = AggResultReader::new(result);
        assert_eq!(reader.group_keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(reader.get::<i64>("a", 0), Some(&6));
        assert_eq!(reader.get::<i64>("c", 1), Some(&2));
    }

    #[test]
    fn test_empty_first_shard_is_not_canonical() {
        let pool = Arena::new();
        let inputs = vec![
            Some(vec![shard(&[])]),
            Some(vec![shard(&[("x", 1, 1)])]),
            Some(vec![shard(&[("x", 1, 1)])]),
        ];
        let merged = merge_aggregate_results(inputs, &spec(), &pool);
        let reader = AggResultReader::new(&merged[0]);
        assert_eq!(reader.get::<i64>("x", 1), Some(&2));
    }

    #[test]
    fn test_group_expr_mismatch_drops_shard() {
        let pool = Arena::new();
        let mut other = AggregateResult::builder("region")
            .function("sum", "price", ValueType::Int64)
            .function("count", "", ValueType::Int64)
            .build()
            .unwrap();
        let row = other.add_group("user1");
        other.set_fun_value(row, 0, 100i64);

        let inputs = vec![Some(vec![shard(&[("user1", 1, 1)])]), Some(vec![other])];
        let outcome = merge_aggregate_results_with_outcome(inputs, &spec(), &pool);
        assert_eq!(outcome.errors.count_code(ErrorCode::GroupExprMismatch), 1);
        let reader = AggResultReader::new(&outcome.results[0]);
        assert_eq!(reader.get::<i64>("user1", 0), Some(&1));
    }

    #[test]
    fn test_missing_metadata_abandons_everything() {
        let pool = Arena::new();
        let inputs = vec![Some(vec![shard(&[("user1", 1, 1)])]), None];
        let outcome = merge_aggregate_results_with_outcome(inputs, &spec(), &pool);
        assert!(outcome.abandoned);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.errors.count_code(ErrorCode::AggMetadataMismatch), 1);
    }

    #[test]
    fn test_function_count_mismatch_abandons_everything() {
        let pool = Arena::new();
        let inputs = vec![Some(vec![shard(&[("user1", 1, 1)])])];
        let merged = merge_aggregate_results(inputs, &[AggregateSpec::new("user_id", 3)], &pool);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_empty_list_contributes_nothing() {
        let pool = Arena::new();
        let inputs = vec![Some(Vec::new()), Some(vec![shard(&[("user1", 7, 1)])])];
        let outcome = merge_aggregate_results_with_outcome(inputs, &spec(), &pool);
        assert!(!outcome.abandoned);
        assert_eq!(outcome.results.len(), 1);
    }

    #[test]
    fn test_schema_mismatch_drops_shard() {
        let pool = Arena::new();
        let mut odd = AggregateResult::builder("user_id")
            .function("sum", "price", ValueType::Double)
            .function("count", "", ValueType::Int64)
            .build()
            .unwrap();
        odd.add_group("user1");

        let inputs = vec![Some(vec![shard(&[("user1", 5, 1)])]), Some(vec![odd])];
        let outcome = merge_aggregate_results_with_outcome(inputs, &spec(), &pool);
        assert_eq!(outcome.errors.count_code(ErrorCode::AllocatorMergeFailed), 1);
        let reader = AggResultReader::new(&outcome.results[0]);
        assert_eq!(reader.get::<i64>("user1", 0), Some(&5));
    }
}
