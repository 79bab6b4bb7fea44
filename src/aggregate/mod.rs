//! Group-by aggregation merge
//!
//! - [`fun_merger`]: per-function value mergers (sum, max, min, count, distinct count)
//! - [`result_merger`]: applies a row's function mergers in declaration order
//! - [`aggregate_result`]: one dimension's group key → row set and its typed reader
//! - [`merge_sort`]: cross-shard merge of aggregate results

pub mod aggregate_result;
pub mod fun_merger;
pub mod merge_sort;
pub mod result_merger;

pub use aggregate_result::{AggResultReader, AggregateResult, AggregateResultBuilder, GROUP_KEY_COLUMN};
pub use fun_merger::{create_agg_fun_merger, AggFunKind, AggFunMerger, NumericValue};
pub use merge_sort::{merge_aggregate_results, merge_aggregate_results_with_outcome, AggregateMergeOutcome, AggregateSpec};
pub use result_merger::AggFunResultMerger;
