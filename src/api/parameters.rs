//! Parameter structures for merge API operations
//!
//! This module contains the parameter types for every operation in the merge API.
//! Each parameter structure follows the same pattern:
//! - A `builder()` for incremental construction
//! - A `validate()` run by the operation before it touches any data
//! - Required fields reported through [`MergeError::config_error`] with a suggestion
//!
//! Operations receive their parameters by reference, so shard inputs held here are
//! cloned when an operation runs and the parameters stay reusable.
//!
//! # Parameter Types
//!
//! - [`MergeAggregateResultsParams`]: Per-shard aggregate lists and the declared dimensions
//! - [`DedupMatchDocsParams`]: Per-shard doc lists to re-home and deduplicate
//! - [`MergePartialResultsParams`]: Full shard partial results and the merge request
//! - [`GetMergeStatsParams`]: Monitor statistics query
//!
//! # Usage Examples
//!
//! ```rust
//! use shardmerge::api::parameters::MergePartialResultsParams;
//! use shardmerge::structures::{MergePhase, MergeRequest, ShardResult};
//!
//! let params = MergePartialResultsParams::builder()
//!     .shard(ShardResult::new("partition-0"))
//!     .missing_shard()
//!     .request(MergeRequest::new(MergePhase::PhaseOne))
//!     .build()
//!     .unwrap();
//! assert_eq!(params.shard_count(), 2);
//! ```

use crate::aggregate::{AggregateResult, AggregateSpec};
use crate::deduplication::ShardDocs;
use crate::error::MergeError;
use crate::structures::{MergeRequest, ShardResult};
use rustc_hash::FxHashSet;

fn validate_group_exprs(field: &str, group_exprs: &[AggregateSpec]) -> Result<(), MergeError> {
    let mut seen = FxHashSet::default();
    for (i, spec) in group_exprs.iter().enumerate() {
        if spec.group_expr.trim().is_empty() {
            return Err(MergeError::config_error(
                format!("{}[{}].group_expr", field, i),
                "cannot be empty",
                "Use the group-by expression string the shards were given",
            ));
        }
        if !seen.insert(spec.group_expr.as_str()) {
            return Err(MergeError::config_error(
                format!("{}[{}].group_expr", field, i),
                format!("duplicates dimension '{}'", spec.group_expr),
                "Declare each group-by dimension once",
            ));
        }
    }
    Ok(())
}

/// Parameters for merging aggregate results across shards
#[derive(Debug, Clone)]
pub struct MergeAggregateResultsParams {
    /// Aggregate list per shard; `None` marks a shard that reported no metadata
    pub inputs: Vec<Option<Vec<AggregateResult>>>,
    /// Dimensions the query declared, in order
    pub group_exprs: Vec<AggregateSpec>,
}

impl MergeAggregateResultsParams {
    /// Create a new aggregate merge parameters builder
    pub fn builder() -> MergeAggregateResultsParamsBuilder {
        MergeAggregateResultsParamsBuilder::default()
    }

    /// Create aggregate merge parameters with required fields
    pub fn new(
        inputs: Vec<Option<Vec<AggregateResult>>>,
        group_exprs: Vec<AggregateSpec>,
    ) -> Result<Self, MergeError> {
        let params = Self { inputs, group_exprs };
        params.validate()?;
        Ok(params)
    }

    /// Validate the aggregate merge parameters
    pub fn validate(&self) -> Result<(), MergeError> {
        if self.group_exprs.is_empty() {
            return Err(MergeError::config_error(
                "group_exprs",
                "cannot be empty",
                "Declare at least one dimension with group_expr()",
            ));
        }
        validate_group_exprs("group_exprs", &self.group_exprs)
    }

    pub fn shard_count(&self) -> usize {
        self.inputs.len()
    }
}

/// Builder for MergeAggregateResultsParams
#[derive(Debug, Clone, Default)]
pub struct MergeAggregateResultsParamsBuilder {
    inputs: Vec<Option<Vec<AggregateResult>>>,
    group_exprs: Vec<AggregateSpec>,
}

impl MergeAggregateResultsParamsBuilder {
    /// Add one shard's aggregate list
    pub fn shard(mut self, results: Vec<AggregateResult>) -> Self {
        self.inputs.push(Some(results));
        self
    }

    /// Add a shard that reported no aggregation metadata
    pub fn missing_shard(mut self) -> Self {
        self.inputs.push(None);
        self
    }

    /// Declare the next dimension
    pub fn group_expr(mut self, group_expr: impl Into<String>, fun_count: usize) -> Self {
        self.group_exprs.push(AggregateSpec::new(group_expr, fun_count));
        self
    }

    /// Build the parameters
    pub fn build(self) -> Result<MergeAggregateResultsParams, MergeError> {
        let params = MergeAggregateResultsParams {
            inputs: self.inputs,
            group_exprs: self.group_exprs,
        };
        params.validate()?;
        Ok(params)
    }
}

/// Parameters for re-homing and deduplicating shard doc lists
#[derive(Debug, Clone)]
pub struct DedupMatchDocsParams {
    /// Doc list per shard, in shard order
    pub inputs: Vec<ShardDocs>,
    /// Collapse rows sharing a primary key
    pub need_dedup: bool,
}

impl DedupMatchDocsParams {
    /// Create a new dedup parameters builder
    pub fn builder() -> DedupMatchDocsParamsBuilder {
        DedupMatchDocsParamsBuilder::default()
    }

    pub fn new(inputs: Vec<ShardDocs>, need_dedup: bool) -> Result<Self, MergeError> {
        let params = Self { inputs, need_dedup };
        params.validate()?;
        Ok(params)
    }

    /// Validate the dedup parameters
    ///
    /// Every listed doc must be live in its own shard's allocator.
    pub fn validate(&self) -> Result<(), MergeError> {
        for (shard, input) in self.inputs.iter().enumerate() {
            if let Some(doc) = input.docs.iter().find(|doc| !input.allocator.is_valid(**doc)) {
                return Err(MergeError::config_error(
                    format!("inputs[{}].docs", shard),
                    format!("{} is not live in the shard allocator", doc),
                    "List only docs allocated from the shard's own allocator",
                ));
            }
        }
        Ok(())
    }

    /// Docs across all shards before deduplication
    pub fn total_docs(&self) -> usize {
        self.inputs.iter().map(ShardDocs::len).sum()
    }
}

/// Builder for DedupMatchDocsParams
#[derive(Debug, Clone)]
pub struct DedupMatchDocsParamsBuilder {
    inputs: Vec<ShardDocs>,
    need_dedup: bool,
}

impl Default for DedupMatchDocsParamsBuilder {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            need_dedup: true,
        }
    }
}

impl DedupMatchDocsParamsBuilder {
    /// Add one shard's doc list
    pub fn shard(mut self, docs: ShardDocs) -> Self {
        self.inputs.push(docs);
        self
    }

    /// Set whether duplicate primary keys collapse (default: true)
    pub fn need_dedup(mut self, need_dedup: bool) -> Self {
        self.need_dedup = need_dedup;
        self
    }

    pub fn build(self) -> Result<DedupMatchDocsParams, MergeError> {
        let params = DedupMatchDocsParams {
            inputs: self.inputs,
            need_dedup: self.need_dedup,
        };
        params.validate()?;
        Ok(params)
    }
}

/// Parameters for merging full shard partial results
#[derive(Debug, Clone)]
pub struct MergePartialResultsParams {
    /// Partial result per shard slot; `None` marks a result that never arrived
    pub inputs: Vec<Option<ShardResult>>,
    pub request: MergeRequest,
}

impl MergePartialResultsParams {
    /// Create a new partial merge parameters builder
    pub fn builder() -> MergePartialResultsParamsBuilder {
        MergePartialResultsParamsBuilder::default()
    }

    pub fn new(inputs: Vec<Option<ShardResult>>, request: MergeRequest) -> Result<Self, MergeError> {
        let params = Self { inputs, request };
        params.validate()?;
        Ok(params)
    }

    /// Validate the partial merge parameters
    pub fn validate(&self) -> Result<(), MergeError> {
        validate_group_exprs("request.aggregates", &self.request.aggregates)
    }

    pub fn shard_count(&self) -> usize {
        self.inputs.len()
    }
}

/// Builder for MergePartialResultsParams
#[derive(Debug, Clone, Default)]
pub struct MergePartialResultsParamsBuilder {
    inputs: Vec<Option<ShardResult>>,
    request: Option<MergeRequest>,
}

impl MergePartialResultsParamsBuilder {
    /// Add one shard's partial result
    pub fn shard(mut self, result: ShardResult) -> Self {
        self.inputs.push(Some(result));
        self
    }

    /// Add a shard slot whose result never arrived
    pub fn missing_shard(mut self) -> Self {
        self.inputs.push(None);
        self
    }

    /// Set the merge request
    pub fn request(mut self, request: MergeRequest) -> Self {
        self.request = Some(request);
        self
    }

    /// Build the parameters
    pub fn build(self) -> Result<MergePartialResultsParams, MergeError> {
        let request = self.request.ok_or_else(|| {
            MergeError::config_error(
                "request",
                "is required",
                "Provide the merge request using request()",
            )
        })?;

        let params = MergePartialResultsParams {
            inputs: self.inputs,
            request,
        };
        params.validate()?;
        Ok(params)
    }
}

/// Parameters for reading monitor statistics
#[derive(Debug, Clone, Default)]
pub struct GetMergeStatsParams {
    /// Clear the monitor after reading it
    pub reset: bool,
}

impl GetMergeStatsParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the statistics and clear the monitor afterwards
    pub fn with_reset() -> Self {
        Self { reset: true }
    }

    pub fn validate(&self) -> Result<(), MergeError> {
        Ok(())
    }
}
