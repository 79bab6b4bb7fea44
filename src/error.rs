//! Error types for shard merge operations
//!
//! Two layers of errors live here:
//!
//! - [`MergeError`]: the crate error for API-level failures such as invalid
//!   parameters, invalid configuration, or misuse of the row store.
//! - [`ErrorCode`], [`ErrorResult`] and [`MultiErrorResult`]: data-level error state
//!   that travels inside merge results. A merge never fails because one shard is
//!   bad; the shard is dropped and the problem is recorded here instead.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Main error type for API-level merge operations
#[derive(Debug, Error)]
pub enum MergeError {
    /// Input validation failed
    #[error("Invalid input: {field} - {reason}. {suggestion}")]
    InvalidInput {
        field: String,
        reason: String,
        suggestion: String,
    },

    /// Configuration validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A column was declared or read with a type different from its stored type
    #[error("Type mismatch for column '{name}': expected {expected}, found {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// A column referenced by name does not exist in the allocator
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Two allocators could not be reconciled into one
    #[error("Allocator merge failed: {0}")]
    AllocatorMerge(String),

    /// A MatchDoc handle was used with an allocator that does not own it
    #[error("Invalid match doc: {0}")]
    InvalidMatchDoc(String),

    /// Aggregation metadata is malformed
    #[error("Aggregation error: {0}")]
    Aggregation(String),

    /// Merge orchestration failed
    #[error("Merge error: {0}")]
    Merge(String),
}

impl MergeError {
    /// Create an invalid input error
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a detailed config error
    pub fn config_error(field: impl Into<String>, reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Config(format!("{} - {}: {}", field.into(), reason.into(), suggestion.into()))
    }

    /// Create a type mismatch error
    pub fn type_mismatch(name: impl Into<String>, expected: impl Display, actual: impl Display) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Map this error onto the data-level code used inside merge results
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::AllocatorMerge(_) | Self::TypeMismatch { .. } | Self::InvalidMatchDoc(_) => {
                ErrorCode::AllocatorMergeFailed
            }
            Self::ColumnNotFound(_) => ErrorCode::PrimaryKeyMissing,
            Self::Aggregation(_) => ErrorCode::AggMetadataMismatch,
            Self::InvalidInput { .. } | Self::Config(_) | Self::Merge(_) => ErrorCode::MergeFailed,
        }
    }
}

/// Data-level error codes carried inside merge results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ErrorCode {
    /// No error
    #[default]
    None,
    /// A shard slot never received its partial result
    ShardResultMissing,
    /// The shard flagged its own result as failed
    ShardReportedError,
    /// The shard aggregated on a different group-key expression
    GroupExprMismatch,
    /// Aggregation metadata was missing or did not match the query
    AggMetadataMismatch,
    /// Rows could not be re-homed into the target allocator
    AllocatorMergeFailed,
    /// A shard did not expose a usable primary-key column
    PrimaryKeyMissing,
    /// Every contributing shard reported an error
    AllShardsFailed,
    /// Generic merge failure
    MergeFailed,
}

impl ErrorCode {
    /// Whether this code represents an actual error
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Get a short human-readable description of this code
    pub fn description(&self) -> &'static str {
        match self {
            Self::None => "ok",
            Self::ShardResultMissing => "shard result missing",
            Self::ShardReportedError => "shard reported error",
            Self::GroupExprMismatch => "group key expression mismatch",
            Self::AggMetadataMismatch => "aggregation metadata mismatch",
            Self::AllocatorMergeFailed => "allocator merge failed",
            Self::PrimaryKeyMissing => "primary key reference missing",
            Self::AllShardsFailed => "all shards failed",
            Self::MergeFailed => "merge failed",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// One recorded error, optionally attributed to the partition that caused it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub code: ErrorCode,
    pub message: String,
    pub source_partition: Option<String>,
}

impl ErrorResult {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source_partition: None,
        }
    }

    /// Attribute this error to a partition
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.source_partition = Some(partition.into());
        self
    }
}

impl Display for ErrorResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.source_partition {
            Some(partition) => write!(f, "[{}] {}: {}", partition, self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

/// Ordered collection of errors accumulated while merging
///
/// Errors are never deduplicated; the same code from two shards is two entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiErrorResult {
    errors: Vec<ErrorResult>,
}

impl MultiErrorResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ErrorResult) {
        self.errors.push(error);
    }

    /// Record an error from a code and message
    pub fn add(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.add_error(ErrorResult::new(code, message));
    }

    /// Append all errors of another result, keeping their order
    pub fn merge(&mut self, other: MultiErrorResult) {
        self.errors.extend(other.errors);
    }

    pub fn has_error(&self) -> bool {
        self.errors.iter().any(|e| e.code.is_error())
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ErrorResult] {
        &self.errors
    }

    /// Count recorded errors carrying the given code
    pub fn count_code(&self, code: ErrorCode) -> usize {
        self.errors.iter().filter(|e| e.code == code).count()
    }

    /// Drop everything past the first `max` entries
    pub fn truncate(&mut self, max: usize) {
        self.errors.truncate(max);
    }
}

impl Display for MultiErrorResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}
