//! Primary-key deduplication of shard match docs
//!
//! Each shard hands over its own allocator together with the rows it matched and
//! the `(cluster, version)` tags of the index that produced them. The deduper
//! re-homes every shard's rows into one target allocator and, when asked and
//! possible, keeps a single row per primary key.
//!
//! # Key Features
//!
//! - **Runtime key dispatch**: the primary-key column may be `u32`, `u64`, `i64`,
//!   a 128-bit hash or a string; one generic routine serves all of them
//! - **Deterministic winners**: the newer index version always wins, and equal
//!   versions fall to a configurable [`DedupTieBreak`]
//! - **Stable order**: output follows shard order, then row order; a replacing
//!   winner takes over the position of the row it beat
//! - **Partial failure**: a shard whose allocator cannot be reconciled with the
//!   target is dropped and reported through the returned [`ErrorCode`]
//!
//! # Usage Examples
//!
//! ```rust
//! use shardmerge::deduplication::{dedup_match_docs, ShardDocs, PRIMARY_KEY_COLUMN};
//! use shardmerge::error::ErrorCode;
//! use shardmerge::identifiers::ClusterId;
//! use shardmerge::row_store::MatchDocAllocator;
//!
//! # fn shard(keys: &[u64]) -> shardmerge::Result<ShardDocs> {
//! #     let mut allocator = MatchDocAllocator::new();
//! #     let pk = allocator.declare::<u64>(PRIMARY_KEY_COLUMN)?;
//! #     let docs = keys.iter().map(|&k| {
//! #         let doc = allocator.allocate();
//! #         pk.set(&mut allocator, doc, k);
//! #         doc
//! #     }).collect();
//! #     Ok(ShardDocs::new(allocator, docs, ClusterId::new(0), 1))
//! # }
//! let mut target = MatchDocAllocator::new();
//! let inputs = vec![shard(&[1, 2])?, shard(&[3, 4, 1])?];
//!
//! let (code, docs) = dedup_match_docs(&mut target, true, inputs);
//! assert_eq!(code, ErrorCode::None);
//! assert_eq!(docs.len(), 4);
//! # Ok::<(), shardmerge::error::MergeError>(())
//! ```

use crate::error::ErrorCode;
use crate::identifiers::ClusterId;
use crate::row_store::{ColumnType, MatchDoc, MatchDocAllocator, ValueType};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::hash::Hash;

/// Name of the primary-key column shards declare when their docs can be deduplicated
pub const PRIMARY_KEY_COLUMN: &str = "__primary_key";

/// Winner between two rows with the same primary key and the same index version
///
/// A newer `full_index_version` always wins before the tie-break is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DedupTieBreak {
    /// Keep the row seen first in shard order
    #[default]
    FirstSeenWins,

    /// Replace with the row seen last in shard order
    LastSeenWins,

    /// Keep the row from the lower cluster id; first seen on equal clusters
    LowerClusterWins,
}

impl DedupTieBreak {
    pub fn description(&self) -> &'static str {
        match self {
            Self::FirstSeenWins => "First seen row wins",
            Self::LastSeenWins => "Last seen row wins",
            Self::LowerClusterWins => "Row from the lower cluster wins",
        }
    }
}

/// Counters kept by a [`MatchDocDeduper`] across its passes
///
/// Every re-homed row is either kept or dropped as a primary-key duplicate.
/// Duplicates are split by what decided them: a newer `full_index_version`, or
/// the [`DedupTieBreak`] when versions are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeduplicationStats {
    /// Rows re-homed into the target allocator
    pub rows_in: usize,
    /// Rows in the output
    pub rows_out: usize,
    /// Rows tombstoned because another row had the same primary key
    pub duplicates_removed: usize,
    /// Duplicates settled by the index version
    pub resolved_by_version: usize,
    /// Duplicates settled by the tie-break policy
    pub resolved_by_tie_break: usize,
    /// Passes that concatenated rows, because dedup was off or no common primary key exists
    pub concatenated_passes: usize,
    /// Shards whose rows could not be re-homed
    pub shards_dropped: usize,
}

impl DeduplicationStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of re-homed rows that survived; 1.0 before any row was seen
    pub fn retention(&self) -> f64 {
        if self.rows_in == 0 {
            1.0
        } else {
            self.rows_out as f64 / self.rows_in as f64
        }
    }

    fn record_dedup_pass(&mut self, rows_in: usize, rows_out: usize) {
        self.rows_in += rows_in;
        self.rows_out += rows_out;
        self.duplicates_removed += rows_in.saturating_sub(rows_out);
    }

    fn record_concatenation(&mut self, rows: usize) {
        self.rows_in += rows;
        self.rows_out += rows;
        self.concatenated_passes += 1;
    }
}

/// One shard's matched docs, consumed by the merge
#[derive(Debug, Clone)]
pub struct ShardDocs {
    pub allocator: MatchDocAllocator,
    pub docs: Vec<MatchDoc>,
    pub cluster_id: ClusterId,
    pub full_index_version: u64,
}

impl ShardDocs {
    pub fn new(allocator: MatchDocAllocator, docs: Vec<MatchDoc>, cluster_id: ClusterId, full_index_version: u64) -> Self {
        Self {
            allocator,
            docs,
            cluster_id,
            full_index_version,
        }
    }

    /// Kind of the primary-key column, if the shard declares one
    pub fn primary_key_type(&self) -> Option<ValueType> {
        self.allocator
            .find_reference_without_type(PRIMARY_KEY_COLUMN)
            .map(|reference| reference.value_type())
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Scalar column types usable as a primary key
pub trait PrimaryKey: ColumnType + Eq + Hash {}

impl PrimaryKey for u32 {}
impl PrimaryKey for u64 {}
impl PrimaryKey for i64 {}
impl PrimaryKey for u128 {}
impl PrimaryKey for String {}

fn is_primary_key_type(value_type: ValueType) -> bool {
    matches!(
        value_type,
        ValueType::UInt32 | ValueType::UInt64 | ValueType::Int64 | ValueType::Hash128 | ValueType::String
    )
}

/// A row already living in the target allocator, with the tags of its shard
#[derive(Debug, Clone, Copy)]
struct TaggedDoc {
    doc: MatchDoc,
    cluster_id: ClusterId,
    version: u64,
}

/// Merges shard doc lists into one allocator, deduplicating by primary key
#[derive(Debug, Clone, Default)]
pub struct MatchDocDeduper {
    tie_break: DedupTieBreak,
    append_only: bool,
    stats: DeduplicationStats,
}

impl MatchDocDeduper {
    pub fn new(tie_break: DedupTieBreak, append_only: bool) -> Self {
        Self {
            tie_break,
            append_only,
            stats: DeduplicationStats::new(),
        }
    }

    pub fn tie_break(&self) -> DedupTieBreak {
        self.tie_break
    }

    pub fn append_only(&self) -> bool {
        self.append_only
    }

    pub fn stats(&self) -> &DeduplicationStats {
        &self.stats
    }

    /// Shards dropped because their rows could not be re-homed
    pub fn dropped_shards(&self) -> usize {
        self.stats.shards_dropped
    }

    pub fn reset(&mut self) {
        self.stats = DeduplicationStats::new();
    }

    /// Whether every shard declares a primary key of one common supported type
    pub fn can_dedup(inputs: &[ShardDocs]) -> bool {
        Self::common_primary_key_type(inputs).is_some()
    }

    fn common_primary_key_type(inputs: &[ShardDocs]) -> Option<ValueType> {
        let mut common = None;
        for shard in inputs {
            let value_type = shard.primary_key_type().filter(|t| is_primary_key_type(*t))?;
            match common {
                None => common = Some(value_type),
                Some(existing) if existing != value_type => return None,
                Some(_) => {}
            }
        }
        common
    }

    /// Re-home all shards' rows into `target`, deduplicating when asked and possible
    ///
    /// Returns the surviving rows, all owned by `target`, and the first error code
    /// raised along the way. Losing rows are tombstoned in `target`.
    pub fn dedup(
        &mut self,
        target: &mut MatchDocAllocator,
        need_dedup: bool,
        inputs: Vec<ShardDocs>,
    ) -> (ErrorCode, Vec<MatchDoc>) {
        let mut code = ErrorCode::None;

        let key_type = if need_dedup {
            let key_type = Self::common_primary_key_type(&inputs);
            if key_type.is_none() && !inputs.is_empty() {
                tracing::warn!(
                    "Primary key '{}' missing or inconsistent across {} shards, merging without dedup",
                    PRIMARY_KEY_COLUMN,
                    inputs.len()
                );
                code = ErrorCode::PrimaryKeyMissing;
            }
            key_type
        } else {
            None
        };

        let (rehome_code, rows) = self.rehome(target, inputs);
        if !code.is_error() {
            code = rehome_code;
        }

        let docs = match key_type {
            Some(ValueType::UInt32) => self.typed_dedup::<u32>(target, rows),
            Some(ValueType::UInt64) => self.typed_dedup::<u64>(target, rows),
            Some(ValueType::Int64) => self.typed_dedup::<i64>(target, rows),
            Some(ValueType::Hash128) => self.typed_dedup::<u128>(target, rows),
            Some(ValueType::String) => self.typed_dedup::<String>(target, rows),
            _ => self.no_dedup_merge(rows),
        };
        (code, docs)
    }

    /// Import every shard's rows in shard order, dropping shards that do not fit
    fn rehome(&mut self, target: &mut MatchDocAllocator, inputs: Vec<ShardDocs>) -> (ErrorCode, Vec<TaggedDoc>) {
        let mut code = ErrorCode::None;
        let mut rows = Vec::with_capacity(inputs.iter().map(ShardDocs::len).sum());

        for (index, shard) in inputs.into_iter().enumerate() {
            if shard.is_empty() {
                continue;
            }
            let ShardDocs {
                allocator,
                docs,
                cluster_id,
                full_index_version,
            } = shard;

            let imported = if self.append_only {
                target.append_allocator(allocator, &docs)
            } else {
                target.merge_allocator(allocator, &docs)
            };

            match imported {
                Ok(imported) => rows.extend(imported.into_iter().map(|doc| TaggedDoc {
                    doc,
                    cluster_id,
                    version: full_index_version,
                })),
                Err(e) => {
                    tracing::warn!("Dropping match docs of shard {} ({}): {}", index, cluster_id, e);
                    self.stats.shards_dropped += 1;
                    if !code.is_error() {
                        code = ErrorCode::AllocatorMergeFailed;
                    }
                }
            }
        }
        (code, rows)
    }

    /// Keep one row per primary key
    fn typed_dedup<PK: PrimaryKey>(&mut self, target: &mut MatchDocAllocator, rows: Vec<TaggedDoc>) -> Vec<MatchDoc> {
        let Some(reference) = target.find_reference::<PK>(PRIMARY_KEY_COLUMN) else {
            return self.no_dedup_merge(rows);
        };

        let processed = rows.len();
        let mut winners: FxHashMap<PK, usize> = FxHashMap::default();
        let mut output: Vec<TaggedDoc> = Vec::with_capacity(rows.len());

        for row in rows {
            let Some(key) = target.get(&reference, row.doc).cloned() else {
                continue;
            };
            match winners.entry(key) {
                Entry::Vacant(entry) => {
                    entry.insert(output.len());
                    output.push(row);
                }
                Entry::Occupied(entry) => {
                    let position = *entry.get();
                    if output[position].version == row.version {
                        self.stats.resolved_by_tie_break += 1;
                    } else {
                        self.stats.resolved_by_version += 1;
                    }
                    let loser = if self.challenger_wins(&output[position], &row) {
                        std::mem::replace(&mut output[position], row)
                    } else {
                        row
                    };
                    target.deallocate(loser.doc);
                    tracing::trace!("Dropped duplicate {} from {}", loser.doc, loser.cluster_id);
                }
            }
        }

        self.stats.record_dedup_pass(processed, output.len());
        tracing::debug!(
            "Deduplicated {} rows to {} by {} primary key",
            processed,
            output.len(),
            PK::VALUE_TYPE
        );
        output.into_iter().map(|row| row.doc).collect()
    }

    fn no_dedup_merge(&mut self, rows: Vec<TaggedDoc>) -> Vec<MatchDoc> {
        self.stats.record_concatenation(rows.len());
        rows.into_iter().map(|row| row.doc).collect()
    }

    fn challenger_wins(&self, incumbent: &TaggedDoc, challenger: &TaggedDoc) -> bool {
        if challenger.version != incumbent.version {
            return challenger.version > incumbent.version;
        }
        match self.tie_break {
            DedupTieBreak::FirstSeenWins => false,
            DedupTieBreak::LastSeenWins => true,
            DedupTieBreak::LowerClusterWins => challenger.cluster_id < incumbent.cluster_id,
        }
    }
}

/// Merge shard doc lists into `target` with the default tie-break and strict schemas
pub fn dedup_match_docs(
    target: &mut MatchDocAllocator,
    need_dedup: bool,
    inputs: Vec<ShardDocs>,
) -> (ErrorCode, Vec<MatchDoc>) {
    MatchDocDeduper::default().dedup(target, need_dedup, inputs)
}
