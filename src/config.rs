//! Configuration structures for the merge engine
//!
//! This module provides the configuration system for result merging, including
//! parameter validation and builder pattern implementation. Configuration is built
//! in code; reading it from files is left to the embedding server.

use crate::deduplication::DedupTieBreak;
use crate::error::MergeError;
use crate::sketch::{HllSketch, DEFAULT_EXPLICIT_THRESHOLD, DEFAULT_PRECISION, MAX_PRECISION, MIN_PRECISION};
use serde::{Deserialize, Serialize};

/// Configuration for distinct-count sketches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SketchConfig {
    /// Number of index bits; a full sketch holds `2^precision` registers
    pub precision: u8,
    /// Largest number of hashes kept before switching to registers
    pub explicit_threshold: usize,
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            explicit_threshold: DEFAULT_EXPLICIT_THRESHOLD,
        }
    }
}

impl SketchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the register index bits
    pub fn precision(mut self, precision: u8) -> Self {
        self.precision = precision;
        self
    }

    /// Set the explicit representation threshold
    pub fn explicit_threshold(mut self, threshold: usize) -> Self {
        self.explicit_threshold = threshold;
        self
    }

    /// Validate the sketch configuration
    pub fn validate(&self) -> Result<(), MergeError> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&self.precision) {
            return Err(MergeError::config_error(
                "sketch.precision",
                format!(
                    "value {} is outside the allowed range [{}, {}]",
                    self.precision, MIN_PRECISION, MAX_PRECISION
                ),
                format!("Set precision between {} and {} (default: {})", MIN_PRECISION, MAX_PRECISION, DEFAULT_PRECISION),
            ));
        }

        let registers = 1usize << self.precision;
        if self.explicit_threshold > registers {
            return Err(MergeError::config_error(
                "sketch.explicit_threshold",
                format!(
                    "threshold {} exceeds the {} registers of a full sketch",
                    self.explicit_threshold, registers
                ),
                "Keep explicit_threshold well below 2^precision (default: 160)",
            ));
        }

        Ok(())
    }

    /// Empty sketch with this configuration
    pub fn new_sketch(&self) -> HllSketch {
        HllSketch::new(self.precision, self.explicit_threshold)
    }
}

/// Main configuration for the result merger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergerConfig {
    /// Winner between duplicate rows with equal index versions
    pub dedup_tie_break: DedupTieBreak,
    /// Let shard allocators carry columns the target lacks
    pub allocator_append_only: bool,
    /// Merge per-shard trace logs into the result
    pub enable_tracing: bool,
    /// Settings shards build their distinct-count sketches with
    ///
    /// The merge never creates sketches; it unions whatever the shards send and
    /// folds mismatched precisions down to the lowest one. Shards sharing this
    /// setting avoid the fold.
    pub sketch: SketchConfig,
    /// Maximum number of errors kept in a merged result
    pub max_errors: usize,
    /// Sort phase-two hits by descending score
    pub hit_sort_descending: bool,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            dedup_tie_break: DedupTieBreak::default(),
            allocator_append_only: false,
            enable_tracing: false,
            sketch: SketchConfig::default(),
            max_errors: 100,
            hit_sort_descending: true,
        }
    }
}

impl MergerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dedup_tie_break(mut self, tie_break: DedupTieBreak) -> Self {
        self.dedup_tie_break = tie_break;
        self
    }

    pub fn allocator_append_only(mut self, append_only: bool) -> Self {
        self.allocator_append_only = append_only;
        self
    }

    pub fn enable_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    pub fn sketch(mut self, sketch: SketchConfig) -> Self {
        self.sketch = sketch;
        self
    }

    /// Set the maximum number of errors kept in a merged result
    pub fn max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }

    pub fn hit_sort_descending(mut self, descending: bool) -> Self {
        self.hit_sort_descending = descending;
        self
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<(), MergeError> {
        if self.max_errors == 0 {
            return Err(MergeError::config_error(
                "max_errors",
                "must be greater than 0",
                "Set max_errors to a positive number so shard failures stay visible (default: 100)",
            ));
        }

        self.sketch.validate()
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Self, MergeError> {
        self.validate()?;
        Ok(self)
    }
}
