//! Context management for merge API operations
//!
//! This module provides the [`MergeContext`] which holds shared state for all
//! merge operations following the ApiThing pattern. The context owns the merger
//! configuration and a handle to the [`MergeMonitor`] that aggregates per-call
//! metrics. Temporary merge buffers live in an arena scoped to each operation.
//!
//! # Usage Examples
//!
//! ```rust
//! use shardmerge::api::MergeContext;
//! use shardmerge::MergerConfig;
//!
//! let context = MergeContext::new();
//! assert_eq!(context.get_config().max_errors, 100);
//!
//! let config = MergerConfig::new().max_errors(10);
//! let context = MergeContext::with_config(config);
//! assert_eq!(context.get_config().max_errors, 10);
//! ```

use crate::config::MergerConfig;
use crate::error::MergeError;
use crate::monitoring::{MergeMetrics, MergeMonitor};
use std::sync::Arc;

/// Central context object for merge operations following the ApiThing pattern.
///
/// Every operation executed against a context reads its configuration, records
/// its metrics into the shared monitor and leaves the metrics of the most recent
/// call behind for inspection.
///
/// # Thread Safety
///
/// A context is used by one request thread at a time. Several contexts can share
/// one monitor through [`MergeContext::with_monitor`], which is how a server
/// aggregates statistics across request threads.
pub struct MergeContext {
    /// Configuration (can be updated)
    config: MergerConfig,

    /// Process-wide statistics sink
    monitor: Arc<MergeMonitor>,

    /// Metrics of the last completed operation
    last_metrics: Option<MergeMetrics>,

    /// Number of merge operations executed through this context
    operation_count: u64,
}

impl Default for MergeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MergeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeContext")
            .field("config", &self.config)
            .field("last_metrics", &self.last_metrics)
            .field("operation_count", &self.operation_count)
            .finish()
    }
}

impl MergeContext {
    /// Create a new context with default configuration and a private monitor.
    pub fn new() -> Self {
        Self::with_config(MergerConfig::default())
    }

    /// Create a context with the specified configuration.
    ///
    /// The configuration is validated by every operation before it runs, so an
    /// invalid configuration surfaces as an operation error rather than here.
    pub fn with_config(config: MergerConfig) -> Self {
        Self {
            config,
            monitor: Arc::new(MergeMonitor::new()),
            last_metrics: None,
            operation_count: 0,
        }
    }

    /// Share `monitor` with other contexts.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use shardmerge::api::MergeContext;
    /// use shardmerge::monitoring::MergeMonitor;
    ///
    /// let monitor = Arc::new(MergeMonitor::new());
    /// let first = MergeContext::new().with_monitor(Arc::clone(&monitor));
    /// let second = MergeContext::new().with_monitor(Arc::clone(&monitor));
    /// assert!(Arc::ptr_eq(first.monitor(), second.monitor()));
    /// ```
    pub fn with_monitor(mut self, monitor: Arc<MergeMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Get a reference to the current configuration.
    pub fn get_config(&self) -> &MergerConfig {
        &self.config
    }

    /// Replace the configuration after validating it.
    ///
    /// The previous configuration stays in place when validation fails.
    pub fn update_config(&mut self, config: MergerConfig) -> Result<(), MergeError> {
        config.validate()?;
        tracing::debug!("Updating merge configuration: {:?}", config);
        self.config = config;
        Ok(())
    }

    pub fn monitor(&self) -> &Arc<MergeMonitor> {
        &self.monitor
    }

    /// Metrics of the most recent operation, if one has run
    pub fn last_metrics(&self) -> Option<&MergeMetrics> {
        self.last_metrics.as_ref()
    }

    pub fn operation_count(&self) -> u64 {
        self.operation_count
    }

    /// Record a finished operation's metrics in the monitor and keep them as the latest
    pub(crate) fn record_operation(&mut self, metrics: MergeMetrics) {
        self.monitor.record(&metrics);
        self.operation_count += 1;
        self.last_metrics = Some(metrics);
    }
}
