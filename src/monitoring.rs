//! Merge metrics and monitoring
//!
//! Every merge call fills one [`MergeMetrics`] accumulator and returns it with the
//! merged result. A [`MergeMonitor`] aggregates those per-call metrics across
//! requests:
//! - Simple counts live in atomic counters and never block
//! - Latency samples sit behind a single `parking_lot` mutex for percentile queries
//!
//! The monitor is `Send + Sync`, so one instance can be shared by all request
//! threads while each merge itself stays single-threaded.

use crate::row_store::ArenaSnapshot;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Maximum number of latency samples the monitor keeps
const MAX_LATENCY_SAMPLES: usize = 1000;

/// Counters collected during one merge call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeMetrics {
    /// Shard slots handed to the merge, including missing ones
    pub shards_seen: usize,
    /// Shards whose result was missing or reported an error
    pub shards_errored: usize,
    /// Shards whose contribution was dropped during a merge step
    pub shards_dropped: usize,
    pub docs_in: usize,
    pub docs_out: usize,
    pub agg_rows_in: usize,
    pub agg_rows_out: usize,
    pub hits_in: usize,
    pub hits_out: usize,
    /// Whether aggregation was abandoned for the whole query
    pub aggregation_abandoned: bool,
    pub duration: Duration,
    /// Arena usage at the end of the call
    #[serde(skip)]
    pub arena: ArenaSnapshot,
}

impl MergeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows removed by deduplication
    pub fn docs_removed(&self) -> usize {
        self.docs_in.saturating_sub(self.docs_out)
    }
}

/// Measures the wall time of one merge call
#[derive(Debug)]
pub struct MergeTimer {
    start: Instant,
}

impl MergeTimer {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Atomic counters for lock-free metric updates
#[derive(Debug, Default)]
pub struct AtomicCounters {
    pub total_merges: AtomicU64,
    pub shards_seen: AtomicU64,
    pub shards_errored: AtomicU64,
    pub shards_dropped: AtomicU64,
    pub docs_in: AtomicU64,
    pub docs_out: AtomicU64,
    pub agg_rows_in: AtomicU64,
    pub agg_rows_out: AtomicU64,
    pub abandoned_aggregations: AtomicU64,
}

/// Aggregated view over every merge recorded so far
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeStats {
    pub total_merges: u64,
    pub shards_seen: u64,
    pub shards_errored: u64,
    pub shards_dropped: u64,
    pub docs_in: u64,
    pub docs_out: u64,
    pub agg_rows_in: u64,
    pub agg_rows_out: u64,
    pub abandoned_aggregations: u64,
    pub latency_p50: Duration,
    pub latency_p95: Duration,
    pub latency_p99: Duration,
    pub uptime: Duration,
}

impl MergeStats {
    /// Share of input docs that survived deduplication
    pub fn dedup_retention(&self) -> f64 {
        if self.docs_in == 0 {
            1.0
        } else {
            self.docs_out as f64 / self.docs_in as f64
        }
    }
}

/// Process-wide aggregate of per-call [`MergeMetrics`]
#[derive(Debug)]
pub struct MergeMonitor {
    counters: AtomicCounters,
    latencies: Mutex<PercentileCalculator>,
    start_time: Instant,
}

impl Default for MergeMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeMonitor {
    pub fn new() -> Self {
        Self {
            counters: AtomicCounters::default(),
            latencies: Mutex::new(PercentileCalculator::new()),
            start_time: Instant::now(),
        }
    }

    /// Fold one call's metrics into the totals
    pub fn record(&self, metrics: &MergeMetrics) {
        let add = |counter: &AtomicU64, value: usize| {
            counter.fetch_add(value as u64, Ordering::Relaxed);
        };
        add(&self.counters.total_merges, 1);
        add(&self.counters.shards_seen, metrics.shards_seen);
        add(&self.counters.shards_errored, metrics.shards_errored);
        add(&self.counters.shards_dropped, metrics.shards_dropped);
        add(&self.counters.docs_in, metrics.docs_in);
        add(&self.counters.docs_out, metrics.docs_out);
        add(&self.counters.agg_rows_in, metrics.agg_rows_in);
        add(&self.counters.agg_rows_out, metrics.agg_rows_out);
        if metrics.aggregation_abandoned {
            add(&self.counters.abandoned_aggregations, 1);
        }

        let mut latencies = self.latencies.lock();
        latencies.add_sample(metrics.duration);
        latencies.truncate_oldest(MAX_LATENCY_SAMPLES);
    }

    pub fn stats(&self) -> MergeStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let mut latencies = self.latencies.lock();
        MergeStats {
            total_merges: load(&self.counters.total_merges),
            shards_seen: load(&self.counters.shards_seen),
            shards_errored: load(&self.counters.shards_errored),
            shards_dropped: load(&self.counters.shards_dropped),
            docs_in: load(&self.counters.docs_in),
            docs_out: load(&self.counters.docs_out),
            agg_rows_in: load(&self.counters.agg_rows_in),
            agg_rows_out: load(&self.counters.agg_rows_out),
            abandoned_aggregations: load(&self.counters.abandoned_aggregations),
            latency_p50: latencies.percentile(0.5),
            latency_p95: latencies.percentile(0.95),
            latency_p99: latencies.percentile(0.99),
            uptime: self.start_time.elapsed(),
        }
    }

    /// Clear all counters and samples
    pub fn reset(&self) {
        for counter in [
            &self.counters.total_merges,
            &self.counters.shards_seen,
            &self.counters.shards_errored,
            &self.counters.shards_dropped,
            &self.counters.docs_in,
            &self.counters.docs_out,
            &self.counters.agg_rows_in,
            &self.counters.agg_rows_out,
            &self.counters.abandoned_aggregations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.latencies.lock().clear();
    }
}

/// Percentiles over a window of duration samples, in insertion order
#[derive(Debug, Clone, Default)]
pub struct PercentileCalculator {
    samples: Vec<Duration>,
}

impl PercentileCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sample(&mut self, duration: Duration) {
        self.samples.push(duration);
    }

    /// Drop the oldest samples until at most `max` remain
    pub fn truncate_oldest(&mut self, max: usize) {
        if self.samples.len() > max {
            let excess = self.samples.len() - max;
            self.samples.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn percentile(&mut self, p: f64) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }

        let mut sorted = self.samples.clone();
        sorted.sort();
        let index = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted[index.min(sorted.len() - 1)]
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
