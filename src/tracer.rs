//! Per-request trace log
//!
//! A [`Tracer`] collects human-readable trace lines for one request. Shards return
//! their own tracer; when tracing is enabled the merge appends each shard's lines,
//! tagged with the shard's partition, to the merged tracer in shard order.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Verbosity of a trace line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum TraceLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl Display for TraceLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub level: TraceLevel,
    /// Partition that produced the line; empty for lines written by the merge itself
    pub source: String,
    pub message: String,
}

impl Display for TraceEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.source.is_empty() {
            write!(f, "[{}] {}", self.level, self.message)
        } else {
            write!(f, "[{}] {}: {}", self.level, self.source, self.message)
        }
    }
}

/// Ordered trace log with a minimum level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracer {
    level: TraceLevel,
    entries: Vec<TraceEntry>,
}

impl Tracer {
    pub fn new(level: TraceLevel) -> Self {
        Self {
            level,
            entries: Vec::new(),
        }
    }

    pub fn level(&self) -> TraceLevel {
        self.level
    }

    /// Record a line if it is at or above the tracer's level
    pub fn trace(&mut self, level: TraceLevel, message: impl Into<String>) {
        if level >= self.level {
            self.entries.push(TraceEntry {
                level,
                source: String::new(),
                message: message.into(),
            });
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.trace(TraceLevel::Info, message);
    }

    /// Append another tracer's lines, tagging untagged ones with `source`
    pub fn merge(&mut self, other: Tracer, source: &str) {
        let level = self.level;
        self.entries.extend(
            other
                .entries
                .into_iter()
                .filter(|entry| entry.level >= level)
                .map(|mut entry| {
                    if entry.source.is_empty() {
                        entry.source = source.to_string();
                    }
                    entry
                }),
        );
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All lines, one per row
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
