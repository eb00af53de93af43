//! Logging seam
//!
//! Every warning and error condition is reported through a [`LogSink`] as
//! `(severity, tag, message)`. The default sink forwards to `tracing`;
//! [`MemorySink`] records entries so callers (and tests) can inspect them.

use std::sync::{Mutex, PoisonError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log severity, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Verbose,
    Debug,
    Info,
    Warn,
    Error,
}

/// Receiver of structured log records. Implementations must not panic.
pub trait LogSink: Send + Sync {
    fn log(&self, severity: Severity, tag: &str, message: &str);
}

/// Forwards records to the `tracing` macros, carrying the tag as a field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, severity: Severity, tag: &str, message: &str) {
        match severity {
            Severity::Verbose => tracing::trace!(tag, "{}", message),
            Severity::Debug => tracing::debug!(tag, "{}", message),
            Severity::Info => tracing::info!(tag, "{}", message),
            Severity::Warn => tracing::warn!(tag, "{}", message),
            Severity::Error => tracing::error!(tag, "{}", message),
        }
    }
}

/// A recorded log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub severity: Severity,
    pub tag: String,
    pub message: String,
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of records at exactly `severity`
    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.severity == severity)
            .count()
    }

    /// True if some record at `severity` mentions `needle`
    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|e| e.severity == severity && e.message.contains(needle))
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LogSink for MemorySink {
    fn log(&self, severity: Severity, tag: &str, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogEntry {
                severity,
                tag: tag.to_string(),
                message: message.to_string(),
            });
    }
}

/// Install a global `tracing` subscriber: `debug` when verbose, `info` otherwise.
///
/// Returns false if a global subscriber was already installed.
pub fn init_tracing(verbose: bool) -> bool {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .is_ok()
}
