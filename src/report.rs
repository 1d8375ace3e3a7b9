//! Report sinks.
//!
//! A [`Document`](crate::Document) sends human-readable notes about what it did to a
//! caller-supplied [`Report`]: unknown signatures, misaligned structs, members that
//! could not be matched, dropped duplicate chunks. The default sink forwards to the
//! `log` facade.

use std::sync::Mutex;

use serde::Serialize;

/// Severity of a report message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ReportLevel {
    /// Per-member and per-chunk detail.
    Debug,
    /// Summary of a completed step.
    Info,
    /// Recoverable drift, such as a misaligned struct.
    Warning,
    /// The operation failed.
    Error,
}

/// Receives report messages.
pub trait Report: Send + Sync {
    /// Handles one message.
    fn report(&self, level: ReportLevel, message: &str);
}

/// Forwards every message to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReport;

impl Report for LogReport {
    fn report(&self, level: ReportLevel, message: &str) {
        match level {
            ReportLevel::Debug => log::debug!("{message}"),
            ReportLevel::Info => log::info!("{message}"),
            ReportLevel::Warning => log::warn!("{message}"),
            ReportLevel::Error => log::error!("{message}"),
        }
    }
}

/// Discards every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReport;

impl Report for NullReport {
    fn report(&self, _level: ReportLevel, _message: &str) {}
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct CollectReport {
    entries: Mutex<Vec<(ReportLevel, String)>>,
}

impl CollectReport {
    /// An empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of all messages received so far.
    pub fn entries(&self) -> Vec<(ReportLevel, String)> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Number of messages at `level`.
    pub fn count(&self, level: ReportLevel) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }

    /// True if any message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .any(|(_, m)| m.contains(needle))
    }

    /// Forgets all messages.
    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

impl Report for CollectReport {
    fn report(&self, level: ReportLevel, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((level, message.to_string()));
    }
}
