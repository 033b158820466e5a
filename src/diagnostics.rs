//! Caller-supplied diagnostic sinks.
//!
//! The codecs and the engine never print. Anything a caller may want to show an
//! operator (missing fields, per-run counts) goes through a [`DiagnosticSink`].
//! Internal milestones are additionally emitted as `tracing` events.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Severity of a collected diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
}

/// Receiver for diagnostics produced while reading, reconciling or writing.
pub trait DiagnosticSink {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
}

/// Forwards diagnostics to `tracing` under the `ironrecon` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn info(&self, message: &str) {
        tracing::info!(target: "ironrecon", "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "ironrecon", "{message}");
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
}

/// Keeps every diagnostic in memory, in arrival order.
///
/// Mostly useful in tests:
///
/// ```
/// use ironrecon::diagnostics::{CollectingSink, DiagnosticSink, Level};
///
/// let sink = CollectingSink::default();
/// sink.warn("field mail missing");
/// assert_eq!(sink.messages(Level::Warn), vec!["field mail missing".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct CollectingSink {
    entries: Mutex<Vec<(Level, String)>>,
}

impl CollectingSink {
    fn entries(&self) -> MutexGuard<'_, Vec<(Level, String)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All messages recorded at `level`.
    #[must_use]
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.entries()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Number of recorded messages of any level.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, level: Level, message: &str) {
        self.entries().push((level, message.to_string()));
    }
}

impl DiagnosticSink for CollectingSink {
    fn info(&self, message: &str) {
        self.push(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(Level::Warn, message);
    }
}
