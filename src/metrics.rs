//! Run metrics for reconciliation jobs.
//!
//! A [`MetricsCollector`] gathers named metrics for one or more runs and
//! renders them as JSON. [`MetricsCollector::record_stats`] folds a run's
//! [`ReconcileStats`] into counters named `records_processed`,
//! `records_created`, `records_updated`, `records_deleted`,
//! `records_unchanged`, `chunks_merged`, `old_records` and `new_records`, so
//! several runs can be accumulated into one report.
//!
//! # Example
//!
//! ```
//! use ironrecon::metrics::{GaugeMetric, MetricsCollector};
//! use ironrecon::reconcile::ReconcileStats;
//!
//! let mut metrics = MetricsCollector::new();
//! metrics.record_start();
//! metrics.record_stats(&ReconcileStats { processed: 3, created: 1, updated: 1, deleted: 1, ..Default::default() });
//! metrics.record_end();
//! metrics.register(Box::new(GaugeMetric::new("input_mb", 1.5)));
//!
//! assert_eq!(metrics.counter("records_processed"), Some(3));
//! assert!(metrics.to_json()["execution_time_ms"]["value"].is_number());
//! ```

use crate::io::atomic::write_atomic;
use crate::reconcile::ReconcileStats;
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A named value that can be reported.
pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    fn value(&self) -> Value;

    fn description(&self) -> Option<&str> {
        None
    }

    /// Current count, for counter-like metrics.
    fn as_counter(&self) -> Option<u64> {
        None
    }
}

/// Shared, thread-safe metric registry.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    metrics: HashMap<String, Box<dyn Metric>>,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
    runs: u64,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `metric`, replacing any metric of the same name.
    pub fn register(&mut self, metric: Box<dyn Metric>) {
        self.lock().metrics.insert(metric.name().to_string(), metric);
    }

    pub fn record_start(&self) {
        self.lock().start_time = Some(Instant::now());
    }

    pub fn record_end(&self) {
        self.lock().end_time = Some(Instant::now());
    }

    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.lock();
        match (inner.start_time, inner.end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// Add `value` to the counter `name`, creating it at zero first.
    pub fn increment_counter(&self, name: &str, value: u64) {
        let mut inner = self.lock();
        let current = inner
            .metrics
            .get(name)
            .and_then(|m| m.as_counter())
            .unwrap_or(0);
        inner.metrics.insert(
            name.to_string(),
            Box::new(CounterMetric::with_value(name, current + value)),
        );
    }

    /// Current value of counter `name`.
    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.lock().metrics.get(name).and_then(|m| m.as_counter())
    }

    /// Accumulate one run's counts.
    pub fn record_stats(&self, stats: &ReconcileStats) {
        for (name, value) in [
            ("records_processed", stats.processed),
            ("records_created", stats.created),
            ("records_updated", stats.updated),
            ("records_deleted", stats.deleted),
            ("records_unchanged", stats.unchanged),
            ("chunks_merged", stats.chunks_merged),
            ("old_records", stats.old_records),
            ("new_records", stats.new_records),
        ] {
            self.increment_counter(name, value);
        }
        self.lock().runs += 1;
    }

    /// Number of runs folded in by [`record_stats`](Self::record_stats).
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.lock().runs
    }

    /// All metrics as a JSON object of `{ "value": .., "description": .. }`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let inner = self.lock();
        let mut out = serde_json::Map::new();
        for (name, metric) in &inner.metrics {
            let mut obj = serde_json::Map::new();
            obj.insert("value".to_string(), metric.value());
            if let Some(desc) = metric.description() {
                obj.insert("description".to_string(), json!(desc));
            }
            out.insert(name.clone(), Value::Object(obj));
        }
        if inner.runs > 0 {
            out.insert("runs".to_string(), json!({ "value": inner.runs }));
        }
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            out.insert(
                "execution_time_ms".to_string(),
                json!({
                    "value": end.duration_since(start).as_millis(),
                    "description": "Wall time between record_start and record_end in milliseconds",
                }),
            );
        }
        Value::Object(out)
    }

    /// Emit every metric as a `tracing` info event.
    pub fn log(&self) {
        let inner = self.lock();
        let mut names: Vec<&String> = inner.metrics.keys().collect();
        names.sort();
        for name in names {
            let value = inner.metrics[name].value();
            tracing::info!(target: "ironrecon", metric = %name, %value, "run metric");
        }
    }

    /// Write [`to_json`](Self::to_json), pretty-printed, to `path`.
    ///
    /// # Errors
    /// Fails if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        write_atomic(path, |w| {
            w.write_all(formatted.as_bytes())?;
            Ok(())
        })
        .with_context(|| format!("save metrics to {}", path.display()))
    }

    /// Name → value of every registered metric.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.lock()
            .metrics
            .iter()
            .map(|(name, metric)| (name.clone(), metric.value()))
            .collect()
    }
}

/// Monotonic count.
pub struct CounterMetric {
    name: String,
    count: u64,
}

impl CounterMetric {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_value(name, 0)
    }

    pub fn with_value(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

impl Metric for CounterMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.count)
    }

    fn as_counter(&self) -> Option<u64> {
        Some(self.count)
    }
}

/// A single numeric reading.
pub struct GaugeMetric {
    name: String,
    value: f64,
    description: Option<String>,
}

impl GaugeMetric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Metric for GaugeMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.value)
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_accumulate_across_runs() {
        let m = MetricsCollector::new();
        let stats = ReconcileStats {
            processed: 4,
            created: 1,
            updated: 2,
            unchanged: 1,
            chunks_merged: 3,
            ..Default::default()
        };
        m.record_stats(&stats);
        m.record_stats(&stats);
        assert_eq!(m.counter("records_processed"), Some(8));
        assert_eq!(m.counter("records_updated"), Some(4));
        assert_eq!(m.counter("records_deleted"), Some(0));
        assert_eq!(m.runs(), 2);
        assert_eq!(m.to_json()["runs"]["value"], json!(2));
    }

    #[test]
    fn gauges_are_not_counters() {
        let mut m = MetricsCollector::new();
        m.register(Box::new(GaugeMetric::new("ratio", 0.5).with_description("share")));
        assert_eq!(m.counter("ratio"), None);
        assert_eq!(m.to_json()["ratio"]["description"], json!("share"));
        m.increment_counter("ratio", 2);
        assert_eq!(m.counter("ratio"), Some(2));
    }

    #[test]
    fn saves_pretty_json() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("metrics.json");
        let m = MetricsCollector::new();
        m.increment_counter("records_created", 5);
        m.save_to_file(&path)?;
        let v: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(v["records_created"]["value"], json!(5));
        Ok(())
    }
}
