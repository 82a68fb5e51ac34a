//! Wall-clock timing of named operations.
//!
//! A [`PerformanceMonitor`] is an ordinary value: the editor facade owns one
//! behind an `Arc` and callers may share it. Measuring never fails and never
//! changes the outcome of the measured work.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

const MONITOR_TARGET: &str = "partedit::monitor";

/// Aggregated timings for one operation name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationStats {
    /// Completed measurements.
    pub count: u64,
    /// Sum of all durations.
    pub total: Duration,
    /// Mean duration.
    pub average: Duration,
    /// Shortest duration.
    pub min: Duration,
    /// Longest duration.
    pub max: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Metric {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

impl Metric {
    const fn first(duration: Duration) -> Self {
        Self {
            count: 1,
            total: duration,
            min: duration,
            max: duration,
        }
    }

    fn update(&mut self, duration: Duration) {
        self.count = self.count.saturating_add(1);
        self.total = self.total.saturating_add(duration);
        self.min = self.min.min(duration);
        self.max = self.max.max(duration);
    }

    fn stats(&self) -> OperationStats {
        let average = u32::try_from(self.count)
            .ok()
            .and_then(|count| self.total.checked_div(count))
            .unwrap_or_else(|| {
                let nanos = self.total.as_nanos() / u128::from(self.count.max(1));
                Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
            });
        OperationStats {
            count: self.count,
            total: self.total,
            average,
            min: self.min,
            max: self.max,
        }
    }
}

/// Running count, total, minimum, and maximum per operation name.
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    metrics: Mutex<HashMap<String, Metric>>,
}

impl PerformanceMonitor {
    /// Creates an empty monitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts timing `name`; the measurement is recorded when the guard drops.
    #[must_use = "the measurement ends when the guard is dropped"]
    pub fn measure(&self, name: impl Into<String>) -> Measurement<'_> {
        Measurement {
            monitor: self,
            name: name.into(),
            started: Instant::now(),
        }
    }

    /// Times `work` under `name` and returns its result.
    pub fn time<T>(&self, name: impl Into<String>, work: impl FnOnce() -> T) -> T {
        let _measurement = self.measure(name);
        work()
    }

    /// Adds one measurement of `duration` under `name`.
    pub fn record(&self, name: &str, duration: Duration) {
        trace!(
            target: MONITOR_TARGET,
            operation = name,
            elapsed_us = duration.as_micros(),
            "operation timed"
        );
        let mut metrics = self.lock();
        match metrics.get_mut(name) {
            Some(metric) => metric.update(duration),
            None => {
                metrics.insert(name.to_owned(), Metric::first(duration));
            }
        }
    }

    /// Statistics for `name`, or `None` if it was never measured.
    #[must_use]
    pub fn stats(&self, name: &str) -> Option<OperationStats> {
        self.lock().get(name).map(Metric::stats)
    }

    /// Statistics for every measured operation, ordered by name.
    #[must_use]
    pub fn all_stats(&self) -> BTreeMap<String, OperationStats> {
        self.lock()
            .iter()
            .map(|(name, metric)| (name.clone(), metric.stats()))
            .collect()
    }

    /// Forgets every measurement.
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Metric>> {
        // A panic while holding the guard cannot leave a metric half-updated
        // in a way that matters for reporting.
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Guard returned by [`PerformanceMonitor::measure`].
#[derive(Debug)]
pub struct Measurement<'a> {
    monitor: &'a PerformanceMonitor,
    name: String,
    started: Instant,
}

impl Measurement<'_> {
    /// Time elapsed so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for Measurement<'_> {
    fn drop(&mut self) {
        self.monitor.record(&self.name, self.started.elapsed());
    }
}
