//! Runtime statistics for the update loop and bulb dispatch.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::warn;
use serde::{Deserialize, Serialize};

/// Sink for loop ticks and operation timings.
///
/// The coordinator calls [`StatsSink::record_update`] once per tick and
/// [`StatsSink::record_timing`] around every dispatched bulb command.
/// Implementations should be cheap; a panicking sink is contained and only
/// logged.
pub trait StatsSink: Send + Sync {
    fn record_update(&self);

    fn record_timing(&self, operation: &str, elapsed: Duration);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn record_update(&self) {}

    fn record_timing(&self, _operation: &str, _elapsed: Duration) {}
}

/// In-memory statistics: tick count, tick rate, and per-operation timings.
#[derive(Debug)]
pub struct RuntimeStats {
    inner: Mutex<StatsInner>,
}

#[derive(Debug)]
struct StatsInner {
    start_time: Instant,
    updates: u64,
    timings: HashMap<String, Timing>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Timing {
    count: u64,
    total: Duration,
    max: Duration,
}

impl Default for RuntimeStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeStats {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                start_time: Instant::now(),
                updates: 0,
                timings: HashMap::new(),
            }),
        }
    }

    pub fn updates(&self) -> u64 {
        self.lock().updates
    }

    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.start_time = Instant::now();
        inner.updates = 0;
        inner.timings.clear();
    }

    pub fn summary(&self) -> StatsSummary {
        let inner = self.lock();
        let uptime = inner.start_time.elapsed().as_secs_f64();
        let mut operations: Vec<OperationSummary> = inner
            .timings
            .iter()
            .map(|(name, t)| OperationSummary {
                name: name.clone(),
                count: t.count,
                avg_ms: t.total.as_secs_f64() * 1000.0 / t.count.max(1) as f64,
                max_ms: t.max.as_secs_f64() * 1000.0,
            })
            .collect();
        operations.sort_by(|a, b| a.name.cmp(&b.name));

        StatsSummary {
            updates: inner.updates,
            uptime_secs: uptime,
            updates_per_second: if uptime > 0.0 {
                inner.updates as f64 / uptime
            } else {
                0.0
            },
            operations,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatsSink for RuntimeStats {
    fn record_update(&self) {
        self.lock().updates += 1;
    }

    fn record_timing(&self, operation: &str, elapsed: Duration) {
        let mut inner = self.lock();
        let timing = inner.timings.entry(operation.to_string()).or_default();
        timing.count += 1;
        timing.total += elapsed;
        timing.max = timing.max.max(elapsed);
    }
}

/// Snapshot of [`RuntimeStats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSummary {
    pub updates: u64,
    pub uptime_secs: f64,
    pub updates_per_second: f64,
    pub operations: Vec<OperationSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSummary {
    pub name: String,
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

/// Run a sink call, containing any panic so it cannot take the loop down.
pub(crate) fn observe(f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!("Stats sink panicked; ignoring");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_updates() {
        let stats = RuntimeStats::new();
        for _ in 0..3 {
            stats.record_update();
        }
        assert_eq!(stats.updates(), 3);
        assert_eq!(stats.summary().updates, 3);
    }

    #[test]
    fn test_record_timing() {
        let stats = RuntimeStats::new();
        stats.record_timing("set_color", Duration::from_millis(10));
        stats.record_timing("set_color", Duration::from_millis(30));

        let summary = stats.summary();
        assert_eq!(summary.operations.len(), 1);
        let op = &summary.operations[0];
        assert_eq!(op.name, "set_color");
        assert_eq!(op.count, 2);
        assert!((op.avg_ms - 20.0).abs() < 1e-6);
        assert!((op.max_ms - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_reset() {
        let stats = RuntimeStats::new();
        stats.record_update();
        stats.record_timing("status", Duration::from_millis(1));
        stats.reset();
        let summary = stats.summary();
        assert_eq!(summary.updates, 0);
        assert!(summary.operations.is_empty());
    }

    #[test]
    fn test_observe_contains_panics() {
        struct Exploding;
        impl StatsSink for Exploding {
            fn record_update(&self) {
                panic!("sink down");
            }
            fn record_timing(&self, _: &str, _: Duration) {}
        }

        let sink = Exploding;
        observe(|| sink.record_update());
    }
}
