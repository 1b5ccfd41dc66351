//! In-process counters for the queue runtime and the distribution pipeline.
//!
//! Read through [`Metrics::snapshot`], which the health endpoint returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A value that goes up and down.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        // Saturate at zero.
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }
}

/// Job duration histogram.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 10ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s, 30s, 60s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [10, 50, 100, 250, 500, 1000, 2500, 5000, 10000, 30000, 60000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// (upper bound ms, count) pairs.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct Metrics {
    // Queue runtime
    pub jobs_enqueued: Counter,
    pub jobs_completed: Counter,
    pub jobs_retried: Counter,
    pub jobs_failed: Counter,
    pub jobs_timed_out: Counter,
    pub recurring_fired: Counter,
    pub job_duration_ms: Histogram,
    pub jobs_in_flight: Gauge,

    // Distribution pipeline
    pub leads_ingested: Counter,
    pub leads_distributed: Counter,
    pub leads_scheduled: Counter,
    pub leads_unassigned: Counter,
    /// Immediate-path leads left pending after the live payment check failed
    pub leads_stranded: Counter,
    pub distributions_completed: Counter,
    pub distributions_cancelled: Counter,
    pub customers_demoted: Counter,
    pub notifications_failed: Counter,

    // Billing webhooks
    pub webhooks_received: Counter,
    pub webhooks_rejected: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub jobs_enqueued: u64,
    pub jobs_completed: u64,
    pub jobs_retried: u64,
    pub jobs_failed: u64,
    pub jobs_timed_out: u64,
    pub recurring_fired: u64,
    pub job_duration_mean_ms: f64,
    pub jobs_in_flight: u64,
    pub leads_ingested: u64,
    pub leads_distributed: u64,
    pub leads_scheduled: u64,
    pub leads_unassigned: u64,
    pub leads_stranded: u64,
    pub distributions_completed: u64,
    pub distributions_cancelled: u64,
    pub customers_demoted: u64,
    pub notifications_failed: u64,
    pub webhooks_received: u64,
    pub webhooks_rejected: u64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            jobs_enqueued: self.jobs_enqueued.get(),
            jobs_completed: self.jobs_completed.get(),
            jobs_retried: self.jobs_retried.get(),
            jobs_failed: self.jobs_failed.get(),
            jobs_timed_out: self.jobs_timed_out.get(),
            recurring_fired: self.recurring_fired.get(),
            job_duration_mean_ms: self.job_duration_ms.mean(),
            jobs_in_flight: self.jobs_in_flight.get(),
            leads_ingested: self.leads_ingested.get(),
            leads_distributed: self.leads_distributed.get(),
            leads_scheduled: self.leads_scheduled.get(),
            leads_unassigned: self.leads_unassigned.get(),
            leads_stranded: self.leads_stranded.get(),
            distributions_completed: self.distributions_completed.get(),
            distributions_cancelled: self.distributions_cancelled.get(),
            customers_demoted: self.customers_demoted.get(),
            notifications_failed: self.notifications_failed.get(),
            webhooks_received: self.webhooks_received.get(),
            webhooks_rejected: self.webhooks_rejected.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
