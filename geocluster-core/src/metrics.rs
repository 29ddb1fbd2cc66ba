//! Prometheus-style pipeline metrics
//!
//! Atomic counters, gauges and histograms rendered in the text exposition
//! format. The standard instances cover both pipeline phases.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic counter
pub struct Counter {
    value: AtomicU64,
    name: &'static str,
    help: &'static str,
}

impl Counter {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name,
            help,
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} counter\n{} {}\n",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Floating point gauge, stored as f64 bits
pub struct Gauge {
    bits: AtomicU64,
    name: &'static str,
    help: &'static str,
}

impl Gauge {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            bits: AtomicU64::new(0),
            name,
            help,
        }
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} gauge\n{} {}\n",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Latency histogram with cumulative buckets (seconds)
pub struct Histogram {
    bounds: Vec<f64>,
    buckets: Vec<AtomicU64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
    name: &'static str,
    help: &'static str,
}

impl Histogram {
    /// Buckets sized for remote page requests
    pub fn new(name: &'static str, help: &'static str) -> Self {
        Self::with_buckets(name, help, vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    }

    pub fn with_buckets(name: &'static str, help: &'static str, bounds: Vec<f64>) -> Self {
        let buckets = bounds.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            buckets,
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
            name,
            help,
        }
    }

    pub fn observe(&self, seconds: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((seconds * 1_000_000.0) as u64, Ordering::Relaxed);

        for (bound, bucket) in self.bounds.iter().zip(&self.buckets) {
            if seconds <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record the time elapsed since `start`
    pub fn observe_since(&self, start: Instant) {
        self.observe(start.elapsed().as_secs_f64());
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn to_prometheus(&self) -> String {
        let mut output = format!(
            "# HELP {} {}\n# TYPE {} histogram\n",
            self.name, self.help, self.name
        );

        for (bound, bucket) in self.bounds.iter().zip(&self.buckets) {
            output.push_str(&format!(
                "{}_bucket{{le=\"{}\"}} {}\n",
                self.name,
                bound,
                bucket.load(Ordering::Relaxed)
            ));
        }
        output.push_str(&format!("{}_bucket{{le=\"+Inf\"}} {}\n", self.name, self.count()));

        let sum = self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        output.push_str(&format!("{}_sum {}\n", self.name, sum));
        output.push_str(&format!("{}_count {}\n", self.name, self.count()));

        output
    }
}

/// Standard pipeline metrics
pub mod standard {
    use super::*;
    use std::sync::LazyLock;

    pub static PAGES_FETCHED: Counter =
        Counter::new("geocluster_pages_fetched_total", "Pages fetched successfully");

    pub static THROTTLED_RESPONSES: Counter = Counter::new(
        "geocluster_throttled_responses_total",
        "Responses signalling the rate limit was exceeded",
    );

    pub static FETCH_RETRIES: Counter =
        Counter::new("geocluster_fetch_retries_total", "Page requests retried");

    pub static PAGES_ABANDONED: Counter = Counter::new(
        "geocluster_pages_abandoned_total",
        "Pages given up after retry exhaustion",
    );

    pub static ENTITIES_STORED: Counter = Counter::new(
        "geocluster_entities_stored_total",
        "Entities written into the shared store",
    );

    pub static KMEANS_ROUNDS: Counter =
        Counter::new("geocluster_kmeans_rounds_total", "Map/reduce rounds executed");

    pub static LAST_INERTIA: Gauge =
        Gauge::new("geocluster_last_inertia", "Inertia of the latest clustering");

    pub static PAGE_FETCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
        Histogram::new("geocluster_page_fetch_duration_seconds", "Page request latency")
    });
}

/// Render every standard metric
pub fn gather_metrics() -> String {
    let mut output = String::new();

    output.push_str(&standard::PAGES_FETCHED.to_prometheus());
    output.push_str(&standard::THROTTLED_RESPONSES.to_prometheus());
    output.push_str(&standard::FETCH_RETRIES.to_prometheus());
    output.push_str(&standard::PAGES_ABANDONED.to_prometheus());
    output.push_str(&standard::ENTITIES_STORED.to_prometheus());
    output.push_str(&standard::KMEANS_ROUNDS.to_prometheus());
    output.push_str(&standard::LAST_INERTIA.to_prometheus());
    output.push_str(&standard::PAGE_FETCH_DURATION.to_prometheus());

    output
}
