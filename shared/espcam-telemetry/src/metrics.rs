//! Metrics primitives

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic counter
#[derive(Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
    name: String,
}

impl Counter {
    pub fn new(name: &str) -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
            name: name.to_string(),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Sliding-window histogram (keeps the most recent samples)
#[derive(Clone)]
pub struct Histogram {
    samples: Arc<parking_lot::Mutex<Vec<f64>>>,
    name: String,
    max_samples: usize,
}

/// Point-in-time view of a [`Histogram`]
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistogramSnapshot {
    pub samples: usize,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
}

impl Histogram {
    pub fn new(name: &str) -> Self {
        Self::with_capacity(name, 1000)
    }

    pub fn with_capacity(name: &str, max_samples: usize) -> Self {
        Self {
            samples: Arc::new(parking_lot::Mutex::new(Vec::with_capacity(max_samples))),
            name: name.to_string(),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&self, value: f64) {
        let mut samples = self.samples.lock();
        if samples.len() >= self.max_samples {
            samples.remove(0);
        }
        samples.push(value);
    }

    pub fn percentile(&self, p: f64) -> f64 {
        let samples = self.samples.lock();
        percentile_of(&samples, p)
    }

    pub fn mean(&self) -> f64 {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let samples = self.samples.lock().clone();
        let mean = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        };
        HistogramSnapshot {
            samples: samples.len(),
            mean,
            p50: percentile_of(&samples, 50.0),
            p95: percentile_of(&samples, 95.0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn percentile_of(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("uploads_total");
        assert_eq!(counter.get(), 0);
        counter.inc();
        assert_eq!(counter.get(), 1);
        counter.add(5);
        assert_eq!(counter.get(), 6);
        assert_eq!(counter.name(), "uploads_total");
    }

    #[test]
    fn test_histogram() {
        let hist = Histogram::new("inference_latency_ms");
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            hist.record(v);
        }

        assert!((hist.mean() - 3.0).abs() < 0.001);
        assert!((hist.percentile(50.0) - 3.0).abs() < 0.001);

        let snap = hist.snapshot();
        assert_eq!(snap.samples, 5);
        assert!((snap.p95 - 5.0).abs() < 0.001);
    }

    #[test]
    fn test_histogram_window_drops_oldest() {
        let hist = Histogram::with_capacity("window", 2);
        hist.record(100.0);
        hist.record(1.0);
        hist.record(3.0);
        assert!((hist.mean() - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_empty_histogram() {
        let hist = Histogram::new("empty");
        assert_eq!(hist.snapshot().samples, 0);
        assert_eq!(hist.percentile(99.0), 0.0);
    }
}
