//! Upload counters exposed on `/stats`

use espcam_telemetry::{Counter, Histogram, HistogramSnapshot};
use serde::Serialize;

pub struct UploadMetrics {
    pub uploads: Counter,
    pub rejected: Counter,
    pub inference_failures: Counter,
    pub detections: Counter,
    pub archive_failures: Counter,
    pub backup_failures: Counter,
    pub inference_latency_ms: Histogram,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_secs: u64,
    pub uploads_total: u64,
    pub rejected_total: u64,
    pub inference_failures_total: u64,
    pub detections_total: u64,
    pub archive_failures_total: u64,
    pub backup_failures_total: u64,
    pub inference_latency_ms: HistogramSnapshot,
}

impl UploadMetrics {
    pub fn new() -> Self {
        Self {
            uploads: Counter::new("uploads_total"),
            rejected: Counter::new("rejected_total"),
            inference_failures: Counter::new("inference_failures_total"),
            detections: Counter::new("detections_total"),
            archive_failures: Counter::new("archive_failures_total"),
            backup_failures: Counter::new("backup_failures_total"),
            inference_latency_ms: Histogram::new("inference_latency_ms"),
        }
    }

    pub fn stats(&self, uptime_secs: u64) -> StatsResponse {
        StatsResponse {
            uptime_secs,
            uploads_total: self.uploads.get(),
            rejected_total: self.rejected.get(),
            inference_failures_total: self.inference_failures.get(),
            detections_total: self.detections.get(),
            archive_failures_total: self.archive_failures.get(),
            backup_failures_total: self.backup_failures.get(),
            inference_latency_ms: self.inference_latency_ms.snapshot(),
        }
    }
}

impl Default for UploadMetrics {
    fn default() -> Self {
        Self::new()
    }
}
