/*!
 * # Metrics Module
 *
 * In-memory counters and histograms for the prediction service, exported in
 * Prometheus text format at `/metrics` and as JSON at `/metrics/json`.
 */

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde_json::json;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Count and sum of observations. The sum is stored as `f64` bits.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    sum_bits: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, value: f64) {
        let _ = self
            .sum_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
    histograms: DashMap<String, Histogram>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_counter(&self, name: &str) -> Counter {
        self.counters
            .entry(name.to_string())
            .or_insert_with(Counter::new)
            .clone()
    }

    pub fn get_or_create_histogram(&self, name: &str) -> Histogram {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(Histogram::new)
            .clone()
    }

    /// Prometheus text exposition, sorted by metric name
    pub fn export_metrics(&self) -> String {
        let mut output = String::new();

        let mut counters: Vec<(String, u64)> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get()))
            .collect();
        counters.sort();
        for (name, value) in counters {
            let _ = writeln!(output, "# TYPE {} counter", name);
            let _ = writeln!(output, "{} {}", name, value);
        }

        let mut histograms: Vec<(String, u64, f64)> = self
            .histograms
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().get_count(),
                    entry.value().get_sum(),
                )
            })
            .collect();
        histograms.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, count, sum) in histograms {
            let _ = writeln!(output, "# TYPE {} summary", name);
            let _ = writeln!(output, "{}_count {}", name, count);
            let _ = writeln!(output, "{}_sum {}", name, sum);
        }

        output
    }

    pub fn export_metrics_json(&self) -> serde_json::Value {
        let mut counters = serde_json::Map::new();
        for entry in self.counters.iter() {
            let (name, counter) = entry.pair();
            counters.insert(name.to_string(), json!(counter.get()));
        }

        let mut histograms = serde_json::Map::new();
        for entry in self.histograms.iter() {
            let (name, histogram) = entry.pair();
            histograms.insert(
                name.to_string(),
                json!({
                    "count": histogram.get_count(),
                    "sum": histogram.get_sum(),
                }),
            );
        }

        json!({
            "counters": counters,
            "histograms": histograms,
        })
    }
}

// Global metrics registry
lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

/// Inference and upload metrics
pub struct PredictionMetrics {
    pub predictions_total: Counter,
    pub prediction_failures_total: Counter,
    pub prediction_rows: Histogram,
    pub inference_duration_seconds: Histogram,
    pub uploads_total: Counter,
    pub upload_failures_total: Counter,
}

impl PredictionMetrics {
    pub fn new() -> Self {
        Self {
            predictions_total: METRICS.get_or_create_counter("revenue_predictions_total"),
            prediction_failures_total: METRICS
                .get_or_create_counter("revenue_prediction_failures_total"),
            prediction_rows: METRICS.get_or_create_histogram("revenue_prediction_rows"),
            inference_duration_seconds: METRICS
                .get_or_create_histogram("revenue_inference_duration_seconds"),
            uploads_total: METRICS.get_or_create_counter("csv_uploads_total"),
            upload_failures_total: METRICS.get_or_create_counter("csv_upload_failures_total"),
        }
    }

    pub fn record_inference(&self, rows: usize, duration: Duration) {
        self.predictions_total.inc_by(rows as u64);
        self.prediction_rows.observe(rows as f64);
        self.inference_duration_seconds
            .observe(duration.as_secs_f64());
    }

    pub fn record_failure(&self) {
        self.prediction_failures_total.inc();
    }

    pub fn record_upload(&self, ok: bool) {
        self.uploads_total.inc();
        if !ok {
            self.upload_failures_total.inc();
        }
    }
}

impl Default for PredictionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    pub static ref PREDICTION_METRICS: PredictionMetrics = PredictionMetrics::new();
}

// HTTP endpoint handlers for metrics
pub async fn metrics_handler() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_metrics(),
    )
        .into_response()
}

pub async fn metrics_json_handler() -> Json<serde_json::Value> {
    Json(METRICS.export_metrics_json())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_and_histograms_export_in_prometheus_format() {
        let registry = MetricsRegistry::new();
        registry.get_or_create_counter("b_total").inc_by(3);
        registry.get_or_create_counter("a_total").inc();
        let h = registry.get_or_create_histogram("latency_seconds");
        h.observe(0.25);
        h.observe(0.5);

        let text = registry.export_metrics();
        let a = text.find("a_total 1").unwrap();
        let b = text.find("b_total 3").unwrap();
        assert!(a < b);
        assert!(text.contains("latency_seconds_count 2"));
        assert!(text.contains("latency_seconds_sum 0.75"));
    }

    #[test]
    fn prediction_metrics_live_in_the_global_registry() {
        let metrics = PredictionMetrics::new();
        metrics.record_upload(false);
        metrics.record_inference(3, Duration::from_millis(2));

        assert!(METRICS.get_or_create_counter("csv_upload_failures_total").get() >= 1);
        assert!(METRICS.get_or_create_counter("revenue_predictions_total").get() >= 3);
        let text = METRICS.export_metrics();
        assert!(text.contains("# TYPE revenue_inference_duration_seconds summary"));
    }

    #[test]
    fn registry_returns_shared_handles() {
        let registry = MetricsRegistry::new();
        registry.get_or_create_counter("x").inc();
        registry.get_or_create_counter("x").inc();
        assert_eq!(registry.get_or_create_counter("x").get(), 2);

        let json = registry.export_metrics_json();
        assert_eq!(json["counters"]["x"], 2);
    }
}
