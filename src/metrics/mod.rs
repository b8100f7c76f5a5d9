//! Prometheus metrics for the crawl orchestrator
//!
//! Tracks job admissions and outcomes, per-platform step results and
//! durations, and the number of posts written to the result store.
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

struct OrchestratorMetrics {
    jobs_submitted: CounterVec,
    jobs_finished: CounterVec,
    job_running: Gauge,
    steps: CounterVec,
    step_duration: HistogramVec,
    posts_upserted: CounterVec,
    api_requests: CounterVec,
}

static METRICS: OnceLock<OrchestratorMetrics> = OnceLock::new();

static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers anything.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = OrchestratorMetrics {
        jobs_submitted: register_counter_vec!(
            "crawl_orchestrator_jobs_submitted_total",
            "Job submissions by admission outcome",
            &["outcome"]
        )?,
        jobs_finished: register_counter_vec!(
            "crawl_orchestrator_jobs_finished_total",
            "Finished jobs by final status",
            &["status"]
        )?,
        job_running: register_gauge!(
            "crawl_orchestrator_job_running",
            "Whether a job currently holds the global slot (1 = yes, 0 = no)"
        )?,
        steps: register_counter_vec!(
            "crawl_orchestrator_steps_total",
            "Executed (round, platform) steps by outcome",
            &["platform", "outcome"]
        )?,
        step_duration: register_histogram_vec!(
            "crawl_orchestrator_step_duration_seconds",
            "Time spent crawling and saving one step",
            &["platform"],
            vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0]
        )?,
        posts_upserted: register_counter_vec!(
            "crawl_orchestrator_posts_upserted_total",
            "Posts written to the result store",
            &["platform"]
        )?,
        api_requests: register_counter_vec!(
            "crawl_orchestrator_api_requests_total",
            "API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
    };

    METRICS
        .set(metrics)
        .map_err(|_| "Orchestrator metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a submission; `outcome` is `accepted`, `conflict` or `invalid`
pub fn record_submission(outcome: &str) {
    if let Some(m) = METRICS.get() {
        m.jobs_submitted.with_label_values(&[outcome]).inc();
    }
}

/// Record a job start
pub fn record_job_started() {
    if let Some(m) = METRICS.get() {
        m.job_running.set(1.0);
    }
}

/// Record a job reaching a terminal status
pub fn record_job_finished(status: &str) {
    let Some(m) = METRICS.get() else {
        return;
    };

    m.job_running.set(0.0);
    m.jobs_finished.with_label_values(&[status]).inc();
}

/// Record one step result and how many posts it saved
pub fn record_step(platform: &str, success: bool, posts: usize) {
    let Some(m) = METRICS.get() else {
        return;
    };

    let outcome = if success { "success" } else { "failure" };
    m.steps.with_label_values(&[platform, outcome]).inc();

    if posts > 0 {
        m.posts_upserted
            .with_label_values(&[platform])
            .inc_by(posts as f64);
    }
}

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16) {
    if let Some(m) = METRICS.get() {
        let status_str = status.to_string();
        m.api_requests
            .with_label_values(&[endpoint, &status_str])
            .inc();
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a step timer
pub fn start_step_timer(platform: &str) -> MetricsTimer {
    match METRICS.get() {
        Some(m) => MetricsTimer::new(
            m.step_duration
                .with_label_values(&[platform])
                .start_timer(),
        ),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================
