//! Prometheus-backed [`crate::sinks::MetricsSink`]: `OnceCell` statics
//! populated once by [`install`].

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge, register_gauge_vec, register_histogram_vec,
    register_int_counter, register_int_counter_vec, Gauge, GaugeVec, HistogramVec, IntCounter,
    IntCounterVec,
};

static JOBS_RUNNING: OnceCell<Gauge> = OnceCell::new();
static JOB_STARTS_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static JOB_STOPS_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static JOB_START_FAILURES_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

static OBSERVE_LATENCY_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static PENDING_TRANSMISSIONS: OnceCell<GaugeVec> = OnceCell::new();
static REPORTS_BUILT_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

static CHAIN_QUERY_ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static CHAIN_REJECTED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static TRANSMIT_LATENCY_SECONDS: OnceCell<HistogramVec> = OnceCell::new();

static INCOMING_BUFFER_DROPS_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static OUTGOING_BUFFER_DROPS_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CONNECTED_PEERS: OnceCell<Gauge> = OnceCell::new();

#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

macro_rules! get_metric {
    ($metric:ident) => {
        $metric
            .get()
            .expect("prometheus sink not initialized; call ocr_telemetry::prometheus::install() first")
    };
}

impl JobMetricsSink for PrometheusSink {
    fn set_jobs_running(&self, count: i64) {
        get_metric!(JOBS_RUNNING).set(count as f64);
    }
    fn inc_job_starts_total(&self) {
        get_metric!(JOB_STARTS_TOTAL).inc();
    }
    fn inc_job_stops_total(&self) {
        get_metric!(JOB_STOPS_TOTAL).inc();
    }
    fn inc_job_start_failures_total(&self, reason: &'static str) {
        get_metric!(JOB_START_FAILURES_TOTAL)
            .with_label_values(&[reason])
            .inc();
    }
}

impl ReportingMetricsSink for PrometheusSink {
    fn observe_observe_latency(&self, job_id: &str, duration_secs: f64) {
        get_metric!(OBSERVE_LATENCY_SECONDS)
            .with_label_values(&[job_id])
            .observe(duration_secs);
    }
    fn set_pending_transmissions(&self, job_id: &str, depth: i64) {
        get_metric!(PENDING_TRANSMISSIONS)
            .with_label_values(&[job_id])
            .set(depth as f64);
    }
    fn inc_reports_built_total(&self, job_id: &str) {
        get_metric!(REPORTS_BUILT_TOTAL).with_label_values(&[job_id]).inc();
    }
}

impl ChainMetricsSink for PrometheusSink {
    fn inc_chain_query_errors_total(&self, method: &'static str) {
        get_metric!(CHAIN_QUERY_ERRORS_TOTAL)
            .with_label_values(&[method])
            .inc();
    }
    fn inc_chain_rejected_total(&self) {
        get_metric!(CHAIN_REJECTED_TOTAL).inc();
    }
    fn observe_transmit_latency(&self, duration_secs: f64) {
        get_metric!(TRANSMIT_LATENCY_SECONDS)
            .with_label_values(&["transmit"])
            .observe(duration_secs);
    }
}

impl NetworkMetricsSink for PrometheusSink {
    fn inc_incoming_buffer_drops_total(&self) {
        get_metric!(INCOMING_BUFFER_DROPS_TOTAL).inc();
    }
    fn inc_outgoing_buffer_drops_total(&self) {
        get_metric!(OUTGOING_BUFFER_DROPS_TOTAL).inc();
    }
    fn set_connected_peers(&self, count: i64) {
        get_metric!(CONNECTED_PEERS).set(count as f64);
    }
}

/// Registers every metric with the global Prometheus registry and
/// installs [`PrometheusSink`] as the process-wide sink. Call once from
/// `main`, before spawning any component that instruments itself.
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    JOBS_RUNNING
        .set(register_gauge!(
            "ocr_jobs_running",
            "Current number of active OCR jobs."
        )?)
        .expect("static already initialized");
    JOB_STARTS_TOTAL
        .set(register_int_counter!(
            "ocr_job_starts_total",
            "Total number of successful job starts."
        )?)
        .expect("static already initialized");
    JOB_STOPS_TOTAL
        .set(register_int_counter!(
            "ocr_job_stops_total",
            "Total number of job stops."
        )?)
        .expect("static already initialized");
    JOB_START_FAILURES_TOTAL
        .set(register_int_counter_vec!(
            "ocr_job_start_failures_total",
            "Total number of failed job starts, by reason.",
            &["reason"]
        )?)
        .expect("static already initialized");
    OBSERVE_LATENCY_SECONDS
        .set(register_histogram_vec!(
            "ocr_observe_latency_seconds",
            "Latency of the data-source Observe bridge, by job.",
            &["job_id"],
            exponential_buckets(0.01, 2.0, 12)?
        )?)
        .expect("static already initialized");
    PENDING_TRANSMISSIONS
        .set(register_gauge_vec!(
            "ocr_pending_transmissions",
            "Current pending-transmission queue depth, by job.",
            &["job_id"]
        )?)
        .expect("static already initialized");
    REPORTS_BUILT_TOTAL
        .set(register_int_counter_vec!(
            "ocr_reports_built_total",
            "Total reports built by the median plugin, by job.",
            &["job_id"]
        )?)
        .expect("static already initialized");
    CHAIN_QUERY_ERRORS_TOTAL
        .set(register_int_counter_vec!(
            "ocr_chain_query_errors_total",
            "Total chain query RPC errors, by method.",
            &["method"]
        )?)
        .expect("static already initialized");
    CHAIN_REJECTED_TOTAL
        .set(register_int_counter!(
            "ocr_chain_rejected_total",
            "Total transmits rejected by the chain (non-zero tx response code)."
        )?)
        .expect("static already initialized");
    TRANSMIT_LATENCY_SECONDS
        .set(register_histogram_vec!(
            "ocr_transmit_latency_seconds",
            "Latency of MsgTransmit broadcast.",
            &["op"],
            exponential_buckets(0.01, 2.0, 12)?
        )?)
        .expect("static already initialized");
    INCOMING_BUFFER_DROPS_TOTAL
        .set(register_int_counter!(
            "ocr_p2p_incoming_buffer_drops_total",
            "Total incoming P2P messages dropped due to a full buffer."
        )?)
        .expect("static already initialized");
    OUTGOING_BUFFER_DROPS_TOTAL
        .set(register_int_counter!(
            "ocr_p2p_outgoing_buffer_drops_total",
            "Total outgoing P2P messages dropped due to a full buffer."
        )?)
        .expect("static already initialized");
    CONNECTED_PEERS
        .set(register_gauge!(
            "ocr_p2p_connected_peers",
            "Current number of connected P2P peers."
        )?)
        .expect("static already initialized");

    let sink: &'static dyn MetricsSink = Box::leak(Box::new(PrometheusSink));
    let _ = SINK.set(sink);
    Ok(sink)
}
