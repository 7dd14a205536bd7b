//! Abstract metrics sink traits, decoupling instrumentation call sites
//! from the Prometheus backend (`SPEC_FULL.md` §B "Metrics").

use once_cell::sync::OnceCell;

#[derive(Debug, Clone, Copy)]
pub struct NopSink;

pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

pub fn metrics() -> &'static dyn MetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Job lifecycle and registry metrics (spec §4.H).
pub trait JobMetricsSink: Send + Sync + std::fmt::Debug {
    fn set_jobs_running(&self, count: i64);
    fn inc_job_starts_total(&self);
    fn inc_job_stops_total(&self);
    fn inc_job_start_failures_total(&self, reason: &'static str);
}
impl JobMetricsSink for NopSink {
    fn set_jobs_running(&self, _count: i64) {}
    fn inc_job_starts_total(&self) {}
    fn inc_job_stops_total(&self) {}
    fn inc_job_start_failures_total(&self, _reason: &'static str) {}
}

/// `Observe` bridge latency and pending-transmission queue depth.
pub trait ReportingMetricsSink: Send + Sync + std::fmt::Debug {
    fn observe_observe_latency(&self, job_id: &str, duration_secs: f64);
    fn set_pending_transmissions(&self, job_id: &str, depth: i64);
    fn inc_reports_built_total(&self, job_id: &str);
}
impl ReportingMetricsSink for NopSink {
    fn observe_observe_latency(&self, _job_id: &str, _duration_secs: f64) {}
    fn set_pending_transmissions(&self, _job_id: &str, _depth: i64) {}
    fn inc_reports_built_total(&self, _job_id: &str) {}
}

/// Chain adapter RPC error counters (spec §4.D).
pub trait ChainMetricsSink: Send + Sync + std::fmt::Debug {
    fn inc_chain_query_errors_total(&self, method: &'static str);
    fn inc_chain_rejected_total(&self);
    fn observe_transmit_latency(&self, duration_secs: f64);
}
impl ChainMetricsSink for NopSink {
    fn inc_chain_query_errors_total(&self, _method: &'static str) {}
    fn inc_chain_rejected_total(&self) {}
    fn observe_transmit_latency(&self, _duration_secs: f64) {}
}

/// P2P buffer-drop counters (spec §5 backpressure).
pub trait NetworkMetricsSink: Send + Sync + std::fmt::Debug {
    fn inc_incoming_buffer_drops_total(&self);
    fn inc_outgoing_buffer_drops_total(&self);
    fn set_connected_peers(&self, count: i64);
}
impl NetworkMetricsSink for NopSink {
    fn inc_incoming_buffer_drops_total(&self) {}
    fn inc_outgoing_buffer_drops_total(&self) {}
    fn set_connected_peers(&self, _count: i64) {}
}

pub trait MetricsSink:
    JobMetricsSink + ReportingMetricsSink + ChainMetricsSink + NetworkMetricsSink
{
}
impl<T> MetricsSink for T where
    T: JobMetricsSink + ReportingMetricsSink + ChainMetricsSink + NetworkMetricsSink
{
}

/// Raw diagnostic-line sink (spec `SPEC_FULL.md` §C.3): the median
/// plugin and consensus embedding push free-form debug lines into this,
/// decoupled from whatever downstream collector an embedding wires up.
pub trait MonitoringEndpoint: Send + Sync {
    fn send_log(&self, line: &str);
}

/// A `MonitoringEndpoint` that forwards every line through `tracing` at
/// debug level — the default when no external sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMonitoringEndpoint;

impl MonitoringEndpoint for TracingMonitoringEndpoint {
    fn send_log(&self, line: &str) {
        tracing::debug!(target: "ocr.monitoring", "{line}");
    }
}
