//! Observability stack: structured logging init, Prometheus metrics
//! registry plus `/metrics` HTTP exporter, and a `MonitoringEndpoint`
//! diagnostic sink (`SPEC_FULL.md` §B, §C.3).

pub mod http;
pub mod init;
pub mod prometheus;
pub mod sinks;

pub use init::{init_logging, LogFormat};
pub use sinks::{metrics, MetricsSink, MonitoringEndpoint, TracingMonitoringEndpoint};

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("text").unwrap(), LogFormat::Text);
        assert_eq!(LogFormat::from_str("").unwrap(), LogFormat::Text);
        assert!(LogFormat::from_str("xml").is_err());
    }

    #[test]
    fn unconfigured_sink_is_a_silent_noop() {
        let sink = metrics();
        sink.set_jobs_running(3);
        sink.inc_chain_rejected_total();
    }
}
