use prometheus::{
    core::Collector, Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::Result;

const NAMESPACE: &str = "am_executor";
const DURATION_BUCKETS: [f64; 6] = [1.0, 10.0, 60.0, 600.0, 900.0, 1800.0];

/// Pipeline stage an error is counted under in `am_executor_errors_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Unmarshal,
    Start,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Read => "read",
            Stage::Unmarshal => "unmarshal",
            Stage::Start => "start",
        }
    }
}

/// Registry and instruments shared by the runner and the HTTP server.
///
/// Cloning is cheap and every clone updates the same underlying instruments.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    process_duration: Histogram,
    processes_current: IntGauge,
    errors: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let process_duration = Histogram::with_opts(
            HistogramOpts::new("duration_seconds", "Time the processes handling alerts ran.")
                .namespace(NAMESPACE)
                .subsystem("process")
                .buckets(DURATION_BUCKETS.to_vec()),
        )?;
        let processes_current = IntGauge::with_opts(
            Opts::new("current", "Current number of processes running.")
                .namespace(NAMESPACE)
                .subsystem("processes"),
        )?;
        let errors = IntCounterVec::new(
            Opts::new("total", "Total number of errors while processing alerts.")
                .namespace(NAMESPACE)
                .subsystem("errors"),
            &["stage"],
        )?;

        registry.register(Box::new(process_duration.clone()))?;
        registry.register(Box::new(processes_current.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            registry,
            process_duration,
            processes_current,
            errors,
        })
    }

    pub fn process_started(&self) {
        self.processes_current.inc();
    }

    pub fn process_finished(&self, elapsed_secs: f64) {
        self.process_duration.observe(elapsed_secs);
        self.processes_current.dec();
    }

    pub fn record_error(&self, stage: Stage) {
        self.errors.with_label_values(&[stage.as_str()]).inc();
    }

    pub fn processes_current(&self) -> i64 {
        self.processes_current.get()
    }

    pub fn process_runs_observed(&self) -> u64 {
        self.process_duration.get_sample_count()
    }

    /// Total run time observed so far, in seconds.
    pub fn process_seconds_observed(&self) -> f64 {
        self.process_duration.get_sample_sum()
    }

    /// Errors counted for `stage`. Reading does not create the series.
    pub fn errors(&self, stage: Stage) -> u64 {
        self.errors
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                metric
                    .get_label()
                    .iter()
                    .any(|label| label.get_name() == "stage" && label.get_value() == stage.as_str())
            })
            .map(|metric| metric.get_counter().get_value() as u64)
            .unwrap_or(0)
    }

    /// Content type of the output of [`Metrics::gather`].
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Renders every registered instrument in the Prometheus text format.
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        Ok(encoder.encode_to_string(&self.registry.gather())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_instruments() {
        let metrics = Metrics::new().unwrap();
        metrics.process_started();
        metrics.process_finished(2.5);
        metrics.record_error(Stage::Unmarshal);

        let text = metrics.gather().unwrap();
        assert!(text.contains("am_executor_process_duration_seconds_bucket{le=\"10\"} 1"));
        assert!(text.contains("am_executor_process_duration_seconds_count 1"));
        assert!(text.contains("am_executor_processes_current 0"));
        assert!(text.contains("am_executor_errors_total{stage=\"unmarshal\"} 1"));
    }

    #[test]
    fn clones_share_instruments() {
        let metrics = Metrics::new().unwrap();
        let clone = metrics.clone();
        clone.process_started();
        clone.record_error(Stage::Start);
        clone.record_error(Stage::Start);

        assert_eq!(metrics.processes_current(), 1);
        assert_eq!(metrics.errors(Stage::Start), 2);
        assert_eq!(metrics.errors(Stage::Read), 0);
    }

    #[test]
    fn reading_errors_does_not_create_series() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.errors(Stage::Read), 0);
        assert!(!metrics.gather().unwrap().contains("stage=\"read\""));

        metrics.record_error(Stage::Read);
        assert_eq!(metrics.errors(Stage::Read), 1);
        assert_eq!(metrics.errors(Stage::Start), 0);
        assert!(!metrics.gather().unwrap().contains("stage=\"start\""));
    }

    #[test]
    fn separate_values_do_not_share_state() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.process_started();
        assert_eq!(second.processes_current(), 0);
    }
}
