use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use http::StatusCode;

use crate::Priority;

/// Outcome of one admission attempt, as reported to the metrics sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdmissionOutcome {
    Allowed,
    RejectedQueueFull,
    RejectedNoKey,
}

impl AdmissionOutcome {
    /// Stable label used in rendered metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionOutcome::Allowed => "allowed",
            AdmissionOutcome::RejectedQueueFull => "rejected_queue_full",
            AdmissionOutcome::RejectedNoKey => "rejected_no_key",
        }
    }
}

/// Sink for scheduler metrics.
///
/// Called synchronously from the event loop, so implementations must not
/// block.
pub trait MetricsSink: Send + Sync {
    /// Queue depth of a bucket's priority class, sampled on enqueue and on
    /// admission.
    fn observe_queue_depth(&self, bucket: &str, priority: Priority, depth: usize);

    /// One admission attempt: how long it queued and how it ended.
    fn observe_admission(&self, wait: Duration, outcome: AdmissionOutcome);
}

/// Discards everything; the default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn observe_queue_depth(&self, _bucket: &str, _priority: Priority, _depth: usize) {}
    fn observe_admission(&self, _wait: Duration, _outcome: AdmissionOutcome) {}
}

/// Aggregating sink with a Prometheus text rendering.
///
/// Written from the scheduler, read from wherever the embedding process
/// serves its metrics endpoint; all state is atomics and concurrent maps, so
/// neither side blocks the other.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    total_requests: AtomicU64,
    admission_wait_ns: AtomicU64,
    admission_count: AtomicU64,
    queue_depth: DashMap<(String, Priority), u64>,
    admission_results: DashMap<&'static str, u64>,
    upstream_statuses: DashMap<u16, u64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one inbound client request.
    pub fn observe_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one upstream response by status code.
    pub fn observe_upstream(&self, status: StatusCode) {
        *self.upstream_statuses.entry(status.as_u16()).or_insert(0) += 1;
    }

    /// Renders the Prometheus text exposition with deterministic ordering.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let total = self.total_requests.load(Ordering::Relaxed);
        let admit_count = self.admission_count.load(Ordering::Relaxed);
        let wait_avg_ms = if admit_count > 0 {
            self.admission_wait_ns.load(Ordering::Relaxed) as f64 / admit_count as f64 / 1e6
        } else {
            0.0
        };

        let _ = writeln!(out, "riftrelay_http_requests_total {total}");
        let _ = writeln!(out, "riftrelay_admission_wait_avg_ms {wait_avg_ms:.3}");

        let mut results: Vec<(&'static str, u64)> = self
            .admission_results
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        results.sort_unstable();
        for (outcome, value) in results {
            let _ = writeln!(
                out,
                "riftrelay_admission_total{{outcome=\"{}\"}} {value}",
                escape_label(outcome)
            );
        }

        let mut depths: Vec<((String, Priority), u64)> = self
            .queue_depth
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        depths.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        for ((bucket, priority), depth) in depths {
            let _ = writeln!(
                out,
                "riftrelay_queue_depth{{bucket=\"{}\",priority=\"{}\"}} {depth}",
                escape_label(&bucket),
                priority.as_str()
            );
        }

        let mut statuses: Vec<(u16, u64)> = self
            .upstream_statuses
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        statuses.sort_unstable();
        for (code, value) in statuses {
            let _ = writeln!(
                out,
                "riftrelay_upstream_responses_total{{code=\"{code}\"}} {value}"
            );
        }

        out
    } // end method render
}

impl MetricsSink for MetricsCollector {
    fn observe_queue_depth(&self, bucket: &str, priority: Priority, depth: usize) {
        self.queue_depth
            .insert((bucket.to_string(), priority), depth as u64);
    }

    fn observe_admission(&self, wait: Duration, outcome: AdmissionOutcome) {
        self.admission_wait_ns
            .fetch_add(wait.as_nanos() as u64, Ordering::Relaxed);
        self.admission_count.fetch_add(1, Ordering::Relaxed);
        *self.admission_results.entry(outcome.as_str()).or_insert(0) += 1;
    }
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
