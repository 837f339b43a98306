//! The metrics collaborator.
//!
//! The pipeline decides *when* to record and *with what facts*; what happens
//! to a sample afterwards is the sink's business. Exactly one sample is
//! recorded per request, success or failure, and a sink can never fail a
//! request: [`MetricsSink::record`] is fire-and-forget.

use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::metrics::Counter;
use opentelemetry::metrics::Histogram;
use opentelemetry::metrics::Meter;

use crate::engine::OperationKind;

/// The facts recorded for one finished request.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct RequestMetrics {
    /// Wall-clock time from request entry to the terminal outcome.
    pub elapsed: Duration,

    /// Whether the outcome carried any errors.
    pub had_errors: bool,

    /// The resolved operation name, when the request carried one.
    pub operation_name: Option<String>,

    /// The targeted operation's kind, when processing got far enough to know.
    pub operation_kind: Option<OperationKind>,
}

/// A sink for request metrics.
///
/// Shared across all concurrent requests, so implementations must be safe for
/// concurrent recording (atomic counters, lock-free histograms, ...).
pub trait MetricsSink: Send + Sync {
    fn record(&self, metrics: RequestMetrics);
}

/// A sink that records nothing. The default.
#[derive(Debug, Clone, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record(&self, _metrics: RequestMetrics) {}
}

/// An OpenTelemetry-backed sink.
///
/// Exposes a request counter, an error counter and a latency histogram in
/// milliseconds, tagging latency samples with the operation name and kind
/// when they are known.
pub struct OtelMetrics {
    requests: Counter<u64>,
    errors: Counter<u64>,
    latency: Histogram<f64>,
}

impl OtelMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter("total_requests")
                .with_description("Counting all requests made to the GraphQL endpoint")
                .init(),
            errors: meter
                .u64_counter("total_errors")
                .with_description("Counting all requests that finished with errors")
                .init(),
            latency: meter
                .f64_histogram("request_latency")
                .with_description("Record latency for incoming requests")
                .init(),
        }
    }
}

impl Default for OtelMetrics {
    fn default() -> Self {
        Self::new(&opentelemetry::global::meter("qmantis"))
    }
}

impl MetricsSink for OtelMetrics {
    fn record(&self, metrics: RequestMetrics) {
        self.requests.add(1, &[]);
        if metrics.had_errors {
            self.errors.add(1, &[]);
        }

        let mut attributes = Vec::with_capacity(2);
        if let Some(name) = metrics.operation_name {
            attributes.push(KeyValue::new("graphql.operation.name", name));
        }
        if let Some(kind) = metrics.operation_kind {
            attributes.push(KeyValue::new("graphql.operation.type", kind.as_str()));
        }
        self.latency
            .record(metrics.elapsed.as_secs_f64() * 1_000.0, &attributes);
    }
}
