//! Request counters and latency histogram for one service.
use crate::error::RecorderError;
use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
use opentelemetry::{InstrumentationScope, KeyValue};
use std::fmt;
use std::time::Duration;

const MAX_INSTRUMENT_NAME_LEN: usize = 255;

/// Records accepted and failed requests and their latency.
///
/// Instruments are created once, on a meter named after the service, and the
/// recorder is then shared by every call site. Attributes are per call.
#[derive(Clone)]
pub struct MetricsRecorder {
    accepted: Counter<u64>,
    failed: Counter<u64>,
    latency: Histogram<f64>,
    names: [String; 3],
}

impl fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("instruments", &self.names)
            .finish()
    }
}

impl MetricsRecorder {
    /// Create the recorder's instruments on `provider`.
    ///
    /// The instruments are `{service}_module_requests_accepted_total`,
    /// `{service}_module_requests_failed_total` and
    /// `{service}_module_request_duration_seconds`. Fails if `service_name`
    /// turns any of them into an invalid instrument name.
    pub fn new<P>(provider: &P, service_name: &str) -> Result<Self, RecorderError>
    where
        P: MeterProvider + ?Sized,
    {
        let accepted_name = format!("{service_name}_module_requests_accepted_total");
        let failed_name = format!("{service_name}_module_requests_failed_total");
        let latency_name = format!("{service_name}_module_request_duration_seconds");
        for name in [&accepted_name, &failed_name, &latency_name] {
            validate_instrument_name(name)?;
        }

        let meter =
            provider.meter_with_scope(InstrumentationScope::builder(service_name.to_owned()).build());
        let accepted = meter
            .u64_counter(accepted_name.clone())
            .with_description("Total number of requests accepted by a module or API")
            .build();
        let failed = meter
            .u64_counter(failed_name.clone())
            .with_description("Total number of requests failed by a module or API")
            .build();
        let latency = meter
            .f64_histogram(latency_name.clone())
            .with_description("Request processing latency in seconds for a module or API")
            .with_unit("s")
            .build();

        Ok(MetricsRecorder {
            accepted,
            failed,
            latency,
            names: [accepted_name, failed_name, latency_name],
        })
    }

    /// Count one accepted request.
    pub fn record_accepted(&self, attributes: &[KeyValue]) {
        self.accepted.add(1, attributes);
    }

    /// Count one failed request.
    pub fn record_failed(&self, attributes: &[KeyValue]) {
        self.failed.add(1, attributes);
    }

    /// Record the latency of one request, in seconds.
    pub fn record_latency(&self, duration: Duration, attributes: &[KeyValue]) {
        self.latency.record(duration.as_secs_f64(), attributes);
    }
}

// Instrument name syntax: an ASCII letter followed by up to 254 characters
// out of alphanumerics, `_`, `.`, `-` and `/`.
fn validate_instrument_name(name: &str) -> Result<(), RecorderError> {
    let invalid = |reason| RecorderError::InvalidInstrumentName {
        name: name.to_owned(),
        reason,
    };
    if name.len() > MAX_INSTRUMENT_NAME_LEN {
        return Err(invalid("longer than 255 characters"));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(invalid("must start with an ASCII letter"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/'))
    {
        return Err(invalid(
            "only alphanumerics, '_', '.', '-' and '/' are allowed",
        ));
    }
    Ok(())
}
