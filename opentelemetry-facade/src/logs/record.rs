use crate::trace::TraceCorrelation;
use opentelemetry::logs::{AnyValue, Severity};
use opentelemetry::{KeyValue, Value};
use std::panic::Location;
use std::time::SystemTime;
use tracing::Level;

/// A log call as made by application code, before enrichment.
#[derive(Clone, Debug)]
pub struct Entry {
    pub(crate) level: Level,
    pub(crate) message: String,
    pub(crate) attributes: Vec<KeyValue>,
    pub(crate) timestamp: SystemTime,
    pub(crate) location: Option<&'static Location<'static>>,
}

impl Entry {
    /// Create an entry timestamped now, attributed to the caller's location.
    #[track_caller]
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Entry {
            level,
            message: message.into(),
            attributes: Vec::new(),
            timestamp: SystemTime::now(),
            location: Some(Location::caller()),
        }
    }

    /// Append one attribute.
    pub fn with_attribute(mut self, attribute: KeyValue) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Append several attributes, in order.
    pub fn with_attributes<I>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        self.attributes.extend(attributes);
        self
    }

    /// Override the event time.
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Override the call-site, or drop it with `None`.
    pub fn with_location(mut self, location: Option<&'static Location<'static>>) -> Self {
        self.location = location;
        self
    }

    /// The level of this entry.
    pub fn level(&self) -> Level {
        self.level
    }

    /// The message of this entry.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The fully enriched record handed to both sinks.
///
/// Built once per log call and never modified afterwards.
#[derive(Clone, Debug)]
pub struct CanonicalRecord {
    pub(crate) timestamp: SystemTime,
    pub(crate) observed_timestamp: SystemTime,
    pub(crate) level: Level,
    pub(crate) severity: Severity,
    pub(crate) severity_text: &'static str,
    pub(crate) body: String,
    pub(crate) attributes: Vec<KeyValue>,
    pub(crate) trace_context: Option<TraceCorrelation>,
    pub(crate) source: Option<String>,
}

impl CanonicalRecord {
    /// When the event happened.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// When the bridge received the event.
    pub fn observed_timestamp(&self) -> SystemTime {
        self.observed_timestamp
    }

    /// The original `tracing` level.
    pub fn level(&self) -> Level {
        self.level
    }

    /// The mapped OpenTelemetry severity.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// The severity text, e.g. `"WARN"`.
    pub fn severity_text(&self) -> &'static str {
        self.severity_text
    }

    /// The message.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Every attribute in emit order, including the derived `group`,
    /// `trace_id`, `span_id` and `source` entries.
    pub fn attributes(&self) -> &[KeyValue] {
        &self.attributes
    }

    /// The span the record was emitted under, if one was recording.
    pub fn trace_context(&self) -> Option<&TraceCorrelation> {
        self.trace_context.as_ref()
    }

    /// The `file:line` call-site, if captured.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

pub(crate) fn to_any_value(value: &Value) -> AnyValue {
    match value {
        Value::Bool(b) => AnyValue::Boolean(*b),
        Value::I64(i) => AnyValue::Int(*i),
        Value::F64(f) => AnyValue::Double(*f),
        Value::String(s) => AnyValue::String(s.clone()),
        other => AnyValue::String(other.as_str().into_owned().into()),
    }
}
