use super::handler_state::HandlerState;
use super::record::{to_any_value, CanonicalRecord, Entry};
use super::severity::map_severity;
use super::sink::LocalSink;
use crate::error::SinkError;
use crate::trace::correlation;
use opentelemetry::logs::{AnyValue, LogRecord, Logger, LoggerProvider};
use opentelemetry::{otel_warn, Context, InstrumentationScope, KeyValue};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::Level;

/// Attribute carrying the handler's group label.
pub const GROUP_KEY: &str = "group";
/// Attribute carrying the hex trace id of the active span.
pub const TRACE_ID_KEY: &str = "trace_id";
/// Attribute carrying the hex span id of the active span.
pub const SPAN_ID_KEY: &str = "span_id";
/// Attribute carrying the `file:line` call-site.
pub const SOURCE_KEY: &str = "source";

/// Fans every log call out to an OpenTelemetry logger and a local sink.
///
/// Each call produces one [`CanonicalRecord`] carrying the accumulated
/// attributes, the call's own attributes, the group, the active span's ids
/// and the call-site. The record is emitted to the remote logger first and
/// then written to the local sink.
///
/// Cloning and deriving share the logger and the sink; only the attribute
/// state is per bridge.
pub struct LogBridge<L, S> {
    logger: Arc<L>,
    sink: Arc<S>,
    state: HandlerState,
    capture_source: bool,
}

impl<L, S> Clone for LogBridge<L, S> {
    fn clone(&self) -> Self {
        LogBridge {
            logger: Arc::clone(&self.logger),
            sink: Arc::clone(&self.sink),
            state: self.state.clone(),
            capture_source: self.capture_source,
        }
    }
}

impl<L, S: fmt::Debug> fmt::Debug for LogBridge<L, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBridge")
            .field("sink", &self.sink)
            .field("state", &self.state)
            .field("capture_source", &self.capture_source)
            .finish()
    }
}

impl<L, S> LogBridge<L, S>
where
    L: Logger + Send + Sync,
    S: LocalSink,
{
    /// Create a bridge emitting through a logger named after `service_name`.
    pub fn new<P>(provider: &P, sink: S, service_name: impl Into<Cow<'static, str>>) -> Self
    where
        P: LoggerProvider<Logger = L>,
    {
        let scope = InstrumentationScope::builder(service_name).build();
        LogBridge::from_logger(provider.logger_with_scope(scope), sink)
    }

    /// Create a bridge around an existing logger.
    pub fn from_logger(logger: L, sink: S) -> Self {
        LogBridge {
            logger: Arc::new(logger),
            sink: Arc::new(sink),
            state: HandlerState::new(),
            capture_source: true,
        }
    }

    /// A bridge whose records additionally carry `attributes`.
    pub fn with_attributes<I>(&self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        LogBridge {
            state: self.state.with_attributes(attributes),
            ..self.clone()
        }
    }

    /// A bridge whose records are tagged with the group `name`.
    pub fn with_group(&self, name: impl Into<Cow<'static, str>>) -> Self {
        LogBridge {
            state: self.state.with_group(name),
            ..self.clone()
        }
    }

    /// Turn the `source` attribute on or off. On by default.
    pub fn with_source_location(mut self, enabled: bool) -> Self {
        self.capture_source = enabled;
        self
    }

    /// The accumulated handler state.
    pub fn state(&self) -> &HandlerState {
        &self.state
    }

    /// Always true: level filtering is left to the sinks.
    pub fn enabled(&self, _level: Level) -> bool {
        true
    }

    /// Enrich `entry` and hand it to both sinks.
    ///
    /// `cx` supplies the active span. The remote emit cannot fail; an error is
    /// only returned when the local sink fails, after the remote emit.
    pub fn handle(&self, cx: &Context, entry: Entry) -> Result<(), SinkError> {
        let record = self.build_record(cx, entry);
        self.emit_remote(&record);
        self.sink.write(&record)
    }

    /// Log `message` under the current context, attributed to the caller.
    ///
    /// Local sink failures are reported through the crate's diagnostics and
    /// otherwise ignored.
    #[track_caller]
    pub fn log(&self, level: Level, message: impl Into<String>, attributes: &[KeyValue]) {
        let entry = Entry::new(level, message).with_attributes(attributes.iter().cloned());
        if let Err(err) = self.handle(&Context::current(), entry) {
            let reason = err.to_string();
            otel_warn!(name: "Facade.LocalSinkFailed", reason = reason.as_str());
        }
    }

    /// Log at `DEBUG`.
    #[track_caller]
    pub fn debug(&self, message: impl Into<String>, attributes: &[KeyValue]) {
        self.log(Level::DEBUG, message, attributes)
    }

    /// Log at `INFO`.
    #[track_caller]
    pub fn info(&self, message: impl Into<String>, attributes: &[KeyValue]) {
        self.log(Level::INFO, message, attributes)
    }

    /// Log at `WARN`.
    #[track_caller]
    pub fn warn(&self, message: impl Into<String>, attributes: &[KeyValue]) {
        self.log(Level::WARN, message, attributes)
    }

    /// Log at `ERROR`.
    #[track_caller]
    pub fn error(&self, message: impl Into<String>, attributes: &[KeyValue]) {
        self.log(Level::ERROR, message, attributes)
    }

    fn build_record(&self, cx: &Context, entry: Entry) -> CanonicalRecord {
        let observed_timestamp = SystemTime::now();
        let Entry {
            level,
            message,
            attributes: entry_attributes,
            timestamp,
            location,
        } = entry;

        let mut attributes =
            Vec::with_capacity(self.state.attributes().len() + entry_attributes.len() + 4);
        attributes.extend(self.state.attributes().iter().cloned());
        attributes.extend(entry_attributes);

        if let Some(group) = self.state.group() {
            attributes.push(KeyValue::new(GROUP_KEY, group.to_owned()));
        }

        let trace_context = correlation::extract(cx);
        if let Some(tc) = &trace_context {
            attributes.push(KeyValue::new(TRACE_ID_KEY, tc.trace_id.to_string()));
            attributes.push(KeyValue::new(SPAN_ID_KEY, tc.span_id.to_string()));
        }

        let source = location
            .filter(|_| self.capture_source)
            .map(|location| format!("{}:{}", location.file(), location.line()));
        if let Some(source) = &source {
            attributes.push(KeyValue::new(SOURCE_KEY, source.clone()));
        }

        let (severity, severity_text) = map_severity(level);

        CanonicalRecord {
            timestamp,
            observed_timestamp,
            level,
            severity,
            severity_text,
            body: message,
            attributes,
            trace_context,
            source,
        }
    }

    fn emit_remote(&self, record: &CanonicalRecord) {
        let mut log_record = self.logger.create_log_record();
        log_record.set_timestamp(record.timestamp);
        log_record.set_observed_timestamp(record.observed_timestamp);
        log_record.set_severity_number(record.severity);
        log_record.set_severity_text(record.severity_text);
        log_record.set_body(AnyValue::from(record.body.clone()));
        log_record.add_attributes(
            record
                .attributes
                .iter()
                .map(|kv| (kv.key.clone(), to_any_value(&kv.value))),
        );
        if let Some(tc) = &record.trace_context {
            log_record.set_trace_context(tc.trace_id, tc.span_id, Some(tc.trace_flags));
        }
        self.logger.emit(log_record);
    }
}
