//! Local, terminal log sinks.
//!
//! The local sink is the last stop of every record and the one that has to
//! work when the remote pipeline does not.
use super::CanonicalRecord;
use crate::error::SinkError;
use chrono::{DateTime, SecondsFormat, Utc};
use opentelemetry::{KeyValue, Value};
use std::fmt;
use std::io::Write;
use std::sync::Mutex;
use tracing::Level;

/// A local writer of [`CanonicalRecord`]s.
pub trait LocalSink: Send + Sync + fmt::Debug {
    /// Write one record.
    fn write(&self, record: &CanonicalRecord) -> Result<(), SinkError>;
}

/// Re-emits every record as a `tracing` event at the record's level.
///
/// The record's attributes are carried in a single `attributes` field and the
/// body becomes the event message, so any installed subscriber, such as
/// `tracing_subscriber::fmt`, prints it. Do not combine this sink with a
/// subscriber layer that forwards `tracing` events back into the same
/// logger provider, or every record will be exported twice.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LocalSink for TracingSink {
    fn write(&self, record: &CanonicalRecord) -> Result<(), SinkError> {
        let attributes = DisplayAttributes(record.attributes());
        let body = record.body();
        match record.level() {
            Level::ERROR => {
                tracing::error!(target: "opentelemetry_facade", attributes = %attributes, "{body}")
            }
            Level::WARN => {
                tracing::warn!(target: "opentelemetry_facade", attributes = %attributes, "{body}")
            }
            Level::DEBUG => {
                tracing::debug!(target: "opentelemetry_facade", attributes = %attributes, "{body}")
            }
            _ => tracing::info!(target: "opentelemetry_facade", attributes = %attributes, "{body}"),
        }
        Ok(())
    }
}

struct DisplayAttributes<'a>(&'a [KeyValue]);

impl fmt::Display for DisplayAttributes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, kv) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", kv.key, kv.value)?;
        }
        Ok(())
    }
}

/// Writes one JSON object per record and line.
///
/// Objects start with `time` (RFC 3339, UTC), `level` and `msg`, followed by
/// every attribute in emit order. Repeated keys are written repeatedly rather
/// than collapsed, so the last occurrence is what most JSON readers keep.
#[derive(Debug)]
pub struct JsonSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonSink<W> {
    /// Create a sink writing to `writer`.
    pub fn new(writer: W) -> Self {
        JsonSink {
            writer: Mutex::new(writer),
        }
    }

    /// Consume the sink and return the writer.
    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer.into_inner().map_err(|_| SinkError::Poisoned)
    }
}

impl JsonSink<std::io::Stdout> {
    /// A sink writing to standard output.
    pub fn stdout() -> Self {
        JsonSink::new(std::io::stdout())
    }
}

impl<W> LocalSink for JsonSink<W>
where
    W: Write + Send + fmt::Debug,
{
    fn write(&self, record: &CanonicalRecord) -> Result<(), SinkError> {
        let line = encode_json_line(record)?;
        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}

fn encode_json_line(record: &CanonicalRecord) -> Result<Vec<u8>, SinkError> {
    let time = DateTime::<Utc>::from(record.timestamp()).to_rfc3339_opts(SecondsFormat::Nanos, true);

    let mut buf = Vec::with_capacity(128);
    buf.extend_from_slice(b"{\"time\":");
    serde_json::to_writer(&mut buf, &time)?;
    buf.extend_from_slice(b",\"level\":");
    serde_json::to_writer(&mut buf, record.severity_text())?;
    buf.extend_from_slice(b",\"msg\":");
    serde_json::to_writer(&mut buf, record.body())?;
    for kv in record.attributes() {
        buf.push(b',');
        serde_json::to_writer(&mut buf, kv.key.as_str())?;
        buf.push(b':');
        serde_json::to_writer(&mut buf, &to_json_value(&kv.value))?;
    }
    buf.extend_from_slice(b"}\n");
    Ok(buf)
}

fn to_json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::I64(i) => serde_json::Value::from(*i),
        // NaN and infinities have no JSON representation and become null.
        Value::F64(f) => serde_json::Value::from(*f),
        Value::String(s) => serde_json::Value::String(s.as_str().to_owned()),
        other => serde_json::Value::String(other.as_str().into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::logs::Severity;
    use std::time::{Duration, SystemTime};

    fn record(attributes: Vec<KeyValue>) -> CanonicalRecord {
        CanonicalRecord {
            timestamp: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            observed_timestamp: SystemTime::now(),
            level: Level::WARN,
            severity: Severity::Warn,
            severity_text: "WARN",
            body: "disk \"almost\" full".to_string(),
            attributes,
            trace_context: None,
            source: None,
        }
    }

    fn written(sink: JsonSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn json_line_has_fixed_prefix_and_ordered_attributes() {
        let sink = JsonSink::new(Vec::new());
        sink.write(&record(vec![
            KeyValue::new("disk", "/dev/sda1"),
            KeyValue::new("used", 97),
            KeyValue::new("ratio", 0.97),
            KeyValue::new("alert", true),
        ]))
        .unwrap();

        assert_eq!(
            written(sink),
            "{\"time\":\"2023-11-14T22:13:20.000000000Z\",\"level\":\"WARN\",\
             \"msg\":\"disk \\\"almost\\\" full\",\"disk\":\"/dev/sda1\",\"used\":97,\
             \"ratio\":0.97,\"alert\":true}\n"
        );
    }

    #[test]
    fn json_sink_keeps_duplicate_keys() {
        let sink = JsonSink::new(Vec::new());
        sink.write(&record(vec![
            KeyValue::new("k", "first"),
            KeyValue::new("k", "second"),
        ]))
        .unwrap();

        let line = written(sink);
        let first = line.find("\"k\":\"first\"").unwrap();
        let second = line.find("\"k\":\"second\"").unwrap();
        assert!(first < second);
    }

    #[test]
    fn json_sink_writes_one_line_per_record() {
        let sink = JsonSink::new(Vec::new());
        for _ in 0..3 {
            sink.write(&record(Vec::new())).unwrap();
        }
        let text = written(sink);
        assert_eq!(text.lines().count(), 3);
        for line in text.lines() {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["level"], "WARN");
        }
    }

    #[test]
    fn attributes_display_as_key_value_pairs() {
        let attributes = [KeyValue::new("a", 1), KeyValue::new("b", "x")];
        assert_eq!(DisplayAttributes(&attributes).to_string(), "a=1 b=x");
    }

    #[test]
    fn tracing_sink_never_fails() {
        assert!(TracingSink.write(&record(Vec::new())).is_ok());
    }
}
