use opentelemetry::logs::Severity;
use tracing::Level;

/// Map a `tracing` level to the OpenTelemetry severity and its text.
///
/// Only `ERROR`, `WARN`, `INFO` and `DEBUG` have their own severity. Every
/// other level, `TRACE` included, is reported as `INFO`.
pub fn map_severity(level: Level) -> (Severity, &'static str) {
    match level {
        Level::ERROR => (Severity::Error, "ERROR"),
        Level::WARN => (Severity::Warn, "WARN"),
        Level::INFO => (Severity::Info, "INFO"),
        Level::DEBUG => (Severity::Debug, "DEBUG"),
        _ => (Severity::Info, "INFO"),
    }
}
