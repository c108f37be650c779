//! Log-to-trace correlation bridge.
//!
//! A [`LogBridge`] takes log calls from application code, enriches them with
//! accumulated attributes, a group label, the active span's ids and the
//! call-site, and sends the resulting [`CanonicalRecord`] to an OpenTelemetry
//! logger and to a [`LocalSink`].
//!
//! ```no_run
//! use opentelemetry::KeyValue;
//! use opentelemetry_facade::logs::{LogBridge, TracingSink};
//! use opentelemetry_sdk::logs::SdkLoggerProvider;
//!
//! let provider = SdkLoggerProvider::builder().build();
//! let logger = LogBridge::new(&provider, TracingSink, "checkout");
//! let request_logger = logger
//!     .with_attributes([KeyValue::new("request_id", "4f2a")])
//!     .with_group("http");
//! request_logger.info("order accepted", &[KeyValue::new("items", 3)]);
//! ```
mod bridge;
mod handler_state;
mod record;
mod severity;
mod sink;

pub use bridge::{LogBridge, GROUP_KEY, SOURCE_KEY, SPAN_ID_KEY, TRACE_ID_KEY};
pub use handler_state::HandlerState;
pub use record::{CanonicalRecord, Entry};
pub use severity::map_severity;
pub use sink::{JsonSink, LocalSink, TracingSink};
