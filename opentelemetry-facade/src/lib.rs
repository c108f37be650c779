//! # OpenTelemetry Facade
//!
//! A process-wide telemetry facade on top of the OpenTelemetry SDK. It owns
//! the log, metric and trace providers of a service, correlates application
//! log records with the active span, and offers a few small recording
//! helpers.
//!
//! ## Features
//!
//! - [`Telemetry`] brings the three providers up in a fixed order over
//!   OTLP/gRPC, rolls back on partial failure and shuts everything down under a
//!   single deadline, reporting every failed stage.
//! - [`logs::LogBridge`] turns each log call into one record carrying the
//!   accumulated attributes, the active `trace_id`/`span_id` and the
//!   call-site, and sends it to the remote logger and a local sink.
//! - [`MetricsRecorder`] counts accepted and failed requests and records their
//!   latency.
//! - [`trace`] starts spans, marks their outcome and propagates context across
//!   message queues.
//!
//! Nothing is installed globally: [`Telemetry::setup`] hands back the
//! [`Providers`] and callers pass them where they are needed.
//!
//! ## Getting Started
//!
//! ```no_run
//! use opentelemetry::trace::TraceContextExt;
//! use opentelemetry::{Context, KeyValue};
//! use opentelemetry_facade::logs::{LogBridge, TracingSink};
//! use opentelemetry_facade::trace::{mark_success, start_span};
//! use opentelemetry_facade::{Config, MetricsRecorder, Telemetry};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let telemetry = Telemetry::new(config);
//! let providers = telemetry.setup()?;
//!
//! let logger = LogBridge::new(providers.logger_provider(), TracingSink, "checkout");
//! let recorder = MetricsRecorder::new(providers.meter_provider(), "checkout")?;
//!
//! let cx = start_span(&Context::current(), providers.tracer_provider(), "place-order");
//! {
//!     let _guard = cx.clone().attach();
//!     logger.info("order placed", &[KeyValue::new("items", 3)]);
//! }
//! recorder.record_accepted(&[]);
//! mark_success(&cx.span(), "checkout");
//! cx.span().end();
//!
//! telemetry.shutdown(Duration::from_secs(5))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `internal-logs` (default): emit the crate's own diagnostics, and those of
//!   the OpenTelemetry crates it uses, as `tracing` events.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

pub mod config;
mod error;
pub mod logs;
mod metrics;
mod provider;
pub mod resource;
mod retry;
pub mod trace;

pub use config::{Config, ConfigBuilder, RetryConfig};
pub use error::{ConfigError, RecorderError, SetupError, ShutdownError, SinkError, Stage};
pub use metrics::MetricsRecorder;
pub use provider::{LifecycleState, OtlpProviderFactory, ProviderFactory, Providers, Telemetry};
