//! Span helpers and trace correlation.
//!
//! Spans are started from an explicit tracer provider rather than the global
//! one, and returned as a [`Context`] holding the new span. Outcomes are
//! recorded on the span found in that context:
//!
//! ```no_run
//! use opentelemetry::trace::TraceContextExt;
//! use opentelemetry::Context;
//! use opentelemetry_facade::trace::{mark_error, mark_success, start_span};
//! use opentelemetry_sdk::trace::SdkTracerProvider;
//!
//! # fn charge() -> Result<(), std::io::Error> { Ok(()) }
//! let provider = SdkTracerProvider::builder().build();
//! let cx = start_span(&Context::current(), &provider, "charge-card");
//! let span = cx.span();
//! match charge() {
//!     Ok(()) => mark_success(&span, "payments"),
//!     Err(err) => mark_error(&span, "payments", &err),
//! }
//! span.end();
//! ```
pub(crate) mod correlation;
mod propagation;

pub use correlation::{extract, TraceCorrelation};
pub use propagation::MessagingPropagator;

use opentelemetry::trace::{SpanKind, SpanRef, Status, TraceContextExt, Tracer, TracerProvider};
use opentelemetry::{Context, KeyValue};
use std::borrow::Cow;
use std::error::Error;

/// Name of the tracer spans are started with.
pub const TRACER_NAME: &str = "opentelemetry-facade";

/// Attribute carrying the error message on error events.
pub const ERROR_KEY: &str = "error";

/// Start an internal span named `name` as a child of the span in `cx`.
pub fn start_span<P>(cx: &Context, provider: &P, name: impl Into<Cow<'static, str>>) -> Context
where
    P: TracerProvider,
    <P::Tracer as Tracer>::Span: Send + Sync + 'static,
{
    start_span_with_kind(cx, provider, name, SpanKind::Internal)
}

/// Start a span of the given kind as a child of the span in `cx`.
pub fn start_span_with_kind<P>(
    cx: &Context,
    provider: &P,
    name: impl Into<Cow<'static, str>>,
    kind: SpanKind,
) -> Context
where
    P: TracerProvider,
    <P::Tracer as Tracer>::Span: Send + Sync + 'static,
{
    let tracer = provider.tracer(TRACER_NAME);
    let span = tracer
        .span_builder(name)
        .with_kind(kind)
        .start_with_context(&tracer, cx);
    cx.with_span(span)
}

/// Mark `span` as successful: status `Ok` and a `"{service} successful"` event.
pub fn mark_success(span: &SpanRef<'_>, service: &str) {
    span.set_status(Status::Ok);
    span.add_event(format!("{service} successful"), Vec::new());
}

/// Mark `span` as failed with `err`.
///
/// Records the error on the span, sets status `Error` with the error's
/// message and adds an event named after `service` carrying the message as
/// its `error` attribute.
pub fn mark_error(span: &SpanRef<'_>, service: &str, err: &dyn Error) {
    let message = err.to_string();
    span.record_error(err);
    span.set_status(Status::error(message.clone()));
    span.add_event(service.to_owned(), vec![KeyValue::new(ERROR_KEY, message)]);
}
