use opentelemetry::trace::{SpanId, TraceContextExt, TraceFlags, TraceId};
use opentelemetry::Context;

/// Identifiers of the span a log record was emitted under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceCorrelation {
    /// The active trace.
    pub trace_id: TraceId,
    /// The active span.
    pub span_id: SpanId,
    /// The span's trace flags.
    pub trace_flags: TraceFlags,
}

/// Extract the correlation of the span active in `cx`.
///
/// Returns `None` when no span is active or the active span is not recording,
/// which covers no-op spans, sampled-out spans and remote parents.
pub fn extract(cx: &Context) -> Option<TraceCorrelation> {
    let span = cx.span();
    if !span.is_recording() {
        return None;
    }
    let span_context = span.span_context();
    if !span_context.is_valid() {
        return None;
    }
    Some(TraceCorrelation {
        trace_id: span_context.trace_id(),
        span_id: span_context.span_id(),
        trace_flags: span_context.trace_flags(),
    })
}
