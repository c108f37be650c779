use super::start_span_with_kind;
use opentelemetry::propagation::{
    Extractor, Injector, TextMapCompositePropagator, TextMapPropagator,
};
use opentelemetry::trace::{SpanKind, Tracer, TracerProvider};
use opentelemetry::Context;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use std::borrow::Cow;
use std::fmt;

/// Carries trace context and baggage across message queues.
///
/// Uses the W3C `traceparent`/`tracestate` and `baggage` headers. Producers
/// [`inject`](Self::inject) into the outgoing message's headers, consumers
/// [`extract`](Self::extract) from them and start a consumer span under the
/// returned context.
pub struct MessagingPropagator {
    propagator: TextMapCompositePropagator,
}

impl fmt::Debug for MessagingPropagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingPropagator")
            .field("fields", &self.propagator.fields().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for MessagingPropagator {
    fn default() -> Self {
        MessagingPropagator::new()
    }
}

impl MessagingPropagator {
    /// Create a trace context plus baggage propagator.
    pub fn new() -> Self {
        MessagingPropagator {
            propagator: TextMapCompositePropagator::new(vec![
                Box::new(TraceContextPropagator::new()),
                Box::new(BaggagePropagator::new()),
            ]),
        }
    }

    /// Write the span and baggage of `cx` into `carrier`.
    pub fn inject(&self, cx: &Context, carrier: &mut dyn Injector) {
        self.propagator.inject_context(cx, carrier);
    }

    /// Read a remote span and baggage from `carrier` on top of `cx`.
    pub fn extract(&self, cx: &Context, carrier: &dyn Extractor) -> Context {
        self.propagator.extract_with_context(cx, carrier)
    }

    /// Start a consumer span, usually under a context from [`extract`](Self::extract).
    pub fn start_consumer_span<P>(
        &self,
        cx: &Context,
        provider: &P,
        name: impl Into<Cow<'static, str>>,
    ) -> Context
    where
        P: TracerProvider,
        <P::Tracer as Tracer>::Span: Send + Sync + 'static,
    {
        start_span_with_kind(cx, provider, name, SpanKind::Consumer)
    }

    /// Start a producer span; inject its context into the outgoing message.
    pub fn start_producer_span<P>(
        &self,
        cx: &Context,
        provider: &P,
        name: impl Into<Cow<'static, str>>,
    ) -> Context
    where
        P: TracerProvider,
        <P::Tracer as Tracer>::Span: Send + Sync + 'static,
    {
        start_span_with_kind(cx, provider, name, SpanKind::Producer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::baggage::BaggageExt;
    use opentelemetry::trace::TraceContextExt;
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
    use std::collections::HashMap;

    #[test]
    fn producer_context_reaches_the_consumer() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let propagator = MessagingPropagator::new();

        let producer_cx = propagator
            .start_producer_span(&Context::new(), &provider, "publish")
            .with_baggage([KeyValue::new("tenant", "acme")]);
        let mut headers: HashMap<String, String> = HashMap::new();
        propagator.inject(&producer_cx, &mut headers);
        assert!(headers.contains_key("traceparent"));
        assert!(headers.contains_key("baggage"));

        let remote_cx = propagator.extract(&Context::new(), &headers);
        assert_eq!(
            remote_cx.baggage().get("tenant").map(|v| v.to_string()),
            Some("acme".to_string())
        );
        let consumer_cx = propagator.start_consumer_span(&remote_cx, &provider, "process");
        consumer_cx.span().end();
        producer_cx.span().end();

        let spans = exporter.get_finished_spans().unwrap();
        let consumer = spans.iter().find(|s| s.name == "process").unwrap();
        let producer = spans.iter().find(|s| s.name == "publish").unwrap();
        assert_eq!(consumer.span_kind, SpanKind::Consumer);
        assert_eq!(producer.span_kind, SpanKind::Producer);
        assert_eq!(
            consumer.span_context.trace_id(),
            producer.span_context.trace_id()
        );
        assert_eq!(consumer.parent_span_id, producer.span_context.span_id());
    }

    #[test]
    fn empty_carrier_yields_no_remote_span() {
        let propagator = MessagingPropagator::new();
        let headers: HashMap<String, String> = HashMap::new();

        let cx = propagator.extract(&Context::new(), &headers);

        assert!(!cx.span().span_context().is_valid());
    }
}
