use opentelemetry::trace::TraceContextExt;
use opentelemetry::{Context, KeyValue};
use opentelemetry_facade::logs::{LogBridge, TracingSink};
use opentelemetry_facade::trace::{mark_error, mark_success, start_span, MessagingPropagator};
use opentelemetry_facade::{Config, MetricsRecorder, Telemetry};
use std::collections::HashMap;
use std::error::Error;
use std::io;
use std::time::{Duration, Instant};

const SERVICE: &str = "basic-facade";

fn config() -> Result<Config, Box<dyn Error>> {
    // Falls back to a local collector when the environment is not set up.
    match Config::from_env() {
        Ok(config) => Ok(config),
        Err(_) => Ok(Config::builder()
            .with_host("localhost:4317")
            .with_service_name(SERVICE)
            .with_environment("development")
            .with_sample_rate(1.0)
            .build()?),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let telemetry = Telemetry::new(config()?);
    let providers = telemetry.setup()?;

    let logger = LogBridge::new(providers.logger_provider(), TracingSink, SERVICE)
        .with_attributes([KeyValue::new("component", "demo")]);
    let recorder = MetricsRecorder::new(providers.meter_provider(), "basic_facade")?;
    let propagator = MessagingPropagator::new();

    for order in 1..=3_i64 {
        let started = Instant::now();
        let cx = start_span(&Context::new(), providers.tracer_provider(), "handle-order");
        let request_logger = logger
            .with_attributes([KeyValue::new("order_id", order)])
            .with_group("orders");
        {
            let _guard = cx.clone().attach();
            request_logger.info("order received", &[]);

            // Hand the order to a queue consumer in the same process.
            let mut headers: HashMap<String, String> = HashMap::new();
            let producer = propagator.start_producer_span(
                &Context::current(),
                providers.tracer_provider(),
                "publish-order",
            );
            propagator.inject(&producer, &mut headers);
            producer.span().end();

            let remote = propagator.extract(&Context::new(), &headers);
            let consumer = propagator.start_consumer_span(
                &remote,
                providers.tracer_provider(),
                "consume-order",
            );
            {
                let _guard = consumer.clone().attach();
                request_logger.debug("order consumed", &[]);
            }
            consumer.span().end();

            let span = cx.span();
            if order % 3 == 0 {
                let err = io::Error::other("payment declined");
                request_logger.error("order failed", &[KeyValue::new("reason", err.to_string())]);
                mark_error(&span, SERVICE, &err);
                recorder.record_failed(&[KeyValue::new("route", "/orders")]);
            } else {
                mark_success(&span, SERVICE);
                recorder.record_accepted(&[KeyValue::new("route", "/orders")]);
            }
        }

        recorder.record_latency(started.elapsed(), &[KeyValue::new("route", "/orders")]);
        cx.span().end();
    }

    if let Err(err) = telemetry.shutdown(Duration::from_secs(5)) {
        tracing::warn!("telemetry shutdown incomplete: {err}");
    }
    Ok(())
}
