//! The resource descriptor shared by every provider.
use crate::config::Config;
use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;

/// Name of the deployment environment attribute.
pub const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";
/// Name of the runtime attribute.
pub const PROCESS_RUNTIME_NAME: &str = "process.runtime.name";
/// Name of the process id attribute.
pub const PROCESS_PID: &str = "process.pid";

/// Build the resource attached to every exported log, metric and span.
///
/// On top of the SDK defaults (`telemetry.sdk.*` and whatever
/// `OTEL_RESOURCE_ATTRIBUTES` carries) this sets the service name, the
/// deployment environment and a small runtime description.
pub fn build_resource(config: &Config) -> Resource {
    Resource::builder()
        .with_service_name(config.service_name().to_owned())
        .with_attributes([
            KeyValue::new(DEPLOYMENT_ENVIRONMENT, config.environment().to_owned()),
            KeyValue::new(PROCESS_RUNTIME_NAME, "rust"),
            KeyValue::new(PROCESS_PID, i64::from(std::process::id())),
        ])
        .build()
}
