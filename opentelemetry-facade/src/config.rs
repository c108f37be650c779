//! Immutable facade configuration.
//!
//! A [`Config`] is created once at startup, either through
//! [`Config::builder`] or [`Config::from_env`], and is read-only afterwards.
//! Building validates everything that can be checked without touching the
//! network, so an invalid endpoint URI is the only configuration problem left
//! for [`Telemetry::setup`](crate::Telemetry::setup) to report.
use crate::error::ConfigError;
use opentelemetry_sdk::trace::Sampler;
use std::env;
use std::time::Duration;
use tonic::metadata::{Ascii, MetadataMap, MetadataValue};

/// Target endpoint of the OTLP collector.
pub const OTEL_EXPORTER_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
/// Logical service name.
pub const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
/// Basic auth token sent with every export.
pub const OTEL_FACADE_TOKEN: &str = "OTEL_FACADE_TOKEN";
/// Deployment environment, e.g. `production`.
pub const OTEL_FACADE_ENVIRONMENT: &str = "OTEL_FACADE_ENVIRONMENT";
/// Organization (tenant) header value.
pub const OTEL_FACADE_ORGANIZATION: &str = "OTEL_FACADE_ORGANIZATION";
/// Stream name header value.
pub const OTEL_FACADE_STREAM_NAME: &str = "OTEL_FACADE_STREAM_NAME";
/// Trace sampling ratio.
pub const OTEL_TRACES_SAMPLER_ARG: &str = "OTEL_TRACES_SAMPLER_ARG";

/// Default export timeout for every exporter.
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default interval between two metric exports.
pub const DEFAULT_METRIC_INTERVAL: Duration = Duration::from_secs(10);

pub(crate) const AUTHORIZATION_HEADER: &str = "authorization";
pub(crate) const ORGANIZATION_HEADER: &str = "organization";
pub(crate) const STREAM_NAME_HEADER: &str = "stream-name";

/// Bounded exponential backoff used while bringing providers up.
///
/// Only provider construction is retried. Export batches are not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Upper bound for a single delay.
    pub max_interval: Duration,
    /// Total time budget across all attempts.
    pub max_elapsed_time: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(10),
            max_elapsed_time: Duration::from_secs(30),
        }
    }
}

/// Configuration of the telemetry facade.
#[derive(Clone, Debug)]
pub struct Config {
    host: String,
    token: String,
    service_name: String,
    environment: String,
    organization: String,
    stream_name: String,
    sample_rate: f64,
    export_timeout: Duration,
    metric_interval: Duration,
    retry: RetryConfig,
    metadata: MetadataMap,
}

// The metadata is derived from the header fields, so they decide equality.
impl PartialEq for Config {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.token == other.token
            && self.service_name == other.service_name
            && self.environment == other.environment
            && self.organization == other.organization
            && self.stream_name == other.stream_name
            && self.sample_rate == other.sample_rate
            && self.export_timeout == other.export_timeout
            && self.metric_interval == other.metric_interval
            && self.retry == other.retry
    }
}

impl Config {
    /// Create a new [`ConfigBuilder`].
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Build a configuration from the `OTEL_*` environment variables.
    ///
    /// `OTEL_EXPORTER_OTLP_ENDPOINT` and `OTEL_SERVICE_NAME` are required, the
    /// remaining variables default to empty strings and a sample rate of 0.
    pub fn from_env() -> Result<Config, ConfigError> {
        let mut builder = Config::builder();
        if let Some(host) = read_env(OTEL_EXPORTER_OTLP_ENDPOINT) {
            builder = builder.with_host(host);
        }
        if let Some(name) = read_env(OTEL_SERVICE_NAME) {
            builder = builder.with_service_name(name);
        }
        if let Some(token) = read_env(OTEL_FACADE_TOKEN) {
            builder = builder.with_token(token);
        }
        if let Some(environment) = read_env(OTEL_FACADE_ENVIRONMENT) {
            builder = builder.with_environment(environment);
        }
        if let Some(organization) = read_env(OTEL_FACADE_ORGANIZATION) {
            builder = builder.with_organization(organization);
        }
        if let Some(stream) = read_env(OTEL_FACADE_STREAM_NAME) {
            builder = builder.with_stream_name(stream);
        }
        if let Some(rate) = read_env(OTEL_TRACES_SAMPLER_ARG) {
            let rate = rate
                .trim()
                .parse::<f64>()
                .map_err(|err| ConfigError::InvalidValue {
                    name: OTEL_TRACES_SAMPLER_ARG.to_string(),
                    reason: err.to_string(),
                })?;
            builder = builder.with_sample_rate(rate);
        }
        builder.build()
    }

    /// The configured collector host, as given.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The collector endpoint URI. A host without a scheme is dialed over
    /// plain-text `http://`.
    pub fn endpoint(&self) -> String {
        if self.host.contains("://") {
            self.host.clone()
        } else {
            format!("http://{}", self.host)
        }
    }

    /// The auth token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The logical service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The deployment environment.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// The organization (tenant).
    pub fn organization(&self) -> &str {
        &self.organization
    }

    /// The stream name.
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// The trace sampling ratio; 0 disables sampling decisions altogether.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Timeout applied to a single export call.
    pub fn export_timeout(&self) -> Duration {
        self.export_timeout
    }

    /// Interval between two metric exports.
    pub fn metric_interval(&self) -> Duration {
        self.metric_interval
    }

    /// Backoff policy used while building providers.
    ///
    /// It does not apply to exports: a failed batch is handled by the
    /// exporter's own transport, bounded by [`Config::export_timeout`].
    pub fn retry(&self) -> RetryConfig {
        self.retry
    }

    /// Headers sent with every export batch, in wire order.
    pub fn headers(&self) -> [(&'static str, String); 3] {
        export_headers(&self.token, &self.organization, &self.stream_name)
    }

    /// The export headers as gRPC metadata, validated when the config was
    /// built.
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// The trace sampler derived from the sample rate.
    ///
    /// A rate of 0 samples everything; any other rate samples that ratio of
    /// root traces and follows the parent's decision otherwise.
    pub fn sampler(&self) -> Sampler {
        if self.sample_rate > 0.0 {
            Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(self.sample_rate)))
        } else {
            Sampler::AlwaysOn
        }
    }
}

/// Builder for [`Config`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    host: String,
    token: String,
    service_name: String,
    environment: String,
    organization: String,
    stream_name: String,
    sample_rate: f64,
    export_timeout: Duration,
    metric_interval: Duration,
    retry: RetryConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        ConfigBuilder {
            host: String::new(),
            token: String::new(),
            service_name: String::new(),
            environment: String::new(),
            organization: String::new(),
            stream_name: String::new(),
            sample_rate: 0.0,
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
            metric_interval: DEFAULT_METRIC_INTERVAL,
            retry: RetryConfig::default(),
        }
    }
}

impl ConfigBuilder {
    /// Set the collector host, with or without a scheme.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the basic auth token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Set the service name.
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    /// Set the deployment environment.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Set the organization.
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = organization.into();
        self
    }

    /// Set the stream name.
    pub fn with_stream_name(mut self, stream_name: impl Into<String>) -> Self {
        self.stream_name = stream_name.into();
        self
    }

    /// Set the trace sample rate.
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the export timeout.
    pub fn with_export_timeout(mut self, timeout: Duration) -> Self {
        self.export_timeout = timeout;
        self
    }

    /// Set the metric export interval.
    pub fn with_metric_interval(mut self, interval: Duration) -> Self {
        self.metric_interval = interval;
        self
    }

    /// Set the setup retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Validate and build the [`Config`].
    pub fn build(self) -> Result<Config, ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingField("host"));
        }
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::MissingField("service_name"));
        }
        if !self.sample_rate.is_finite() || !(0.0..=1.0).contains(&self.sample_rate) {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        let metadata = build_metadata(export_headers(
            &self.token,
            &self.organization,
            &self.stream_name,
        ))?;
        Ok(Config {
            host: self.host,
            token: self.token,
            service_name: self.service_name,
            environment: self.environment,
            organization: self.organization,
            stream_name: self.stream_name,
            sample_rate: self.sample_rate,
            export_timeout: self.export_timeout,
            metric_interval: self.metric_interval,
            retry: self.retry,
            metadata,
        })
    }
}

fn export_headers(token: &str, organization: &str, stream: &str) -> [(&'static str, String); 3] {
    [
        (AUTHORIZATION_HEADER, format!("Basic {token}")),
        (ORGANIZATION_HEADER, organization.to_string()),
        (STREAM_NAME_HEADER, stream.to_string()),
    ]
}

fn build_metadata(headers: [(&'static str, String); 3]) -> Result<MetadataMap, ConfigError> {
    let mut metadata = MetadataMap::with_capacity(headers.len());
    for (name, value) in headers {
        let value: MetadataValue<Ascii> = value.parse().map_err(|_| ConfigError::InvalidHeader {
            name,
            reason: "value must be visible ASCII".to_string(),
        })?;
        metadata.insert(name, value);
    }
    Ok(metadata)
}

fn read_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ConfigBuilder {
        Config::builder()
            .with_host("localhost:5081")
            .with_token("dXNlcjpwYXNz")
            .with_service_name("example-service")
            .with_environment("development")
            .with_organization("example-org")
            .with_stream_name("example-stream")
    }

    #[test]
    fn builder_requires_host_and_service_name() {
        assert_eq!(
            Config::builder().with_service_name("svc").build(),
            Err(ConfigError::MissingField("host"))
        );
        assert_eq!(
            Config::builder().with_host("localhost:4317").build(),
            Err(ConfigError::MissingField("service_name"))
        );
    }

    #[test]
    fn builder_rejects_out_of_range_sample_rate() {
        for rate in [-0.1, 1.5, f64::NAN, f64::INFINITY] {
            let err = base().with_sample_rate(rate).build().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidSampleRate(_)));
        }
        assert!(base().with_sample_rate(1.0).build().is_ok());
        assert!(base().with_sample_rate(0.0).build().is_ok());
    }

    #[test]
    fn builder_rejects_header_values_that_cannot_be_sent() {
        let err = base().with_organization("org\nname").build().unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidHeader {
                name: ORGANIZATION_HEADER,
                reason: "value must be visible ASCII".to_string(),
            }
        );
    }

    #[test]
    fn equal_configs_compare_equal() {
        let config = base().build().unwrap();
        assert_eq!(config, config.clone());
        assert_eq!(config, base().build().unwrap());
        assert_ne!(config, base().with_stream_name("other").build().unwrap());
    }

    #[test]
    fn headers_match_the_backend_contract() {
        let config = base().build().unwrap();
        let metadata = config.metadata();

        assert_eq!(metadata.len(), 3);
        assert_eq!(
            metadata.get("authorization").unwrap().to_str().unwrap(),
            "Basic dXNlcjpwYXNz"
        );
        assert_eq!(
            metadata.get("organization").unwrap().to_str().unwrap(),
            "example-org"
        );
        assert_eq!(
            metadata.get("stream-name").unwrap().to_str().unwrap(),
            "example-stream"
        );
    }

    #[test]
    fn endpoint_defaults_to_plain_http() {
        let config = base().build().unwrap();
        assert_eq!(config.endpoint(), "http://localhost:5081");

        let config = base().with_host("https://collector:4317").build().unwrap();
        assert_eq!(config.endpoint(), "https://collector:4317");
    }

    #[test]
    fn sampler_follows_sample_rate() {
        let config = base().build().unwrap();
        assert!(matches!(config.sampler(), Sampler::AlwaysOn));

        let config = base().with_sample_rate(0.25).build().unwrap();
        let sampler = config.sampler();
        assert!(matches!(sampler, Sampler::ParentBased(_)));
        let description = format!("{sampler:?}");
        assert!(
            description.contains("TraceIdRatioBased(0.25)"),
            "unexpected sampler {description}"
        );
    }

    #[test]
    fn defaults_for_timeouts_and_retry() {
        let config = base().build().unwrap();
        assert_eq!(config.export_timeout(), Duration::from_secs(5));
        assert_eq!(config.metric_interval(), Duration::from_secs(10));
        assert_eq!(config.retry(), RetryConfig::default());
        assert_eq!(config.retry().max_elapsed_time, Duration::from_secs(30));
    }

    #[test]
    fn from_env_reads_otel_variables() {
        temp_env::with_vars(
            [
                (OTEL_EXPORTER_OTLP_ENDPOINT, Some("collector:4317")),
                (OTEL_SERVICE_NAME, Some("env-service")),
                (OTEL_FACADE_TOKEN, Some("secret")),
                (OTEL_FACADE_ENVIRONMENT, Some("staging")),
                (OTEL_FACADE_ORGANIZATION, Some("tenant")),
                (OTEL_FACADE_STREAM_NAME, Some("stream")),
                (OTEL_TRACES_SAMPLER_ARG, Some("0.5")),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.host(), "collector:4317");
                assert_eq!(config.service_name(), "env-service");
                assert_eq!(config.token(), "secret");
                assert_eq!(config.environment(), "staging");
                assert_eq!(config.organization(), "tenant");
                assert_eq!(config.stream_name(), "stream");
                assert_eq!(config.sample_rate(), 0.5);
            },
        );
    }

    #[test]
    fn from_env_rejects_unparsable_sample_rate() {
        temp_env::with_vars(
            [
                (OTEL_EXPORTER_OTLP_ENDPOINT, Some("collector:4317")),
                (OTEL_SERVICE_NAME, Some("env-service")),
                (OTEL_TRACES_SAMPLER_ARG, Some("half")),
            ],
            || {
                let err = Config::from_env().unwrap_err();
                assert!(matches!(
                    err,
                    ConfigError::InvalidValue { ref name, .. } if name == OTEL_TRACES_SAMPLER_ARG
                ));
            },
        );
    }

    #[test]
    fn from_env_requires_endpoint() {
        temp_env::with_vars(
            [
                (OTEL_EXPORTER_OTLP_ENDPOINT, None::<&str>),
                (OTEL_SERVICE_NAME, Some("env-service")),
            ],
            || {
                assert_eq!(Config::from_env(), Err(ConfigError::MissingField("host")));
            },
        );
    }
}
