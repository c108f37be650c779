//! Provider lifecycle management.
//!
//! [`Telemetry`] owns the three SDK providers. Setup brings them up in a
//! fixed order (logs, metrics, traces) so that the later stages can already be
//! observed through the log pipeline, and rolls back every stage that came up
//! if a later one fails. Shutdown attempts all three stages under a single
//! deadline and reports every failure at once.
//!
//! Providers are never installed into [`opentelemetry::global`]; callers get a
//! [`Providers`] handle back from [`Telemetry::setup`] and pass it on to the
//! components that need it.
use crate::config::Config;
use crate::error::{SetupError, ShutdownError, Stage};
use crate::resource::build_resource;
use crate::retry::retry_with_exponential_backoff;
use opentelemetry::{otel_debug, otel_error, otel_info, otel_warn};
use opentelemetry_otlp::{
    ExporterBuildError, LogExporter, MetricExporter, SpanExporter, WithExportConfig,
    WithTonicConfig,
};
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use std::fmt;
use std::sync::{mpsc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Lifecycle of a [`Telemetry`] instance.
///
/// ```text
/// Unconfigured -> Starting -> Running -> ShuttingDown -> Stopped
///                    \
///                     -> FailedInit
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created, setup not called yet.
    Unconfigured,
    /// Setup in progress.
    Starting,
    /// All three providers are live.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
    /// Shutdown completed, successfully or not.
    Stopped,
    /// Setup failed; every stage that came up was shut down again.
    FailedInit,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unconfigured => "unconfigured",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting down",
            LifecycleState::Stopped => "stopped",
            LifecycleState::FailedInit => "failed init",
        };
        f.write_str(name)
    }
}

/// The live provider bundle.
///
/// Cloning is cheap: every provider is a reference-counted handle.
#[derive(Clone, Debug)]
pub struct Providers {
    logger_provider: SdkLoggerProvider,
    meter_provider: SdkMeterProvider,
    tracer_provider: SdkTracerProvider,
}

impl Providers {
    /// The log provider.
    pub fn logger_provider(&self) -> &SdkLoggerProvider {
        &self.logger_provider
    }

    /// The meter provider.
    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.meter_provider
    }

    /// The tracer provider.
    pub fn tracer_provider(&self) -> &SdkTracerProvider {
        &self.tracer_provider
    }
}

/// Builds the three providers for a [`Telemetry`] instance.
///
/// [`OtlpProviderFactory`] is the production implementation; tests and
/// embedders can swap in their own exporters through this trait.
pub trait ProviderFactory: Send + Sync + fmt::Debug {
    /// Build the log provider.
    fn build_logger_provider(
        &self,
        config: &Config,
        resource: &Resource,
    ) -> Result<SdkLoggerProvider, ExporterBuildError>;

    /// Build the meter provider.
    fn build_meter_provider(
        &self,
        config: &Config,
        resource: &Resource,
    ) -> Result<SdkMeterProvider, ExporterBuildError>;

    /// Build the tracer provider.
    fn build_tracer_provider(
        &self,
        config: &Config,
        resource: &Resource,
    ) -> Result<SdkTracerProvider, ExporterBuildError>;
}

/// Exports every signal over OTLP/gRPC to [`Config::endpoint`].
///
/// Logs and spans go through batch processors, metrics through a periodic
/// reader using [`Config::metric_interval`]. Every exporter sends the
/// [`Config::headers`] as gRPC metadata.
///
/// The tonic channel is created lazily but must be created inside a Tokio
/// runtime, so [`Telemetry::setup`] has to run within one when this factory is
/// used.
#[derive(Clone, Copy, Debug, Default)]
pub struct OtlpProviderFactory;

impl ProviderFactory for OtlpProviderFactory {
    fn build_logger_provider(
        &self,
        config: &Config,
        resource: &Resource,
    ) -> Result<SdkLoggerProvider, ExporterBuildError> {
        let exporter = LogExporter::builder()
            .with_tonic()
            .with_endpoint(config.endpoint())
            .with_timeout(config.export_timeout())
            .with_metadata(config.metadata().clone())
            .build()?;
        Ok(SdkLoggerProvider::builder()
            .with_resource(resource.clone())
            .with_batch_exporter(exporter)
            .build())
    }

    fn build_meter_provider(
        &self,
        config: &Config,
        resource: &Resource,
    ) -> Result<SdkMeterProvider, ExporterBuildError> {
        let exporter = MetricExporter::builder()
            .with_tonic()
            .with_endpoint(config.endpoint())
            .with_timeout(config.export_timeout())
            .with_metadata(config.metadata().clone())
            .build()?;
        let reader = PeriodicReader::builder(exporter)
            .with_interval(config.metric_interval())
            .build();
        Ok(SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(reader)
            .build())
    }

    fn build_tracer_provider(
        &self,
        config: &Config,
        resource: &Resource,
    ) -> Result<SdkTracerProvider, ExporterBuildError> {
        let exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(config.endpoint())
            .with_timeout(config.export_timeout())
            .with_metadata(config.metadata().clone())
            .build()?;
        Ok(SdkTracerProvider::builder()
            .with_resource(resource.clone())
            .with_sampler(config.sampler())
            .with_batch_exporter(exporter)
            .build())
    }
}

// Exporter construction only fails transiently when the SDK could not get a
// thread or hit an internal error; URI and configuration problems stay broken.
fn is_transient(err: &ExporterBuildError) -> bool {
    matches!(
        err,
        ExporterBuildError::ThreadSpawnFailed | ExporterBuildError::InternalFailure(_)
    )
}

struct Inner {
    state: LifecycleState,
    providers: Option<Providers>,
}

/// Owner of the log, metric and trace providers.
pub struct Telemetry {
    config: Config,
    factory: Box<dyn ProviderFactory>,
    inner: Mutex<Inner>,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("service_name", &self.config.service_name())
            .field("state", &self.state())
            .field("factory", &self.factory)
            .finish()
    }
}

impl Telemetry {
    /// Create an unconfigured instance exporting over OTLP/gRPC.
    pub fn new(config: Config) -> Self {
        Telemetry::with_factory(config, OtlpProviderFactory)
    }

    /// Create an unconfigured instance using `factory` to build providers.
    pub fn with_factory<F>(config: Config, factory: F) -> Self
    where
        F: ProviderFactory + 'static,
    {
        Telemetry {
            config,
            factory: Box::new(factory),
            inner: Mutex::new(Inner {
                state: LifecycleState::Unconfigured,
                providers: None,
            }),
        }
    }

    /// The configuration this instance was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lock().state
    }

    /// The live providers, if setup succeeded and shutdown has not started.
    pub fn providers(&self) -> Option<Providers> {
        self.lock().providers.clone()
    }

    /// Bring up the log, meter and tracer providers, in that order.
    ///
    /// If a stage fails, every stage that already came up is shut down before
    /// the failing stage's error is returned and the instance ends up in
    /// [`LifecycleState::FailedInit`]. Setup is only allowed once.
    pub fn setup(&self) -> Result<Providers, SetupError> {
        let mut inner = self.lock();
        if inner.state != LifecycleState::Unconfigured {
            return Err(SetupError::InvalidState(inner.state));
        }
        inner.state = LifecycleState::Starting;
        otel_info!(
            name: "Facade.SetupStarted",
            service_name = self.config.service_name(),
            endpoint = self.config.endpoint().as_str()
        );

        let resource = build_resource(&self.config);

        let logger_provider = match self.build_stage(Stage::Logs, || {
            self.factory.build_logger_provider(&self.config, &resource)
        }) {
            Ok(provider) => provider,
            Err(err) => return Err(fail_setup(&mut inner, err)),
        };

        let meter_provider = match self.build_stage(Stage::Metrics, || {
            self.factory.build_meter_provider(&self.config, &resource)
        }) {
            Ok(provider) => provider,
            Err(err) => {
                let deadline = self.rollback_deadline();
                rollback(Stage::Logs, deadline, move || logger_provider.shutdown());
                return Err(fail_setup(&mut inner, err));
            }
        };

        let tracer_provider = match self.build_stage(Stage::Traces, || {
            self.factory.build_tracer_provider(&self.config, &resource)
        }) {
            Ok(provider) => provider,
            Err(err) => {
                let deadline = self.rollback_deadline();
                rollback(Stage::Metrics, deadline, move || meter_provider.shutdown());
                rollback(Stage::Logs, deadline, move || logger_provider.shutdown());
                return Err(fail_setup(&mut inner, err));
            }
        };

        let providers = Providers {
            logger_provider,
            meter_provider,
            tracer_provider,
        };
        inner.providers = Some(providers.clone());
        inner.state = LifecycleState::Running;
        otel_info!(name: "Facade.SetupCompleted");
        Ok(providers)
    }

    /// Shut down the log, meter and tracer providers, in that order.
    ///
    /// All three stages are attempted even if an earlier one fails, and all
    /// of them share the `timeout` budget. A stage that does not finish in
    /// time is reported as [`OTelSdkError::Timeout`] and left to finish in the
    /// background, so this call never blocks much longer than `timeout`.
    ///
    /// Calling shutdown when the instance is not running, including a second
    /// call, is a no-op returning `Ok(())`.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), ShutdownError> {
        let mut inner = self.lock();
        if inner.state != LifecycleState::Running {
            otel_debug!(
                name: "Facade.ShutdownSkipped",
                state = inner.state.to_string().as_str()
            );
            return Ok(());
        }
        let Some(providers) = inner.providers.take() else {
            inner.state = LifecycleState::Stopped;
            return Ok(());
        };
        inner.state = LifecycleState::ShuttingDown;
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        otel_info!(name: "Facade.ShutdownStarted", timeout_ms = timeout_ms);

        // A timeout too large to add to the clock means no deadline at all.
        let deadline = Instant::now().checked_add(timeout);
        let Providers {
            logger_provider,
            meter_provider,
            tracer_provider,
        } = providers;

        let results = [
            (
                Stage::Logs,
                shutdown_within(deadline, move || logger_provider.shutdown()),
            ),
            (
                Stage::Metrics,
                shutdown_within(deadline, move || meter_provider.shutdown()),
            ),
            (
                Stage::Traces,
                shutdown_within(deadline, move || tracer_provider.shutdown()),
            ),
        ];

        let failures: Vec<(Stage, OTelSdkError)> = results
            .into_iter()
            .filter_map(|(stage, result)| result.err().map(|err| (stage, err)))
            .collect();

        inner.state = LifecycleState::Stopped;
        if failures.is_empty() {
            otel_info!(name: "Facade.ShutdownCompleted");
            Ok(())
        } else {
            for (stage, err) in &failures {
                let reason = err.to_string();
                otel_error!(
                    name: "Facade.StageShutdownFailed",
                    stage = stage.as_str(),
                    reason = reason.as_str()
                );
            }
            Err(ShutdownError::new(failures))
        }
    }

    fn build_stage<P, F>(&self, stage: Stage, build: F) -> Result<P, SetupError>
    where
        F: FnMut() -> Result<P, ExporterBuildError>,
    {
        otel_debug!(name: "Facade.StageStarting", stage = stage.as_str());
        let provider =
            retry_with_exponential_backoff(self.config.retry(), stage.as_str(), is_transient, build)
                .map_err(|source| SetupError::Stage { stage, source })?;
        otel_debug!(name: "Facade.StageStarted", stage = stage.as_str());
        Ok(provider)
    }

    // Rolling back shares one export timeout across the stages that came up.
    fn rollback_deadline(&self) -> Option<Instant> {
        Instant::now().checked_add(self.config.export_timeout())
    }

    // A panic while holding the lock cannot leave providers half-registered:
    // state and providers are only written after a stage fully succeeded.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn fail_setup(inner: &mut Inner, err: SetupError) -> SetupError {
    inner.state = LifecycleState::FailedInit;
    let reason = err.to_string();
    otel_error!(name: "Facade.SetupFailed", reason = reason.as_str());
    err
}

fn rollback<F>(stage: Stage, deadline: Option<Instant>, shutdown: F)
where
    F: FnOnce() -> OTelSdkResult + Send + 'static,
{
    if let Err(err) = shutdown_within(deadline, shutdown) {
        let reason = err.to_string();
        otel_warn!(
            name: "Facade.RollbackFailed",
            stage = stage.as_str(),
            reason = reason.as_str()
        );
    }
}

// Runs `shutdown` on a helper thread and waits for it until `deadline`, or
// for as long as it takes without one. A late stage keeps running detached so
// it can still flush, but is reported as timed out.
fn shutdown_within<F>(deadline: Option<Instant>, shutdown: F) -> OTelSdkResult
where
    F: FnOnce() -> OTelSdkResult + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name("otel-facade-shutdown".to_string())
        .spawn(move || {
            let _ = tx.send(shutdown());
        })
        .map_err(|err| OTelSdkError::InternalFailure(err.to_string()))?;

    let Some(deadline) = deadline else {
        return rx.recv().unwrap_or_else(|_| {
            Err(OTelSdkError::InternalFailure(
                "shutdown thread exited without reporting a result".to_string(),
            ))
        });
    };
    let remaining = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(remaining) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(OTelSdkError::Timeout(remaining)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(OTelSdkError::InternalFailure(
            "shutdown thread exited without reporting a result".to_string(),
        )),
    }
}
