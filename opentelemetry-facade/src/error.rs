//! Error types returned by the facade.
use crate::provider::LifecycleState;
use opentelemetry_otlp::ExporterBuildError;
use opentelemetry_sdk::error::OTelSdkError;
use std::fmt;
use thiserror::Error;

/// One of the three independently managed telemetry signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// The log provider.
    Logs,
    /// The meter provider.
    Metrics,
    /// The tracer provider.
    Traces,
}

impl Stage {
    /// Stages in setup and shutdown order.
    pub const ALL: [Stage; 3] = [Stage::Logs, Stage::Metrics, Stage::Traces];

    /// Short lower-case name of the stage.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Stage::Logs => "logs",
            Stage::Metrics => "metrics",
            Stage::Traces => "traces",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while building a [`Config`](crate::Config).
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required field was not set or is empty.
    #[error("missing required configuration field '{0}'")]
    MissingField(&'static str),

    /// The sample rate is not a finite number within `[0, 1]`.
    #[error("sample rate must be within [0, 1], got {0}")]
    InvalidSampleRate(f64),

    /// A value could not be parsed.
    #[error("invalid value for '{name}': {reason}")]
    InvalidValue {
        /// The configuration field or environment variable.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A value cannot be carried as an outbound export header.
    #[error("invalid value for header '{name}': {reason}")]
    InvalidHeader {
        /// The header name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Errors returned by [`Telemetry::setup`](crate::Telemetry::setup).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SetupError {
    /// A provider could not be built. Earlier stages were shut down before
    /// this error was returned.
    #[error("{stage} provider setup failed: {source}")]
    Stage {
        /// The stage that failed.
        stage: Stage,
        /// The exporter build failure.
        #[source]
        source: ExporterBuildError,
    },

    /// Setup was called outside of the `Unconfigured` state.
    #[error("setup is not allowed in the {0} state")]
    InvalidState(LifecycleState),
}

impl SetupError {
    /// The stage that failed, if the failure came from a provider.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SetupError::Stage { stage, .. } => Some(*stage),
            SetupError::InvalidState(_) => None,
        }
    }
}

/// Aggregated failures from [`Telemetry::shutdown`](crate::Telemetry::shutdown).
///
/// Every stage is attempted, so this carries one entry per failed stage.
#[derive(Error, Debug)]
pub struct ShutdownError {
    failures: Vec<(Stage, OTelSdkError)>,
}

impl ShutdownError {
    pub(crate) fn new(failures: Vec<(Stage, OTelSdkError)>) -> Self {
        ShutdownError { failures }
    }

    /// The failed stages, in shutdown order.
    pub fn failures(&self) -> &[(Stage, OTelSdkError)] {
        &self.failures
    }

    /// Returns true if `stage` failed to shut down.
    pub fn failed(&self, stage: Stage) -> bool {
        self.failures.iter().any(|(s, _)| *s == stage)
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("shutdown failed:")?;
        for (i, (stage, err)) in self.failures.iter().enumerate() {
            let sep = if i == 0 { " " } else { "; " };
            write!(f, "{sep}{stage}: {err}")?;
        }
        Ok(())
    }
}

/// Errors raised while constructing a [`MetricsRecorder`](crate::MetricsRecorder).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecorderError {
    /// The derived instrument name is not a valid OpenTelemetry instrument name.
    #[error("invalid instrument name '{name}': {reason}")]
    InvalidInstrumentName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Errors raised by a [`LocalSink`](crate::logs::LocalSink).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SinkError {
    /// Writing to the underlying writer failed.
    #[error("local sink write failed: {0}")]
    Io(#[from] std::io::Error),

    /// The record could not be serialized.
    #[error("local sink serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The writer lock was poisoned by a panicking writer.
    #[error("local sink writer lock poisoned")]
    Poisoned,
}
