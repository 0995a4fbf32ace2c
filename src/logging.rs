/// Structured logging for the air-quality monitoring service
///
/// Provides context-rich logging with provider and station identifiers on
/// top of `tracing`. Supports console output and an optional append-mode
/// log file for daemon operation. Upstream failures are classified as
/// expected (a station simply has no data) or unexpected (a provider is
/// degraded) so the noise level of each matches its meaning.

use std::fmt;
use std::fs::OpenOptions;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

use crate::model::{AqError, OutcomeCounts};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    /// The `EnvFilter` directive spelling of this level.
    fn directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    /// Station directory and per-sensor time series.
    OpenAq,
    /// Current weather.
    OpenMeteo,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::OpenAq => write!(f, "OPENAQ"),
            DataSource::OpenMeteo => write!(f, "METEO"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - station offline, no sensor for the pollutant, or a superseded cycle
    Expected,
    /// Unexpected failure - indicates provider degradation or an API change
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` overrides `min_level` when set. Calling this twice is harmless;
/// the second call leaves the first subscriber in place. Fails only if the
/// log file cannot be opened.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&str>,
    console_timestamps: bool,
) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("aqmon_service={}", min_level.directive())));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let timed_console = console_timestamps
        .then(|| tracing_fmt::layer().with_target(false).with_writer(std::io::stderr));
    let plain_console = (!console_timestamps).then(|| {
        tracing_fmt::layer()
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(timed_console)
        .with(plain_console)
        .with(file_layer)
        .try_init();

    Ok(())
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Log a general informational message
pub fn info(source: DataSource, station_id: Option<&str>, message: &str) {
    tracing::info!(source = %source, station = station_id.unwrap_or("-"), "{}", message);
}

/// Log a warning message
pub fn warn(source: DataSource, station_id: Option<&str>, message: &str) {
    tracing::warn!(source = %source, station = station_id.unwrap_or("-"), "{}", message);
}

/// Log an error message
pub fn error(source: DataSource, station_id: Option<&str>, message: &str) {
    tracing::error!(source = %source, station = station_id.unwrap_or("-"), "{}", message);
}

/// Log a debug message
pub fn debug(source: DataSource, station_id: Option<&str>, message: &str) {
    tracing::debug!(source = %source, station = station_id.unwrap_or("-"), "{}", message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify an upstream failure by its error kind
pub fn classify_failure(err: &AqError) -> FailureType {
    match err {
        // A station without a sensor or a location that vanished is normal churn
        AqError::NotFound(_) => FailureType::Expected,
        AqError::Superseded { .. } => FailureType::Expected,
        // Rate limiting and 5xx mean the provider is struggling
        AqError::UpstreamUnavailable { status: Some(_), .. } => FailureType::Unexpected,
        // Shape violations suggest an API change
        AqError::MalformedResponse { .. } => FailureType::Unexpected,
        // Transport errors may be our network, not theirs
        AqError::UpstreamUnavailable { status: None, .. } => FailureType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a data source failure with automatic classification
pub fn log_failure(source: DataSource, station_id: Option<&str>, operation: &str, err: &AqError) {
    let failure_type = classify_failure(err);

    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(source, station_id, &message),
        FailureType::Unexpected => error(source, station_id, &message),
        FailureType::Unknown => warn(source, station_id, &message),
    }
}

// ---------------------------------------------------------------------------
// Fan-out Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one best-effort fan-out stage
pub fn log_enrichment_summary(source: DataSource, stage: &str, counts: &OutcomeCounts) {
    let message = format!(
        "{} complete: {}/{} fetched, {} skipped, {} failed",
        stage,
        counts.fetched,
        counts.total(),
        counts.skipped,
        counts.failed
    );

    if counts.failed == 0 {
        info(source, None, &message);
    } else if counts.fetched == 0 {
        error(source, None, &message);
    } else {
        warn(source, None, &message);
    }
}
