/// Core data types for the air-quality monitoring service.
///
/// This module defines the shared domain model imported by all other
/// modules: stations and their health-index readings, time-series points,
/// the map center, weather snapshots, the per-cycle refresh result, and the
/// error taxonomy used across every upstream call.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::thresholds::pollutant_to_index;
use crate::logging::DataSource;

// ---------------------------------------------------------------------------
// Pollutant codes
// ---------------------------------------------------------------------------

/// Fine particulate matter (PM2.5), in µg/m³. The primary pollutant used
/// for indexing and anomaly scoring.
pub const PARAM_PM25: &str = "pm25";

// ---------------------------------------------------------------------------
// Index types
// ---------------------------------------------------------------------------

/// Health-impact severity bands, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AqiBand {
    Good,
    Moderate,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiBand {
    /// Every band, least severe first.
    pub const ALL: [AqiBand; 5] = [
        AqiBand::Good,
        AqiBand::Moderate,
        AqiBand::Unhealthy,
        AqiBand::VeryUnhealthy,
        AqiBand::Hazardous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AqiBand::Good => "good",
            AqiBand::Moderate => "moderate",
            AqiBand::Unhealthy => "unhealthy",
            AqiBand::VeryUnhealthy => "very-unhealthy",
            AqiBand::Hazardous => "hazardous",
        }
    }
}

impl fmt::Display for AqiBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A standardized index value together with the band it falls in.
///
/// Only `alert::thresholds::pollutant_to_index` builds these, so value and
/// band always come from the same concentration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AqiReading {
    pub value: u32,
    pub band: AqiBand,
}

// ---------------------------------------------------------------------------
// Station and series types
// ---------------------------------------------------------------------------

/// A monitoring station with its current primary-pollutant reading.
///
/// Created by `resolve::resolve_stations`. Only `anomaly` changes after
/// creation, and only by the refresh orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Provider-assigned identifier, opaque to this service.
    pub id: String,
    pub name: String,
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
    pub aqi: AqiReading,
    /// Pollutant code → concentration. Always contains the indexed pollutant.
    pub pollutants: BTreeMap<String, f64>,
    /// Robust outlier score 0–100; `None` until scored.
    pub anomaly: Option<u8>,
}

impl Station {
    /// Builds a station from one pollutant concentration, deriving the
    /// index and band from it.
    pub fn from_reading(
        id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        pollutant: &str,
        concentration: f64,
    ) -> Self {
        let mut pollutants = BTreeMap::new();
        pollutants.insert(pollutant.to_string(), concentration);
        Station {
            id: id.into(),
            name: name.into(),
            latitude,
            longitude,
            aqi: pollutant_to_index(concentration),
            pollutants,
            anomaly: None,
        }
    }
}

/// One measurement in a station's recent history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub time: DateTime<Utc>,
    /// May be NaN or infinite if the provider sent garbage; filter before use.
    pub value: f64,
}

// ---------------------------------------------------------------------------
// Map and weather types
// ---------------------------------------------------------------------------

/// Map focal point as (longitude, latitude).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Center {
    pub longitude: f64,
    pub latitude: f64,
}

impl Center {
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Center { longitude, latitude }
    }

    /// True when both components are finite and inside WGS84 range.
    pub fn is_valid(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }
}

/// Current conditions at the map center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature_c: f64,
    pub wind_speed_kph: f64,
}

// ---------------------------------------------------------------------------
// Per-item enrichment outcomes
// ---------------------------------------------------------------------------

/// Why a station-level enrichment produced nothing without an upstream error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Directory entry had no latitude or longitude.
    MissingCoordinates,
    /// Directory entry had no sensor for the target pollutant.
    MissingSensor,
    /// Latest readings did not include the target sensor.
    NoLatestReading,
    /// The history window contained no measurements.
    EmptyHistory,
}

/// Outcome of one best-effort sub-fetch. Keeps "no data", "no sensor" and
/// "fetch failed" apart instead of collapsing them into a missing value.
#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment<T> {
    Fetched(T),
    Skipped(SkipReason),
    Failed(AqError),
}

impl<T> Enrichment<T> {
    pub fn fetched(self) -> Option<T> {
        match self {
            Enrichment::Fetched(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self, Enrichment::Fetched(_))
    }
}

/// Tally of enrichment outcomes for one fan-out stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    pub fn tally<'a, T: 'a>(outcomes: impl IntoIterator<Item = &'a Enrichment<T>>) -> Self {
        let mut counts = OutcomeCounts::default();
        for outcome in outcomes {
            match outcome {
                Enrichment::Fetched(_) => counts.fetched += 1,
                Enrichment::Skipped(_) => counts.skipped += 1,
                Enrichment::Failed(_) => counts.failed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.fetched + self.skipped + self.failed
    }
}

/// How much of a refresh cycle degraded. All-zero `failed` counts and a
/// present weather snapshot mean nothing was dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentReport {
    /// Per-location latest-reading lookups during resolution.
    pub locations: OutcomeCounts,
    /// Per-station history fetches for the top-K subset.
    pub history: OutcomeCounts,
    pub weather_available: bool,
}

impl EnrichmentReport {
    /// True when some sub-fetch was dropped rather than propagated.
    pub fn is_partial(&self) -> bool {
        self.locations.failed > 0 || self.history.failed > 0 || !self.weather_available
    }
}

// ---------------------------------------------------------------------------
// Refresh result
// ---------------------------------------------------------------------------

/// One complete refresh cycle. Replaces the previous result wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshResult {
    pub city: String,
    pub stations: Vec<Station>,
    pub center: Center,
    pub weather: Option<WeatherSnapshot>,
    pub updated_at: DateTime<Utc>,
    pub report: EnrichmentReport,
}

impl RefreshResult {
    pub fn find_station(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// What a `NotFound` failure was looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundKind {
    /// The provider has no station with this id.
    Station(String),
    /// The station exists but has no sensor for the pollutant.
    Sensor { station_id: String, pollutant: String },
    /// No directory location matched.
    Location(String),
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundKind::Station(id) => write!(f, "station {}", id),
            NotFoundKind::Sensor { station_id, pollutant } => {
                write!(f, "{} sensor for station {}", pollutant, station_id)
            }
            NotFoundKind::Location(id) => write!(f, "location {}", id),
        }
    }
}

/// Errors that can arise when fetching or processing upstream data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AqError {
    /// Transport failure or non-2xx status. Retried by the caller, never here.
    #[error("{provider} unavailable{}: {detail}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    UpstreamUnavailable {
        provider: DataSource,
        status: Option<u16>,
        detail: String,
    },

    /// A valid negative result.
    #[error("Not found: {0}")]
    NotFound(NotFoundKind),

    /// The body did not have the documented shape.
    #[error("{provider} returned a malformed response: {detail}")]
    MalformedResponse { provider: DataSource, detail: String },

    /// A newer refresh cycle started before this one could publish.
    #[error("refresh cycle for '{city}' was superseded by a newer cycle")]
    Superseded { city: String },
}

impl AqError {
    pub fn unavailable(provider: DataSource, status: Option<u16>, detail: impl Into<String>) -> Self {
        AqError::UpstreamUnavailable {
            provider,
            status,
            detail: detail.into(),
        }
    }

    pub fn malformed(provider: DataSource, detail: impl Into<String>) -> Self {
        AqError::MalformedResponse {
            provider,
            detail: detail.into(),
        }
    }
}
