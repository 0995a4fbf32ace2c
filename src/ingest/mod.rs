/// Upstream data providers.
///
/// Each provider sits behind a trait so the resolver, history fetcher and
/// refresh orchestrator can run against in-memory fakes in tests. The types
/// here are the provider-neutral shapes the core consumes; the submodules
/// translate concrete wire formats into them.
///
/// Submodules:
/// - `openaq` — station directory, latest readings, and per-sensor history.
/// - `openmeteo` — current weather at a coordinate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{AqError, SeriesPoint, WeatherSnapshot};

pub mod openaq;
pub mod openmeteo;

// ============================================================================
// Directory types
// ============================================================================

/// A sensor attached to a directory location.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectorySensor {
    pub id: String,
    /// Normalized pollutant code, e.g. `pm25`.
    pub pollutant: String,
}

/// A monitoring location as listed by the directory. Coordinates may be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryLocation {
    pub id: String,
    pub name: Option<String>,
    pub locality: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub sensors: Vec<DirectorySensor>,
}

impl DirectoryLocation {
    pub fn sensor_for(&self, pollutant: &str) -> Option<&DirectorySensor> {
        self.sensors.iter().find(|s| s.pollutant == pollutant)
    }

    /// `(latitude, longitude)` when both are present and finite.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }

    /// Name, else locality, else a generated label.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.locality.clone())
            .unwrap_or_else(|| format!("Location {}", self.id))
    }
}

/// One sensor's most recent value at a location.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestReading {
    pub sensor_id: String,
    pub value: f64,
}

// ============================================================================
// Provider traits
// ============================================================================

/// Station/sensor directory.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Locations whose locality matches `city` and that report `pollutant`.
    /// `country` narrows the search to one ISO country code when given.
    async fn lookup_stations_by_city(
        &self,
        city: &str,
        pollutant: &str,
        country: Option<&str>,
    ) -> Result<Vec<DirectoryLocation>, AqError>;

    async fn lookup_latest_by_location(&self, location_id: &str) -> Result<Vec<LatestReading>, AqError>;
}

/// Per-sensor time series.
#[async_trait]
pub trait TimeSeriesService: Send + Sync {
    /// Sensor id for `pollutant` at `station_id`. Fails with
    /// `NotFound(Station)` or `NotFound(Sensor)` as appropriate.
    async fn lookup_sensor_for_station(&self, station_id: &str, pollutant: &str) -> Result<String, AqError>;

    /// Measurements in `[from, to]`, at most `max_count`, in no guaranteed order.
    async fn lookup_measurements(
        &self,
        sensor_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        max_count: usize,
    ) -> Result<Vec<SeriesPoint>, AqError>;
}

/// Current conditions at a coordinate.
#[async_trait]
pub trait WeatherService: Send + Sync {
    async fn lookup_current_weather(&self, latitude: f64, longitude: f64) -> Result<WeatherSnapshot, AqError>;
}
