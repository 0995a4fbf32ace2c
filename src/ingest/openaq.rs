/// OpenAQ v3 API Client
///
/// Retrieves monitoring locations, their latest sensor values, and per-sensor
/// measurement history from the OpenAQ air-quality aggregator.
///
/// API Documentation: https://docs.openaq.org/
/// Locations: https://api.openaq.org/v3/locations
/// Latest values: https://api.openaq.org/v3/locations/{id}/latest
/// Measurements: https://api.openaq.org/v3/sensors/{id}/measurements

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::ingest::{DirectoryLocation, DirectoryService, DirectorySensor, LatestReading, TimeSeriesService};
use crate::logging::DataSource;
use crate::model::{AqError, NotFoundKind, PARAM_PM25, SeriesPoint};

pub const OPENAQ_BASE_URL: &str = "https://api.openaq.org/v3";

/// OpenAQ's numeric parameter id for PM2.5.
pub const PM25_PARAMETER_ID: u32 = 2;

/// Page size for the locations search.
pub const LOCATIONS_LIMIT: u32 = 50;

// ============================================================================
// OpenAQ API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct LocationsResponse {
    results: Vec<ApiLocation>,
}

#[derive(Debug, Deserialize)]
struct ApiLocation {
    id: u64,
    name: Option<String>,
    locality: Option<String>,
    coordinates: Option<ApiCoordinates>,
    #[serde(default)]
    sensors: Vec<ApiSensor>,
}

#[derive(Debug, Deserialize)]
struct ApiCoordinates {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiSensor {
    id: u64,
    parameter: ApiParameter,
}

#[derive(Debug, Deserialize)]
struct ApiParameter {
    id: u32,
    name: String,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    results: Vec<ApiLatest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiLatest {
    value: f64,
    sensors_id: u64,
}

#[derive(Debug, Deserialize)]
struct MeasurementsResponse {
    results: Vec<ApiMeasurement>,
}

/// Timestamps arrive either at the top level or under `period`,
/// depending on the aggregation endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMeasurement {
    value: Option<f64>,
    datetime_from: Option<ApiDateTime>,
    period: Option<ApiPeriod>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPeriod {
    datetime_from: ApiDateTime,
}

#[derive(Debug, Deserialize)]
struct ApiDateTime {
    utc: String,
}

// ============================================================================
// Parsing
// ============================================================================

/// Maps an OpenAQ parameter to our pollutant code.
fn normalize_pollutant(parameter: &ApiParameter) -> String {
    if parameter.id == PM25_PARAMETER_ID {
        PARAM_PM25.to_string()
    } else {
        parameter.name.to_lowercase()
    }
}

fn parameter_id_for(pollutant: &str) -> Option<u32> {
    (pollutant == PARAM_PM25).then_some(PM25_PARAMETER_ID)
}

fn malformed(err: serde_json::Error) -> AqError {
    AqError::malformed(DataSource::OpenAq, err.to_string())
}

fn convert_location(loc: ApiLocation) -> DirectoryLocation {
    let (latitude, longitude) = match loc.coordinates {
        Some(c) => (c.latitude, c.longitude),
        None => (None, None),
    };
    DirectoryLocation {
        id: loc.id.to_string(),
        name: loc.name,
        locality: loc.locality,
        latitude,
        longitude,
        sensors: loc
            .sensors
            .into_iter()
            .map(|s| DirectorySensor {
                id: s.id.to_string(),
                pollutant: normalize_pollutant(&s.parameter),
            })
            .collect(),
    }
}

/// Parse a `/locations` search response.
pub fn parse_locations(body: &str) -> Result<Vec<DirectoryLocation>, AqError> {
    let response: LocationsResponse = serde_json::from_str(body).map_err(malformed)?;
    Ok(response.results.into_iter().map(convert_location).collect())
}

/// Parse a `/locations/{id}/latest` response.
pub fn parse_latest(body: &str) -> Result<Vec<LatestReading>, AqError> {
    let response: LatestResponse = serde_json::from_str(body).map_err(malformed)?;
    Ok(response
        .results
        .into_iter()
        .map(|r| LatestReading {
            sensor_id: r.sensors_id.to_string(),
            value: r.value,
        })
        .collect())
}

/// Parse a `/locations/{id}` response into the single location it describes.
///
/// An empty `results` array means the station does not exist.
pub fn parse_location(body: &str, station_id: &str) -> Result<DirectoryLocation, AqError> {
    let response: LocationsResponse = serde_json::from_str(body).map_err(malformed)?;
    response
        .results
        .into_iter()
        .next()
        .map(convert_location)
        .ok_or_else(|| AqError::NotFound(NotFoundKind::Station(station_id.to_string())))
}

/// Parse a `/sensors/{id}/measurements` response.
///
/// Null values become NaN so the scorer can drop them; an unparseable
/// timestamp rejects the whole response.
pub fn parse_measurements(body: &str) -> Result<Vec<SeriesPoint>, AqError> {
    let response: MeasurementsResponse = serde_json::from_str(body).map_err(malformed)?;

    response
        .results
        .into_iter()
        .map(|m| {
            let stamp = m
                .datetime_from
                .or(m.period.map(|p| p.datetime_from))
                .ok_or_else(|| AqError::malformed(DataSource::OpenAq, "measurement without datetimeFrom"))?;
            let time = DateTime::parse_from_rfc3339(&stamp.utc)
                .map_err(|e| AqError::malformed(DataSource::OpenAq, format!("bad timestamp '{}': {}", stamp.utc, e)))?
                .with_timezone(&Utc);
            Ok(SeriesPoint {
                time,
                value: m.value.unwrap_or(f64::NAN),
            })
        })
        .collect()
}

// ============================================================================
// Query Construction
// ============================================================================

/// Query pairs for the locations search.
pub fn locations_query(city: &str, pollutant: &str, country: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = vec![("locality", city.to_string())];
    if let Some(id) = parameter_id_for(pollutant) {
        query.push(("parameters_id", id.to_string()));
    }
    query.push(("limit", LOCATIONS_LIMIT.to_string()));
    if let Some(iso) = country {
        query.push(("iso", iso.to_string()));
    }
    query
}

/// Query pairs for a measurement window.
pub fn measurements_query(from: DateTime<Utc>, to: DateTime<Utc>, max_count: usize) -> Vec<(&'static str, String)> {
    vec![
        ("datetime_from", from.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("datetime_to", to.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("limit", max_count.to_string()),
    ]
}

// ============================================================================
// API Client
// ============================================================================

/// HTTP client for the OpenAQ directory and time-series endpoints.
pub struct OpenAqClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAqClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(OpenAqClient {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("Accept", "application/json");
        match &self.api_key {
            Some(key) => request.header("X-API-Key", key),
            None => request,
        }
    }

    /// Sends the request and returns the status with the body text.
    async fn fetch(&self, request: reqwest::RequestBuilder, operation: &str) -> Result<(StatusCode, String), AqError> {
        let response = request.send().await.map_err(|e| {
            AqError::unavailable(
                DataSource::OpenAq,
                e.status().map(|s| s.as_u16()),
                format!("{}: {}", operation, e),
            )
        })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AqError::unavailable(DataSource::OpenAq, None, format!("{}: {}", operation, e)))?;
        Ok((status, body))
    }
}

/// Non-2xx becomes `UpstreamUnavailable` carrying the status.
fn require_success(status: StatusCode, body: String, operation: &str) -> Result<String, AqError> {
    if status.is_success() {
        Ok(body)
    } else {
        Err(AqError::unavailable(
            DataSource::OpenAq,
            Some(status.as_u16()),
            format!("{} failed", operation),
        ))
    }
}

#[async_trait]
impl DirectoryService for OpenAqClient {
    async fn lookup_stations_by_city(
        &self,
        city: &str,
        pollutant: &str,
        country: Option<&str>,
    ) -> Result<Vec<DirectoryLocation>, AqError> {
        let request = self.get("/locations").query(&locations_query(city, pollutant, country));
        let (status, body) = self.fetch(request, "locations lookup").await?;
        parse_locations(&require_success(status, body, "locations lookup")?)
    }

    async fn lookup_latest_by_location(&self, location_id: &str) -> Result<Vec<LatestReading>, AqError> {
        let request = self.get(&format!("/locations/{}/latest", location_id));
        let (status, body) = self.fetch(request, "latest lookup").await?;
        if status == StatusCode::NOT_FOUND {
            return Err(AqError::NotFound(NotFoundKind::Location(location_id.to_string())));
        }
        parse_latest(&require_success(status, body, "latest lookup")?)
    }
}

#[async_trait]
impl TimeSeriesService for OpenAqClient {
    async fn lookup_sensor_for_station(&self, station_id: &str, pollutant: &str) -> Result<String, AqError> {
        let request = self.get(&format!("/locations/{}", station_id));
        let (status, body) = self.fetch(request, "location lookup").await?;
        if status == StatusCode::NOT_FOUND {
            return Err(AqError::NotFound(NotFoundKind::Station(station_id.to_string())));
        }
        let location = parse_location(&require_success(status, body, "location lookup")?, station_id)?;
        location
            .sensor_for(pollutant)
            .map(|s| s.id.clone())
            .ok_or_else(|| {
                AqError::NotFound(NotFoundKind::Sensor {
                    station_id: station_id.to_string(),
                    pollutant: pollutant.to_string(),
                })
            })
    }

    async fn lookup_measurements(
        &self,
        sensor_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        max_count: usize,
    ) -> Result<Vec<SeriesPoint>, AqError> {
        let request = self
            .get(&format!("/sensors/{}/measurements", sensor_id))
            .query(&measurements_query(from, to, max_count));
        let (status, body) = self.fetch(request, "measurements lookup").await?;
        parse_measurements(&require_success(status, body, "measurements lookup")?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    const LOCATIONS_BODY: &str = r#"{
        "meta": {"found": 3},
        "results": [
            {
                "id": 2178,
                "name": "San Francisco - Arkansas St",
                "locality": "San Francisco",
                "coordinates": {"latitude": 37.7658, "longitude": -122.3978},
                "sensors": [
                    {"id": 3917, "parameter": {"id": 2, "name": "pm25", "units": "µg/m³", "displayName": "PM2.5"}},
                    {"id": 3918, "parameter": {"id": 10, "name": "O3", "units": "ppm", "displayName": null}}
                ],
                "timezone": "America/Los_Angeles"
            },
            {
                "id": 9001,
                "name": null,
                "locality": null,
                "coordinates": {"latitude": null, "longitude": null},
                "sensors": []
            },
            {
                "id": 9002,
                "name": "No coordinates block",
                "locality": "Oakland",
                "sensors": []
            }
        ]
    }"#;

    #[test]
    fn test_parse_locations_normalizes_sensors() {
        let locations = parse_locations(LOCATIONS_BODY).expect("valid body parses");
        assert_eq!(locations.len(), 3);

        let first = &locations[0];
        assert_eq!(first.id, "2178");
        assert_eq!(first.coordinates(), Some((37.7658, -122.3978)));
        assert_eq!(first.sensor_for(PARAM_PM25).map(|s| s.id.as_str()), Some("3917"));
        assert_eq!(first.sensor_for("o3").map(|s| s.id.as_str()), Some("3918"));

        assert_eq!(locations[1].coordinates(), None);
        assert_eq!(locations[1].display_name(), "Location 9001");
        assert_eq!(locations[2].coordinates(), None);
    }

    #[test]
    fn test_parse_locations_rejects_wrong_shape() {
        let result = parse_locations(r#"{"data": []}"#);
        assert_matches!(result, Err(AqError::MalformedResponse { provider: DataSource::OpenAq, .. }));
    }

    #[test]
    fn test_parse_latest() {
        let body = r#"{"results": [
            {"datetime": {"utc": "2024-05-01T12:00:00Z"}, "value": 8.4, "coordinates": {"latitude": 37.7, "longitude": -122.4}, "sensorsId": 3917, "locationsId": 2178},
            {"datetime": {"utc": "2024-05-01T12:00:00Z"}, "value": 0.031, "coordinates": {"latitude": 37.7, "longitude": -122.4}, "sensorsId": 3918, "locationsId": 2178}
        ]}"#;
        let latest = parse_latest(body).expect("valid body parses");
        assert_eq!(
            latest,
            vec![
                LatestReading { sensor_id: "3917".into(), value: 8.4 },
                LatestReading { sensor_id: "3918".into(), value: 0.031 },
            ]
        );
    }

    #[test]
    fn test_parse_location_empty_results_is_station_not_found() {
        let result = parse_location(r#"{"results": []}"#, "404404");
        assert_eq!(result, Err(AqError::NotFound(NotFoundKind::Station("404404".into()))));
    }

    #[test]
    fn test_parse_measurements_accepts_both_timestamp_layouts() {
        let body = r#"{"results": [
            {"value": 9.5, "period": {"label": "raw", "datetimeFrom": {"utc": "2024-05-01T11:00:00Z", "local": "2024-05-01T04:00:00-07:00"}}},
            {"value": 7.0, "datetimeFrom": {"utc": "2024-05-01T10:00:00Z"}},
            {"value": null, "datetimeFrom": {"utc": "2024-05-01T12:00:00+00:00"}}
        ]}"#;
        let points = parse_measurements(body).expect("valid body parses");
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].time, Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap());
        assert_eq!(points[1].value, 7.0);
        assert!(points[2].value.is_nan());
    }

    #[test]
    fn test_parse_measurements_rejects_bad_timestamp() {
        let body = r#"{"results": [{"value": 1.0, "datetimeFrom": {"utc": "yesterday"}}]}"#;
        assert_matches!(parse_measurements(body), Err(AqError::MalformedResponse { .. }));
    }

    #[test]
    fn test_locations_query_adds_country_only_when_known() {
        let plain = locations_query("Delhi", PARAM_PM25, None);
        assert_eq!(
            plain,
            vec![
                ("locality", "Delhi".to_string()),
                ("parameters_id", "2".to_string()),
                ("limit", "50".to_string()),
            ]
        );
        let filtered = locations_query("Chicago", PARAM_PM25, Some("US"));
        assert!(filtered.contains(&("iso", "US".to_string())));
    }

    #[test]
    fn test_measurements_query_window() {
        let to = Utc.with_ymd_and_hms(2024, 5, 8, 0, 0, 0).unwrap();
        let from = to - chrono::Duration::days(7);
        let query = measurements_query(from, to, 1000);
        assert_eq!(query[0], ("datetime_from", "2024-05-01T00:00:00Z".to_string()));
        assert_eq!(query[1], ("datetime_to", "2024-05-08T00:00:00Z".to_string()));
        assert_eq!(query[2], ("limit", "1000".to_string()));
    }

    // Live API check; needs network and (for most deployments) OPENAQ_API_KEY.
    #[tokio::test]
    #[ignore]
    async fn live_openaq_locations_lookup_returns_results() {
        dotenv::dotenv().ok();
        let client = OpenAqClient::new(
            OPENAQ_BASE_URL,
            std::env::var("OPENAQ_API_KEY").ok(),
            "aqmon_service/0.1 (integration test)",
            Duration::from_secs(30),
        )
        .expect("client builds");
        let locations = client
            .lookup_stations_by_city("San Francisco", PARAM_PM25, Some("US"))
            .await
            .expect("OpenAQ locations lookup failed - check network and API key");
        println!("✓ OpenAQ returned {} locations", locations.len());
        assert!(!locations.is_empty());
    }
}
