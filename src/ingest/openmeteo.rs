/// Open-Meteo current weather client
///
/// API Documentation: https://open-meteo.com/en/docs
/// Current conditions: /v1/forecast?latitude=..&longitude=..&current_weather=true
///
/// `windspeed` is reported in km/h by default, which is what we expose.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::ingest::WeatherService;
use crate::logging::DataSource;
use crate::model::{AqError, WeatherSnapshot};

pub const OPEN_METEO_BASE_URL: &str = "https://api.open-meteo.com";

// ============================================================================
// Open-Meteo API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature: f64,
    windspeed: f64,
}

/// Parse a forecast response carrying `current_weather`.
pub fn parse_current_weather(body: &str) -> Result<WeatherSnapshot, AqError> {
    let response: ForecastResponse =
        serde_json::from_str(body).map_err(|e| AqError::malformed(DataSource::OpenMeteo, e.to_string()))?;
    Ok(WeatherSnapshot {
        temperature_c: response.current_weather.temperature,
        wind_speed_kph: response.current_weather.windspeed,
    })
}

// ============================================================================
// API Client
// ============================================================================

pub struct OpenMeteoClient {
    http: reqwest::Client,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new(base_url: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(OpenMeteoClient {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl WeatherService for OpenMeteoClient {
    async fn lookup_current_weather(&self, latitude: f64, longitude: f64) -> Result<WeatherSnapshot, AqError> {
        let url = format!("{}/v1/forecast", self.base_url);

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("current_weather", "true".to_string()),
            ])
            .send()
            .await
            .map_err(|e| AqError::unavailable(DataSource::OpenMeteo, e.status().map(|s| s.as_u16()), e.to_string()))?;

        if !response.status().is_success() {
            return Err(AqError::unavailable(
                DataSource::OpenMeteo,
                Some(response.status().as_u16()),
                "forecast lookup failed",
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AqError::unavailable(DataSource::OpenMeteo, None, e.to_string()))?;
        parse_current_weather(&body)
    }
}

// ============================================================================
// Tests
// ============================================================================
