/// Station directory resolution.
///
/// Turns a city name into a list of stations carrying one primary-pollutant
/// reading each. The directory search must succeed; everything after it is
/// best effort. A location without coordinates, without the target sensor,
/// or whose latest-reading lookup fails is dropped and recorded as a
/// per-location [`Enrichment`] outcome instead of failing the resolution.

use crate::fanout::collect_concurrently;
use crate::ingest::{DirectoryLocation, DirectoryService};
use crate::logging::{self, DataSource};
use crate::model::{AqError, Enrichment, OutcomeCounts, SkipReason, Station};

/// Knobs for one resolution.
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions<'a> {
    /// Pollutant code to index on.
    pub pollutant: &'a str,
    /// ISO country filter for the directory search.
    pub country: Option<&'a str>,
    /// Cap on concurrent latest-reading lookups.
    pub max_concurrency: Option<usize>,
}

/// What happened to one directory location.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationOutcome {
    pub location_id: String,
    pub outcome: Enrichment<Station>,
}

/// Per-location outcomes in directory order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Resolution {
    pub outcomes: Vec<LocationOutcome>,
}

impl Resolution {
    pub fn counts(&self) -> OutcomeCounts {
        OutcomeCounts::tally(self.outcomes.iter().map(|o| &o.outcome))
    }

    pub fn into_stations(self) -> Vec<Station> {
        self.outcomes
            .into_iter()
            .filter_map(|o| o.outcome.fetched())
            .collect()
    }
}

/// Resolves one location into a station, or says why it could not.
async fn resolve_location<D>(directory: &D, location: &DirectoryLocation, pollutant: &str) -> Enrichment<Station>
where
    D: DirectoryService + ?Sized,
{
    let Some((latitude, longitude)) = location.coordinates() else {
        logging::debug(DataSource::OpenAq, Some(&location.id), "skipped: no coordinates");
        return Enrichment::Skipped(SkipReason::MissingCoordinates);
    };
    let Some(sensor) = location.sensor_for(pollutant) else {
        logging::debug(DataSource::OpenAq, Some(&location.id), &format!("skipped: no {} sensor", pollutant));
        return Enrichment::Skipped(SkipReason::MissingSensor);
    };

    let readings = match directory.lookup_latest_by_location(&location.id).await {
        Ok(readings) => readings,
        Err(e) => {
            logging::log_failure(DataSource::OpenAq, Some(&location.id), "latest lookup", &e);
            return Enrichment::Failed(e);
        }
    };

    match readings.iter().find(|r| r.sensor_id == sensor.id) {
        Some(reading) => Enrichment::Fetched(Station::from_reading(
            location.id.clone(),
            location.display_name(),
            latitude,
            longitude,
            pollutant,
            reading.value,
        )),
        None => {
            logging::debug(
                DataSource::OpenAq,
                Some(&location.id),
                &format!("skipped: latest readings lack sensor {}", sensor.id),
            );
            Enrichment::Skipped(SkipReason::NoLatestReading)
        }
    }
}

/// Resolves `city` and keeps every per-location outcome.
///
/// Fails only when the directory search itself fails.
pub async fn resolve_with_outcomes<D>(directory: &D, city: &str, options: ResolveOptions<'_>) -> Result<Resolution, AqError>
where
    D: DirectoryService + ?Sized,
{
    let locations = directory
        .lookup_stations_by_city(city, options.pollutant, options.country)
        .await
        .inspect_err(|e| logging::log_failure(DataSource::OpenAq, None, &format!("directory search for '{}'", city), e))?;

    logging::debug(
        DataSource::OpenAq,
        None,
        &format!("directory returned {} locations for '{}'", locations.len(), city),
    );

    let lookups = locations.iter().map(|loc| async move {
        LocationOutcome {
            location_id: loc.id.clone(),
            outcome: resolve_location(directory, loc, options.pollutant).await,
        }
    });
    let outcomes = collect_concurrently(lookups, options.max_concurrency).await;

    let resolution = Resolution { outcomes };
    logging::log_enrichment_summary(DataSource::OpenAq, "latest readings", &resolution.counts());
    Ok(resolution)
}

/// Resolves `city` into the stations that survived enrichment.
pub async fn resolve_stations<D>(directory: &D, city: &str, options: ResolveOptions<'_>) -> Result<Vec<Station>, AqError>
where
    D: DirectoryService + ?Sized,
{
    Ok(resolve_with_outcomes(directory, city, options).await?.into_stations())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{DirectorySensor, LatestReading};
    use crate::model::{AqiBand, NotFoundKind, PARAM_PM25};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeDirectory {
        locations: Result<Vec<DirectoryLocation>, AqError>,
        latest: HashMap<String, Result<Vec<LatestReading>, AqError>>,
        searches: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl DirectoryService for FakeDirectory {
        async fn lookup_stations_by_city(
            &self,
            city: &str,
            _pollutant: &str,
            country: Option<&str>,
        ) -> Result<Vec<DirectoryLocation>, AqError> {
            self.searches.lock().unwrap().push((city.to_string(), country.map(String::from)));
            self.locations.clone()
        }

        async fn lookup_latest_by_location(&self, location_id: &str) -> Result<Vec<LatestReading>, AqError> {
            self.latest
                .get(location_id)
                .cloned()
                .unwrap_or_else(|| Err(AqError::NotFound(NotFoundKind::Location(location_id.to_string()))))
        }
    }

    fn location(id: &str, coords: Option<(f64, f64)>, pm25_sensor: Option<&str>) -> DirectoryLocation {
        DirectoryLocation {
            id: id.to_string(),
            name: Some(format!("Station {}", id)),
            locality: None,
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
            sensors: pm25_sensor
                .map(|s| {
                    vec![DirectorySensor {
                        id: s.to_string(),
                        pollutant: PARAM_PM25.to_string(),
                    }]
                })
                .unwrap_or_default(),
        }
    }

    fn reading(sensor_id: &str, value: f64) -> LatestReading {
        LatestReading {
            sensor_id: sensor_id.to_string(),
            value,
        }
    }

    fn options() -> ResolveOptions<'static> {
        ResolveOptions {
            pollutant: PARAM_PM25,
            country: Some("US"),
            max_concurrency: None,
        }
    }

    fn directory() -> FakeDirectory {
        let locations = vec![
            location("1", Some((37.76, -122.42)), Some("s1")),
            location("2", None, Some("s2")),
            location("3", Some((37.78, -122.40)), None),
            location("4", Some((37.79, -122.41)), Some("s4")),
            location("5", Some((37.80, -122.43)), Some("s5")),
            location("6", Some((37.75, -122.44)), Some("s6")),
        ];
        let mut latest = HashMap::new();
        latest.insert("1".to_string(), Ok(vec![reading("other", 1.0), reading("s1", 40.0)]));
        latest.insert(
            "4".to_string(),
            Err(AqError::unavailable(DataSource::OpenAq, Some(502), "latest lookup failed")),
        );
        latest.insert("5".to_string(), Ok(vec![reading("not-s5", 3.0)]));
        latest.insert("6".to_string(), Ok(vec![reading("s6", 5.0)]));
        FakeDirectory {
            locations: Ok(locations),
            latest,
            searches: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_resolution_keeps_only_complete_locations() {
        let stations = resolve_stations(&directory(), "San Francisco", options())
            .await
            .expect("directory succeeded");
        let ids: Vec<_> = stations.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "6"]);

        let first = &stations[0];
        assert_eq!(first.name, "Station 1");
        assert_eq!(first.latitude, 37.76);
        assert_eq!(first.longitude, -122.42);
        assert_eq!(first.pollutants.get(PARAM_PM25), Some(&40.0));
        assert_eq!(first.aqi.band, AqiBand::Unhealthy);
        assert_eq!(first.anomaly, None);
    }

    #[tokio::test]
    async fn test_outcomes_distinguish_skip_reasons_from_failures() {
        let resolution = resolve_with_outcomes(&directory(), "San Francisco", options())
            .await
            .expect("directory succeeded");
        let by_id: HashMap<_, _> = resolution
            .outcomes
            .iter()
            .map(|o| (o.location_id.as_str(), &o.outcome))
            .collect();

        assert!(by_id["1"].is_fetched());
        assert_eq!(by_id["2"], &Enrichment::Skipped(SkipReason::MissingCoordinates));
        assert_eq!(by_id["3"], &Enrichment::Skipped(SkipReason::MissingSensor));
        assert!(matches!(by_id["4"], Enrichment::Failed(AqError::UpstreamUnavailable { status: Some(502), .. })));
        assert_eq!(by_id["5"], &Enrichment::Skipped(SkipReason::NoLatestReading));

        assert_eq!(resolution.counts(), OutcomeCounts { fetched: 2, skipped: 3, failed: 1 });
    }

    #[tokio::test]
    async fn test_directory_failure_fails_whole_resolution() {
        let mut dir = directory();
        dir.locations = Err(AqError::unavailable(DataSource::OpenAq, Some(500), "locations lookup failed"));
        let result = resolve_stations(&dir, "San Francisco", options()).await;
        assert!(matches!(result, Err(AqError::UpstreamUnavailable { status: Some(500), .. })));
    }

    #[tokio::test]
    async fn test_country_filter_is_passed_through() {
        let dir = directory();
        resolve_stations(&dir, "Chicago", options()).await.expect("directory succeeded");
        let searches = dir.searches.lock().unwrap();
        assert_eq!(searches.as_slice(), &[("Chicago".to_string(), Some("US".to_string()))]);
    }

    #[tokio::test]
    async fn test_concurrency_cap_does_not_change_results() {
        let capped = ResolveOptions {
            max_concurrency: Some(1),
            ..options()
        };
        let a = resolve_stations(&directory(), "San Francisco", options()).await.unwrap();
        let b = resolve_stations(&directory(), "San Francisco", capped).await.unwrap();
        assert_eq!(a, b);
    }
}
