/// Recent history for one station's pollutant sensor.
///
/// Two lookups: station → sensor id for the pollutant, then sensor →
/// measurements inside a fixed lookback window. "Station not found" and
/// "sensor not found" are errors; an empty window is a valid empty series.
///
/// # Clock injection
/// `fetch_history_at` takes `now` explicitly so window arithmetic is
/// deterministic in tests. `fetch_history` is the wall-clock wrapper.

use chrono::{DateTime, Duration, Utc};

use crate::ingest::TimeSeriesService;
use crate::logging::{self, DataSource};
use crate::model::{AqError, SeriesPoint};

/// Lookback window for anomaly scoring.
pub const HISTORY_WINDOW_DAYS: i64 = 7;

/// Longest lookback accepted; longer windows are clamped to this.
pub const MAX_HISTORY_DAYS: i64 = 365;

/// Upper bound on points requested per sensor.
pub const HISTORY_MAX_POINTS: usize = 1000;

/// Window and size bounds for one history fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    pub days: i64,
    pub max_points: usize,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        HistoryWindow {
            days: HISTORY_WINDOW_DAYS,
            max_points: HISTORY_MAX_POINTS,
        }
    }
}

/// Fetches `[now - window, now]` for the station's `pollutant` sensor,
/// sorted ascending by time.
pub async fn fetch_history_at<T>(
    timeseries: &T,
    station_id: &str,
    pollutant: &str,
    window: HistoryWindow,
    now: DateTime<Utc>,
) -> Result<Vec<SeriesPoint>, AqError>
where
    T: TimeSeriesService + ?Sized,
{
    let sensor_id = timeseries.lookup_sensor_for_station(station_id, pollutant).await?;

    let from = now - Duration::days(window.days.clamp(1, MAX_HISTORY_DAYS));
    let mut points = timeseries
        .lookup_measurements(&sensor_id, from, now, window.max_points)
        .await?;

    // Upstream order is not guaranteed; stable sort keeps equal timestamps in arrival order
    points.sort_by_key(|p| p.time);
    // Providers may return more than asked for; keep the most recent
    if points.len() > window.max_points {
        points.drain(..points.len() - window.max_points);
    }

    logging::debug(
        DataSource::OpenAq,
        Some(station_id),
        &format!("history: {} points from sensor {}", points.len(), sensor_id),
    );
    Ok(points)
}

/// Fetches the default window ending now.
pub async fn fetch_history<T>(timeseries: &T, station_id: &str, pollutant: &str) -> Result<Vec<SeriesPoint>, AqError>
where
    T: TimeSeriesService + ?Sized,
{
    fetch_history_at(timeseries, station_id, pollutant, HistoryWindow::default(), Utc::now()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotFoundKind, PARAM_PM25};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct FakeTimeSeries {
        sensor: Result<String, AqError>,
        points: Vec<SeriesPoint>,
        requested: Mutex<Option<(String, DateTime<Utc>, DateTime<Utc>, usize)>>,
    }

    #[async_trait]
    impl TimeSeriesService for FakeTimeSeries {
        async fn lookup_sensor_for_station(&self, _station_id: &str, _pollutant: &str) -> Result<String, AqError> {
            self.sensor.clone()
        }

        async fn lookup_measurements(
            &self,
            sensor_id: &str,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
            max_count: usize,
        ) -> Result<Vec<SeriesPoint>, AqError> {
            *self.requested.lock().unwrap() = Some((sensor_id.to_string(), from, to, max_count));
            Ok(self.points.clone())
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 8, 12, 0, 0).unwrap()
    }

    fn point(hours_ago: i64, value: f64) -> SeriesPoint {
        SeriesPoint {
            time: fixed_now() - Duration::hours(hours_ago),
            value,
        }
    }

    fn fake(points: Vec<SeriesPoint>) -> FakeTimeSeries {
        FakeTimeSeries {
            sensor: Ok("3917".to_string()),
            points,
            requested: Mutex::new(None),
        }
    }

    #[tokio::test]
    async fn test_output_is_sorted_regardless_of_upstream_order() {
        let ts = fake(vec![point(1, 3.0), point(30, 1.0), point(5, 2.0), point(0, 4.0)]);
        let series = fetch_history_at(&ts, "2178", PARAM_PM25, HistoryWindow::default(), fixed_now())
            .await
            .expect("history fetch succeeds");
        assert!(series.windows(2).all(|w| w[0].time <= w[1].time));
        let values: Vec<f64> = series.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn test_requests_seven_day_window_for_resolved_sensor() {
        let ts = fake(Vec::new());
        fetch_history_at(&ts, "2178", PARAM_PM25, HistoryWindow::default(), fixed_now())
            .await
            .expect("history fetch succeeds");
        let (sensor, from, to, max) = ts.requested.lock().unwrap().clone().expect("measurements requested");
        assert_eq!(sensor, "3917");
        assert_eq!(to, fixed_now());
        assert_eq!(to - from, Duration::days(7));
        assert_eq!(max, 1000);
    }

    #[tokio::test]
    async fn test_empty_window_is_not_an_error() {
        let ts = fake(Vec::new());
        let series = fetch_history_at(&ts, "2178", PARAM_PM25, HistoryWindow::default(), fixed_now())
            .await
            .expect("empty window is a valid result");
        assert!(series.is_empty());
    }

    #[tokio::test]
    async fn test_missing_sensor_is_distinguished_from_missing_station() {
        let mut ts = fake(Vec::new());
        ts.sensor = Err(AqError::NotFound(NotFoundKind::Sensor {
            station_id: "2178".into(),
            pollutant: PARAM_PM25.into(),
        }));
        let err = fetch_history_at(&ts, "2178", PARAM_PM25, HistoryWindow::default(), fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AqError::NotFound(NotFoundKind::Sensor { .. })));

        ts.sensor = Err(AqError::NotFound(NotFoundKind::Station("2178".into())));
        let err = fetch_history_at(&ts, "2178", PARAM_PM25, HistoryWindow::default(), fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AqError::NotFound(NotFoundKind::Station(_))));
        // no measurement request was made for either
        assert!(ts.requested.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_huge_window_is_clamped_instead_of_overflowing() {
        let ts = fake(Vec::new());
        let window = HistoryWindow {
            days: 9_000_000_000_000,
            max_points: 1000,
        };
        fetch_history_at(&ts, "2178", PARAM_PM25, window, fixed_now())
            .await
            .expect("history fetch succeeds");
        let (_, from, to, _) = ts.requested.lock().unwrap().clone().expect("measurements requested");
        assert_eq!(to - from, Duration::days(MAX_HISTORY_DAYS));
    }

    #[tokio::test]
    async fn test_oversized_response_keeps_most_recent_points() {
        let ts = fake((0..10).map(|h| point(h, h as f64)).collect());
        let window = HistoryWindow { days: 7, max_points: 3 };
        let series = fetch_history_at(&ts, "2178", PARAM_PM25, window, fixed_now())
            .await
            .expect("history fetch succeeds");
        let values: Vec<f64> = series.iter().map(|p| p.value).collect();
        // newest = 0 hours ago, value 0.0
        assert_eq!(values, vec![2.0, 1.0, 0.0]);
    }
}
