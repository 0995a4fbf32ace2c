//! Anomaly flagging and station filtering.
//!
//! A station is flagged once its anomaly score reaches
//! [`ANOMALY_FLAG_THRESHOLD`]. Unscored stations are never flagged; an
//! absent score means "not evaluated", not "normal".

use serde::{Deserialize, Serialize};

use crate::model::Station;

/// Score at or above which a station counts as anomalous.
pub const ANOMALY_FLAG_THRESHOLD: u8 = 75;

pub fn is_flagged(station: &Station) -> bool {
    station.anomaly.is_some_and(|score| score >= ANOMALY_FLAG_THRESHOLD)
}

/// User-selected view filters over a station list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationFilter {
    /// Keep only stations whose index is strictly greater than this.
    pub index_above: Option<u32>,
    /// Keep only flagged stations.
    pub anomalies_only: bool,
}

impl StationFilter {
    pub fn matches(&self, station: &Station) -> bool {
        if let Some(threshold) = self.index_above {
            if station.aqi.value <= threshold {
                return false;
            }
        }
        !self.anomalies_only || is_flagged(station)
    }

    pub fn apply<'a>(&self, stations: &'a [Station]) -> Vec<&'a Station> {
        stations.iter().filter(|s| self.matches(s)).collect()
    }
}

/// Headline numbers for a (filtered) station list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StationSummary {
    pub station_count: usize,
    /// Mean index value; 0 for an empty list.
    pub mean_index: f64,
    pub anomaly_count: usize,
}

pub fn summarize(stations: &[&Station]) -> StationSummary {
    let station_count = stations.len();
    let mean_index = if station_count == 0 {
        0.0
    } else {
        stations.iter().map(|s| f64::from(s.aqi.value)).sum::<f64>() / station_count as f64
    };
    let anomaly_count = stations.iter().filter(|s| is_flagged(s)).count();

    StationSummary {
        station_count,
        mean_index,
        anomaly_count,
    }
}
