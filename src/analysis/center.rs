//! Map center estimation from a resolved station set.
//!
//! Home regions (see `regions`) only average stations inside their bounding
//! box. Every other city averages all stations unconditionally: a directory
//! result that strays outside the city drags the center with it. That is a
//! known limitation for cities without a configured box.

use crate::model::{Center, Station};
use crate::regions::RegionRegistry;

/// Arithmetic mean of station coordinates. `None` for an empty set.
pub fn mean_center<'a>(stations: impl IntoIterator<Item = &'a Station>) -> Option<Center> {
    let (count, lon_sum, lat_sum) = stations
        .into_iter()
        .fold((0usize, 0.0, 0.0), |(n, lon, lat), s| (n + 1, lon + s.longitude, lat + s.latitude));

    if count == 0 {
        return None;
    }
    Some(Center::new(lon_sum / count as f64, lat_sum / count as f64))
}

/// Picks the map focal point for `city`.
///
/// Returns `previous` unchanged when there are no stations, when a home
/// region has no stations inside its box, or when the average is not a
/// valid coordinate.
pub fn estimate_center(
    city: &str,
    stations: &[Station],
    previous: Center,
    regions: &RegionRegistry,
) -> Center {
    if stations.is_empty() {
        return previous;
    }

    let estimate = match regions.home_region(city).and_then(|r| r.bounds) {
        Some(bounds) => mean_center(
            stations
                .iter()
                .filter(|s| bounds.contains(s.longitude, s.latitude)),
        ),
        None => mean_center(stations),
    };

    estimate.filter(Center::is_valid).unwrap_or(previous)
}
