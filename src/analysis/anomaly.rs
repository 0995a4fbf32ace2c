//! Robust outlier scoring for a station's recent history.
//!
//! Scores how far the most recent reading sits from the series median,
//! measured in MAD-derived standard deviations. Median and MAD both have a
//! 50% breakdown point, so the outlier being tested cannot drag the
//! baseline toward itself the way it would drag a mean and standard
//! deviation.

use crate::model::SeriesPoint;

/// Scales MAD to a consistent estimate of σ under a normal distribution.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Guards the division when MAD is 0 (constant series).
const EPSILON: f64 = 1e-6;

/// z-scores are capped here before scaling, i.e. 5σ maps to a score of 100.
const MAX_Z: f64 = 5.0;

/// Median of `values`, reordering the slice in place. `None` when empty.
///
/// Even lengths average the two central values.
pub fn median_in_place(values: &mut [f64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }

    let mid = n / 2;
    values.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = values[mid];

    if n % 2 == 0 {
        // After selection everything left of `mid` is <= upper; its max is the lower middle
        let lower = values[..mid].iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some((lower + upper) / 2.0)
    } else {
        Some(upper)
    }
}

/// Median absolute deviation around `median`.
pub fn median_absolute_deviation(values: &[f64], median: f64) -> f64 {
    let mut deviations: Vec<f64> = values.iter().map(|v| (v - median).abs()).collect();
    median_in_place(&mut deviations).unwrap_or(0.0)
}

/// Robust z-score of the last value against the whole series.
///
/// `values` must already be finite. `None` when empty.
pub fn robust_z_score(values: &[f64]) -> Option<f64> {
    let last = *values.last()?;

    let mut scratch = values.to_vec();
    let median = median_in_place(&mut scratch)?;
    let mad = median_absolute_deviation(values, median);

    Some((last - median).abs() / (MAD_TO_SIGMA * mad + EPSILON))
}

/// Anomaly score 0–100 for the latest point of a time-ordered series.
///
/// Non-finite values are dropped first. Empty (or all-invalid) input scores 0.
pub fn score_anomaly(series: &[SeriesPoint]) -> u8 {
    let values: Vec<f64> = series
        .iter()
        .map(|p| p.value)
        .filter(|v| v.is_finite())
        .collect();

    match robust_z_score(&values) {
        Some(z) => ((z.min(MAX_Z) / MAX_Z) * 100.0).round() as u8,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn series(values: &[f64]) -> Vec<SeriesPoint> {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| SeriesPoint {
                time: start + Duration::hours(i as i64),
                value,
            })
            .collect()
    }

    // --- Median / MAD -------------------------------------------------------

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median_in_place(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median_in_place(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median_in_place(&mut [7.0]), Some(7.0));
        assert_eq!(median_in_place(&mut []), None);
    }

    #[test]
    fn test_mad_ignores_single_outlier() {
        let values = [10.0, 11.0, 9.0, 10.0, 500.0];
        let mut scratch = values;
        let median = median_in_place(&mut scratch).unwrap();
        assert_eq!(median, 10.0);
        // deviations 0,1,1,0,490 -> median 1
        assert_eq!(median_absolute_deviation(&values, median), 1.0);
    }

    // --- Scores -------------------------------------------------------------

    #[test]
    fn test_empty_series_scores_zero() {
        assert_eq!(score_anomaly(&[]), 0);
    }

    #[test]
    fn test_constant_series_scores_zero() {
        assert_eq!(score_anomaly(&series(&[8.0; 12])), 0);
    }

    #[test]
    fn test_spike_at_end_scores_high() {
        // median 10, MAD 0 -> z is enormous, clamps at 5 -> 100
        assert_eq!(score_anomaly(&series(&[10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 100.0])), 100);
    }

    #[test]
    fn test_spike_in_middle_does_not_flag_latest() {
        assert_eq!(score_anomaly(&series(&[10.0, 10.0, 100.0, 10.0, 10.0])), 0);
    }

    #[test]
    fn test_moderate_deviation_scales_linearly() {
        // median 11, deviations 1,0,1,1,1,0,1 -> MAD 1; last = 12 -> z = 1/1.4826 ≈ 0.6745 -> 13.49 -> 13
        let score = score_anomaly(&series(&[10.0, 11.0, 12.0, 10.0, 12.0, 11.0, 12.0]));
        assert_eq!(score, 13);
    }

    #[test]
    fn test_invalid_values_are_filtered() {
        let mut points = series(&[10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 100.0]);
        points.push(SeriesPoint {
            time: points[6].time + Duration::hours(1),
            value: f64::NAN,
        });
        points.insert(
            2,
            SeriesPoint {
                time: points[1].time,
                value: f64::INFINITY,
            },
        );
        // NaN at the end is dropped, so 100.0 is still the test point
        assert_eq!(score_anomaly(&points), 100);
    }

    #[test]
    fn test_all_invalid_scores_zero() {
        assert_eq!(score_anomaly(&series(&[f64::NAN, f64::INFINITY, f64::NEG_INFINITY])), 0);
    }

    #[test]
    fn test_score_always_within_range() {
        let inputs: [&[f64]; 5] = [
            &[1.0],
            &[1.0, 1e300],
            &[-5.0, 5.0, -5.0, 5.0, 1e12],
            &[0.0, 0.0, 0.0, 1e-9],
            &[3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0],
        ];
        for values in inputs {
            let score = score_anomaly(&series(values));
            assert!(score <= 100, "score {} out of range for {:?}", score, values);
        }
    }
}
