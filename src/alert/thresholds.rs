//! PM2.5 concentration → health index conversion.
//!
//! The published piecewise-linear scale maps a concentration range onto an
//! index range per severity band. Band edges and interpolation must match the
//! published table exactly; consumers compare the produced numbers against
//! other sources.

use crate::model::{AqiBand, AqiReading};

/// One row of the breakpoint table. Both ranges are closed intervals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    pub concentration_low: f64,
    pub concentration_high: f64,
    pub index_low: u32,
    pub index_high: u32,
    pub band: AqiBand,
}

impl Breakpoint {
    pub fn contains(&self, concentration: f64) -> bool {
        concentration >= self.concentration_low && concentration <= self.concentration_high
    }

    fn interpolate(&self, concentration: f64) -> f64 {
        let index_span = f64::from(self.index_high) - f64::from(self.index_low);
        let concentration_span = self.concentration_high - self.concentration_low;
        f64::from(self.index_low) + index_span / concentration_span * (concentration - self.concentration_low)
    }
}

/// PM2.5 breakpoints in µg/m³, ascending.
pub static PM25_BREAKPOINTS: [Breakpoint; 5] = [
    Breakpoint {
        concentration_low: 0.0,
        concentration_high: 12.0,
        index_low: 0,
        index_high: 50,
        band: AqiBand::Good,
    },
    Breakpoint {
        concentration_low: 12.1,
        concentration_high: 35.4,
        index_low: 51,
        index_high: 100,
        band: AqiBand::Moderate,
    },
    Breakpoint {
        concentration_low: 35.5,
        concentration_high: 55.4,
        index_low: 101,
        index_high: 150,
        band: AqiBand::Unhealthy,
    },
    Breakpoint {
        concentration_low: 55.5,
        concentration_high: 150.4,
        index_low: 151,
        index_high: 200,
        band: AqiBand::VeryUnhealthy,
    },
    Breakpoint {
        concentration_low: 150.5,
        concentration_high: 500.4,
        index_low: 201,
        index_high: 500,
        band: AqiBand::Hazardous,
    },
];

/// Picks the breakpoint used for `concentration`.
///
/// First row containing the concentration, otherwise the last row. The
/// 0.1-wide gaps between rows (e.g. 12.05), negative input and non-finite
/// input all take the last row, as the published lookup does.
pub fn breakpoint_for(concentration: f64) -> &'static Breakpoint {
    PM25_BREAKPOINTS
        .iter()
        .find(|bp| bp.contains(concentration))
        .unwrap_or(&PM25_BREAKPOINTS[PM25_BREAKPOINTS.len() - 1])
}

/// Converts a PM2.5 concentration to an index value and band.
///
/// Never fails. Out-of-row concentrations extrapolate along the last row's
/// slope; the value saturates at 0 below and at `u32::MAX` above.
pub fn pollutant_to_index(concentration: f64) -> AqiReading {
    let bp = breakpoint_for(concentration);
    // `max` maps NaN to 0; `as` saturates +inf to u32::MAX
    let value = bp.interpolate(concentration).round().max(0.0) as u32;
    AqiReading { value, band: bp.band }
}
