//! Health-index thresholds and anomaly flagging.
//!
//! Submodules:
//! - `thresholds` — concentration → index value and severity band.
//! - `anomalies` — anomaly flag threshold, view filters, summary numbers.

pub mod anomalies;
pub mod thresholds;
