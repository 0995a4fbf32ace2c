//! Air-quality station monitoring service.
//!
//! Resolves the monitoring stations for a city, converts each station's
//! latest PM2.5 concentration to a health index, scores the highest-index
//! stations for recent anomalies, and publishes the merged result as one
//! atomic refresh.

pub mod alert;
pub mod analysis;
pub mod config;
pub mod dashboard;
pub mod fanout;
pub mod history;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod refresh;
pub mod regions;
pub mod resolve;

pub use alert::thresholds::pollutant_to_index;
pub use analysis::anomaly::score_anomaly;
pub use history::{fetch_history, fetch_history_at};
pub use model::{AqError, RefreshResult, Station};
pub use refresh::{RefreshSlot, Refresher};
pub use resolve::resolve_stations;
