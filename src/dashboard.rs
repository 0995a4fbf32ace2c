//! Explicit view state for a dashboard front end.
//!
//! Holds the selected city, the map center carried between cycles, the user's
//! filters and selection, and the last result the view is showing. A failed
//! cycle leaves the last good result on screen and records the error.

use std::sync::Arc;

use crate::alert::anomalies::{StationFilter, StationSummary, summarize};
use crate::model::{AqError, Center, RefreshResult, Station};
use crate::refresh::Refresher;
use crate::regions::{RegionRegistry, SAN_FRANCISCO_CENTER};

#[derive(Debug, Clone)]
pub struct DashboardState {
    pub city: String,
    pub center: Center,
    pub filter: StationFilter,
    pub selected_id: Option<String>,
    pub result: Option<Arc<RefreshResult>>,
    /// Message for the last failed cycle; cleared by the next success.
    pub error: Option<String>,
}

impl DashboardState {
    pub fn new(city: impl Into<String>, center: Center) -> Self {
        DashboardState {
            city: city.into(),
            center,
            filter: StationFilter::default(),
            selected_id: None,
            result: None,
            error: None,
        }
    }

    /// Starts on `city` with the region's default center, if any.
    pub fn for_city(city: impl Into<String>, regions: &RegionRegistry) -> Self {
        let city = city.into();
        let center = regions.default_center_for(&city).unwrap_or(SAN_FRANCISCO_CENTER);
        Self::new(city, center)
    }

    /// Switches city. The previous result stays visible until the next
    /// refresh replaces it; the selection is dropped.
    pub fn set_city(&mut self, city: impl Into<String>) {
        self.city = city.into();
        self.selected_id = None;
    }

    pub fn select(&mut self, station_id: Option<&str>) {
        self.selected_id = station_id.map(String::from);
    }

    pub fn apply_result(&mut self, result: Arc<RefreshResult>) {
        self.center = result.center;
        if self
            .selected_id
            .as_deref()
            .is_some_and(|id| result.find_station(id).is_none())
        {
            self.selected_id = None;
        }
        self.result = Some(result);
        self.error = None;
    }

    /// Records a failed cycle. A superseded cycle is not a failure the user
    /// needs to see; the newer cycle will report for itself.
    pub fn apply_failure(&mut self, err: &AqError) {
        if matches!(err, AqError::Superseded { .. }) {
            return;
        }
        self.error = Some(err.to_string());
    }

    /// Runs one cycle for the current city and applies its outcome.
    pub async fn refresh(&mut self, refresher: &Refresher) -> Result<(), AqError> {
        match refresher.refresh(&self.city, self.center).await {
            Ok(result) => {
                self.apply_result(result);
                Ok(())
            }
            Err(e) => {
                self.apply_failure(&e);
                Err(e)
            }
        }
    }

    pub fn visible_stations(&self) -> Vec<&Station> {
        match &self.result {
            Some(result) => self.filter.apply(&result.stations),
            None => Vec::new(),
        }
    }

    pub fn selected_station(&self) -> Option<&Station> {
        let id = self.selected_id.as_deref()?;
        self.result.as_ref()?.find_station(id)
    }

    /// Headline numbers over the currently visible stations.
    pub fn summary(&self) -> StationSummary {
        summarize(&self.visible_stations())
    }
}
