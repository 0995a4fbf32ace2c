/// Refresh cycle orchestration.
///
/// One cycle for a city:
///
/// ```text
/// Idle → Resolving ──(directory failed)──→ Failed
///            │
///            ▼
///        Enriching: center, then weather ∥ top-K history → anomaly score
///            │
///            ▼
///         Merged → publish → Idle
/// ```
///
/// Nothing is published until the merged station list is complete, so
/// readers of the [`RefreshSlot`] never observe a half-enriched result.
/// Per-station history failures and a weather failure degrade the result;
/// only a directory failure fails the cycle.
///
/// Every call to [`Refresher::refresh`] takes a new generation number. A
/// cycle whose generation is no longer the newest when it reaches the
/// publish step is discarded with [`AqError::Superseded`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;

use crate::analysis::anomaly::score_anomaly;
use crate::analysis::center::estimate_center;
use crate::fanout::collect_concurrently;
use crate::history::{HistoryWindow, fetch_history_at};
use crate::ingest::{DirectoryService, TimeSeriesService, WeatherService};
use crate::logging::{self, DataSource};
use crate::model::{
    AqError, Center, Enrichment, EnrichmentReport, OutcomeCounts, PARAM_PM25, RefreshResult, SkipReason, Station,
    WeatherSnapshot,
};
use crate::regions::RegionRegistry;
use crate::resolve::{ResolveOptions, resolve_with_outcomes};

/// Stations scored per cycle.
pub const DEFAULT_TOP_K: usize = 10;

// ---------------------------------------------------------------------------
// Options and state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOptions {
    pub pollutant: String,
    /// Number of highest-index stations whose history is scored.
    pub top_k: usize,
    pub window: HistoryWindow,
    pub max_concurrency: Option<usize>,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        RefreshOptions {
            pollutant: PARAM_PM25.to_string(),
            top_k: DEFAULT_TOP_K,
            window: HistoryWindow::default(),
            max_concurrency: None,
        }
    }
}

/// Where the newest cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPhase {
    Idle,
    Resolving,
    Enriching,
    Merged,
    Failed,
}

// ---------------------------------------------------------------------------
// Publication slot
// ---------------------------------------------------------------------------

/// Holds the last published result. Readers either see the previous result
/// or the next one, never a partial merge.
#[derive(Debug)]
pub struct RefreshSlot {
    tx: watch::Sender<Option<Arc<RefreshResult>>>,
}

impl Default for RefreshSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshSlot {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        RefreshSlot { tx }
    }

    pub fn latest(&self) -> Option<Arc<RefreshResult>> {
        self.tx.borrow().clone()
    }

    /// Receiver that wakes on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<RefreshResult>>> {
        self.tx.subscribe()
    }

    /// Stores `result` only if `still_current` holds at the moment of the
    /// swap. The check runs under the channel's write lock.
    fn publish_if(&self, still_current: impl FnOnce() -> bool, result: Arc<RefreshResult>) -> bool {
        self.tx.send_if_modified(|current| {
            if !still_current() {
                return false;
            }
            *current = Some(result);
            true
        })
    }
}

// ---------------------------------------------------------------------------
// Top-K selection
// ---------------------------------------------------------------------------

/// Ids of the `k` stations with the highest index, highest first. Ties keep
/// directory order.
pub fn top_k_by_index(stations: &[Station], k: usize) -> Vec<String> {
    let mut ranked: Vec<&Station> = stations.iter().collect();
    ranked.sort_by(|a, b| b.aqi.value.cmp(&a.aqi.value));
    ranked.into_iter().take(k).map(|s| s.id.clone()).collect()
}

// ---------------------------------------------------------------------------
// Refresher
// ---------------------------------------------------------------------------

pub struct Refresher {
    directory: Arc<dyn DirectoryService>,
    timeseries: Arc<dyn TimeSeriesService>,
    weather: Arc<dyn WeatherService>,
    regions: RegionRegistry,
    options: RefreshOptions,
    generation: AtomicU64,
    slot: RefreshSlot,
    phase: watch::Sender<RefreshPhase>,
}

impl Refresher {
    pub fn new(
        directory: Arc<dyn DirectoryService>,
        timeseries: Arc<dyn TimeSeriesService>,
        weather: Arc<dyn WeatherService>,
        regions: RegionRegistry,
        options: RefreshOptions,
    ) -> Self {
        let (phase, _rx) = watch::channel(RefreshPhase::Idle);
        Refresher {
            directory,
            timeseries,
            weather,
            regions,
            options,
            generation: AtomicU64::new(0),
            slot: RefreshSlot::new(),
            phase,
        }
    }

    pub fn slot(&self) -> &RefreshSlot {
        &self.slot
    }

    pub fn phase(&self) -> RefreshPhase {
        *self.phase.borrow()
    }

    pub fn options(&self) -> &RefreshOptions {
        &self.options
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Older cycles still running do not overwrite the newest cycle's phase.
    fn set_phase(&self, generation: u64, phase: RefreshPhase) {
        if self.is_current(generation) {
            self.phase.send_replace(phase);
        }
    }

    /// Runs one full cycle for `city` and publishes the result.
    ///
    /// `previous_center` is kept when no better center can be estimated.
    /// On error nothing is published and the slot keeps its prior result.
    pub async fn refresh(&self, city: &str, previous_center: Center) -> Result<Arc<RefreshResult>, AqError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_phase(generation, RefreshPhase::Resolving);
        logging::info(DataSource::System, None, &format!("refresh #{} started for '{}'", generation, city));

        let resolve_options = ResolveOptions {
            pollutant: &self.options.pollutant,
            country: self.regions.country_for(city),
            max_concurrency: self.options.max_concurrency,
        };
        let resolution = match resolve_with_outcomes(&*self.directory, city, resolve_options).await {
            Ok(resolution) => resolution,
            Err(e) => {
                self.set_phase(generation, RefreshPhase::Failed);
                return Err(e);
            }
        };
        let location_counts = resolution.counts();
        let mut stations = resolution.into_stations();

        self.set_phase(generation, RefreshPhase::Enriching);
        let center = estimate_center(city, &stations, previous_center, &self.regions);
        let top_ids = top_k_by_index(&stations, self.options.top_k);

        let (weather, scored) = futures::join!(self.fetch_weather(center), self.score_stations(&top_ids));

        let history_counts = OutcomeCounts::tally(scored.iter().map(|(_, outcome)| outcome));
        logging::log_enrichment_summary(DataSource::OpenAq, "history", &history_counts);

        let scores: HashMap<String, u8> = scored
            .into_iter()
            .filter_map(|(id, outcome)| outcome.fetched().map(|score| (id, score)))
            .collect();
        for station in &mut stations {
            station.anomaly = scores.get(&station.id).copied();
        }

        self.set_phase(generation, RefreshPhase::Merged);
        let result = Arc::new(RefreshResult {
            city: city.to_string(),
            stations,
            center,
            weather,
            updated_at: Utc::now(),
            report: EnrichmentReport {
                locations: location_counts,
                history: history_counts,
                weather_available: weather.is_some(),
            },
        });

        if !self.slot.publish_if(|| self.is_current(generation), Arc::clone(&result)) {
            logging::info(
                DataSource::System,
                None,
                &format!("refresh #{} for '{}' discarded: a newer cycle started", generation, city),
            );
            return Err(AqError::Superseded { city: city.to_string() });
        }

        self.set_phase(generation, RefreshPhase::Idle);
        logging::info(
            DataSource::System,
            None,
            &format!(
                "refresh #{} published {} stations for '{}'{}",
                generation,
                result.stations.len(),
                city,
                if result.report.is_partial() { " (partial)" } else { "" }
            ),
        );
        Ok(result)
    }

    async fn fetch_weather(&self, center: Center) -> Option<WeatherSnapshot> {
        self.weather
            .lookup_current_weather(center.latitude, center.longitude)
            .await
            .inspect_err(|e| logging::log_failure(DataSource::OpenMeteo, None, "current weather", e))
            .ok()
    }

    async fn score_stations(&self, station_ids: &[String]) -> Vec<(String, Enrichment<u8>)> {
        let jobs = station_ids.iter().map(|id| async move { (id.clone(), self.score_station(id).await) });
        collect_concurrently(jobs, self.options.max_concurrency).await
    }

    async fn score_station(&self, station_id: &str) -> Enrichment<u8> {
        let history = fetch_history_at(
            &*self.timeseries,
            station_id,
            &self.options.pollutant,
            self.options.window,
            Utc::now(),
        )
        .await;

        match history {
            Ok(series) if series.is_empty() => Enrichment::Skipped(SkipReason::EmptyHistory),
            Ok(series) => Enrichment::Fetched(score_anomaly(&series)),
            Err(e) => {
                logging::log_failure(DataSource::OpenAq, Some(station_id), "history fetch", &e);
                Enrichment::Failed(e)
            }
        }
    }
}
