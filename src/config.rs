/// Service configuration.
///
/// Loaded from a TOML file (path in `AQMON_CONFIG`, optional) with every
/// field defaulted, then overridden from the environment. `.env` files are
/// honored through `dotenv`. Secrets such as the OpenAQ key normally come
/// from the environment rather than the file.
///
/// ```toml
/// default_city = "San Francisco"
///
/// [openaq]
/// base_url = "https://api.openaq.org/v3"
///
/// [refresh]
/// top_k = 10
/// max_concurrency = 8
///
/// [logging]
/// level = "info"
/// file = "/var/log/aqmon.log"
///
/// [[regions]]
/// name = "Oakland"
/// name_contains = ["oakland"]
/// country = "US"
/// bounds = { min_longitude = -122.35, max_longitude = -122.1, min_latitude = 37.7, max_latitude = 37.9 }
/// ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::history::{HISTORY_MAX_POINTS, HISTORY_WINDOW_DAYS, HistoryWindow, MAX_HISTORY_DAYS};
use crate::ingest::openaq::OPENAQ_BASE_URL;
use crate::ingest::openmeteo::OPEN_METEO_BASE_URL;
use crate::logging::LogLevel;
use crate::model::{Center, PARAM_PM25};
use crate::refresh::{DEFAULT_TOP_K, RefreshOptions};
use crate::regions::{Region, RegionRegistry, SAN_FRANCISCO_CENTER};

pub const CONFIG_PATH_ENV: &str = "AQMON_CONFIG";
pub const API_KEY_ENV: &str = "OPENAQ_API_KEY";
pub const DEFAULT_CITY_ENV: &str = "DEFAULT_CITY";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Settings sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAqSettings {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for OpenAqSettings {
    fn default() -> Self {
        OpenAqSettings {
            base_url: OPENAQ_BASE_URL.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenMeteoSettings {
    pub base_url: String,
}

impl Default for OpenMeteoSettings {
    fn default() -> Self {
        OpenMeteoSettings {
            base_url: OPEN_METEO_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            user_agent: format!("aqmon_service/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    pub pollutant: String,
    /// Stations scored per cycle, highest index first.
    pub top_k: usize,
    pub history_days: i64,
    pub history_max_points: usize,
    /// Cap on concurrent upstream calls per fan-out. Unset means no cap.
    pub max_concurrency: Option<usize>,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        RefreshSettings {
            pollutant: PARAM_PM25.to_string(),
            top_k: DEFAULT_TOP_K,
            history_days: HISTORY_WINDOW_DAYS,
            history_max_points: HISTORY_MAX_POINTS,
            max_concurrency: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: LogLevel::Info,
            file: None,
            timestamps: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub default_city: String,
    pub openaq: OpenAqSettings,
    pub open_meteo: OpenMeteoSettings,
    pub http: HttpSettings,
    pub refresh: RefreshSettings,
    pub logging: LoggingSettings,
    /// Extra regions, checked before the built-in ones.
    pub regions: Vec<Region>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            default_city: "San Francisco".to_string(),
            openaq: OpenAqSettings::default(),
            open_meteo: OpenMeteoSettings::default(),
            http: HttpSettings::default(),
            refresh: RefreshSettings::default(),
            logging: LoggingSettings::default(),
            regions: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str, path: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_toml_str(&text, &display)
    }

    /// Loads `.env`, then the file named by `AQMON_CONFIG` if set (defaults
    /// otherwise), then applies environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from `lookup`, which maps variable names to values.
    /// Empty values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty(API_KEY_ENV) {
            self.openaq.api_key = Some(key);
        }
        if let Some(city) = non_empty(DEFAULT_CITY_ENV) {
            self.default_city = city;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_city.trim().is_empty() {
            return Err(ConfigError::Invalid("default_city must not be empty".into()));
        }
        for (name, url) in [("openaq.base_url", &self.openaq.base_url), ("open_meteo.base_url", &self.open_meteo.base_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!("{} must be an http(s) URL, got '{}'", name, url)));
            }
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be at least 1".into()));
        }
        if self.refresh.top_k == 0 {
            return Err(ConfigError::Invalid("refresh.top_k must be at least 1".into()));
        }
        if !(1..=MAX_HISTORY_DAYS).contains(&self.refresh.history_days) {
            return Err(ConfigError::Invalid(format!(
                "refresh.history_days must be between 1 and {}, got {}",
                MAX_HISTORY_DAYS, self.refresh.history_days
            )));
        }
        if self.refresh.history_max_points == 0 {
            return Err(ConfigError::Invalid("refresh.history_max_points must be at least 1".into()));
        }
        for region in &self.regions {
            if region.name_contains.is_empty() && region.aliases.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "region '{}' needs at least one of name_contains or aliases",
                    region.name
                )));
            }
            if let Some(b) = region.bounds {
                if b.min_longitude > b.max_longitude || b.min_latitude > b.max_latitude {
                    return Err(ConfigError::Invalid(format!("region '{}' has inverted bounds", region.name)));
                }
            }
        }
        Ok(())
    }

    /// Built-in regions with the configured ones in front.
    ///
    /// Match fragments are lowercased here so the file can use any case.
    pub fn region_registry(&self) -> RegionRegistry {
        let extra = self
            .regions
            .iter()
            .cloned()
            .map(|mut r| {
                r.name_contains = r.name_contains.iter().map(|s| s.to_lowercase()).collect();
                r.aliases = r.aliases.iter().map(|s| s.to_lowercase()).collect();
                r
            })
            .collect();
        RegionRegistry::builtin().with_overrides(extra)
    }

    /// Map center to show before the first refresh for the default city.
    pub fn initial_center(&self) -> Center {
        self.region_registry()
            .default_center_for(&self.default_city)
            .unwrap_or(SAN_FRANCISCO_CENTER)
    }

    pub fn refresh_options(&self) -> RefreshOptions {
        RefreshOptions {
            pollutant: self.refresh.pollutant.clone(),
            top_k: self.refresh.top_k,
            window: HistoryWindow {
                days: self.refresh.history_days,
                max_points: self.refresh.history_max_points,
            },
            max_concurrency: self.refresh.max_concurrency,
        }
    }
}
