/// Region registry for city-name heuristics.
///
/// Upstream directory queries match on a free-text locality and occasionally
/// return stations far outside the intended city. A region entry pins a
/// city name to a country filter for the directory query and, for "home"
/// regions, a bounding box that restricts center averaging. This is the
/// single source of truth for those heuristics: the built-in entries live
/// here and the config file can append more without code changes.

use serde::{Deserialize, Serialize};

use crate::model::Center;

// ---------------------------------------------------------------------------
// Region metadata
// ---------------------------------------------------------------------------

/// Closed lon/lat rectangle in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_longitude: f64,
    pub max_longitude: f64,
    pub min_latitude: f64,
    pub max_latitude: f64,
}

impl BoundingBox {
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        (self.min_longitude..=self.max_longitude).contains(&longitude)
            && (self.min_latitude..=self.max_latitude).contains(&latitude)
    }
}

/// One known city and the heuristics attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    /// Lowercase fragments; the region matches if the requested city contains any.
    #[serde(default)]
    pub name_contains: Vec<String>,
    /// Lowercase short forms that must match the whole requested city (e.g. "sf").
    #[serde(default)]
    pub aliases: Vec<String>,
    /// ISO 3166 country code added to the directory query.
    #[serde(default)]
    pub country: Option<String>,
    /// Present only for home regions: stations outside are ignored when averaging.
    #[serde(default)]
    pub bounds: Option<BoundingBox>,
    /// Map center to show before any stations are resolved.
    #[serde(default)]
    pub default_center: Option<Center>,
}

impl Region {
    /// Case-insensitive match against the fragments and aliases.
    pub fn matches(&self, city: &str) -> bool {
        let city = city.trim().to_lowercase();
        self.name_contains.iter().any(|fragment| city.contains(fragment.as_str()))
            || self.aliases.iter().any(|alias| city == *alias)
    }

    pub fn is_home(&self) -> bool {
        self.bounds.is_some()
    }
}

/// Ordered list of regions; the first match wins.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegionRegistry {
    pub regions: Vec<Region>,
}

/// US city fragments that get a country filter but no bounding box.
const US_CITY_FRAGMENTS: &[&str] = &[
    "san jose",
    "los angeles",
    "new york",
    "chicago",
    "boston",
    "seattle",
    "portland",
    "miami",
    "houston",
    "phoenix",
    "philadelphia",
    "dallas",
    "austin",
    "denver",
    "atlanta",
    "detroit",
    "minneapolis",
    "washington",
];

/// Fallback map center when nothing better is known: downtown San Francisco.
pub const SAN_FRANCISCO_CENTER: Center = Center::new(-122.4194, 37.7749);

impl RegionRegistry {
    /// Built-in entries: San Francisco as the home region, plus the US cities
    /// whose directory queries need a country filter.
    pub fn builtin() -> Self {
        let mut regions = vec![Region {
            name: "San Francisco".to_string(),
            name_contains: vec!["san francisco".to_string()],
            aliases: vec!["sf".to_string()],
            country: Some("US".to_string()),
            bounds: Some(BoundingBox {
                min_longitude: -122.6,
                max_longitude: -122.3,
                min_latitude: 37.6,
                max_latitude: 37.9,
            }),
            default_center: Some(SAN_FRANCISCO_CENTER),
        }];

        regions.extend(US_CITY_FRAGMENTS.iter().map(|fragment| Region {
            name: (*fragment).to_string(),
            name_contains: vec![(*fragment).to_string()],
            aliases: Vec::new(),
            country: Some("US".to_string()),
            bounds: None,
            default_center: None,
        }));

        RegionRegistry { regions }
    }

    /// Adds `extra` ahead of the existing entries so configured regions
    /// take precedence over built-in ones.
    pub fn with_overrides(mut self, extra: Vec<Region>) -> Self {
        let mut regions = extra;
        regions.append(&mut self.regions);
        self.regions = regions;
        self
    }

    pub fn find(&self, city: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.matches(city))
    }

    /// The first matching region that carries a bounding box.
    pub fn home_region(&self, city: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.is_home() && r.matches(city))
    }

    pub fn country_for(&self, city: &str) -> Option<&str> {
        self.regions
            .iter()
            .filter(|r| r.matches(city))
            .find_map(|r| r.country.as_deref())
    }

    pub fn default_center_for(&self, city: &str) -> Option<Center> {
        self.regions
            .iter()
            .filter(|r| r.matches(city))
            .find_map(|r| r.default_center)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
