//! Configuration: crawl policy and the station registry.
//!
//! The registry is an explicit value built once at startup and passed to the
//! runner; nothing looks stations up globally. A YAML file with the same shape
//! as the embedded `stations.yaml` replaces the built-in defaults.

use crate::error::ScrapeError;
use crate::models::{RangeParams, Station, StationKind};
use crate::window::{WindowConfig, WindowPolicy};
use chrono::{Duration, NaiveTime};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

const BUILTIN: &str = include_str!("../stations.yaml");

/// Top-level YAML document.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub window: WindowConfig,
    pub stations: Vec<StationConfig>,
}

fn default_concurrency() -> usize {
    4
}

/// YAML shape of one station.
#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    pub identifier: String,
    pub name: String,
    pub close_down: String,
    pub program_url: Url,
    pub time_zone: String,
    pub kind: StationKind,
    #[serde(default)]
    pub calendar_url: Option<Url>,
    #[serde(default)]
    pub day_url: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub range: RangeConfig,
}

fn default_language() -> String {
    "de".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    pub lead_minutes: i64,
    pub width_minutes: i64,
    pub rows: u32,
}

impl Default for RangeConfig {
    fn default() -> Self {
        let r = RangeParams::default();
        Self {
            lead_minutes: r.lead.num_minutes(),
            width_minutes: r.width.num_minutes(),
            rows: r.rows,
        }
    }
}

impl AppConfig {
    /// The embedded defaults.
    pub fn builtin() -> Result<Self, ScrapeError> {
        Self::from_yaml(BUILTIN)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ScrapeError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read a YAML file.
    #[instrument(level = "info")]
    pub async fn load(path: &Path) -> Result<Self, ScrapeError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ScrapeError::config(format!("{}: {}", path.display(), e)))?;
        let cfg = Self::from_yaml(&text)?;
        info!(stations = cfg.stations.len(), "Loaded configuration");
        Ok(cfg)
    }

    pub fn window_policy(&self) -> WindowPolicy {
        WindowPolicy::from(&self.window)
    }

    /// Validate every station and build the registry.
    ///
    /// Consecutive anchors are one bucket apart, so a calendar range narrower
    /// than the bucket would leave gaps between range queries.
    pub fn registry(&self) -> Result<Registry, ScrapeError> {
        let bucket = self.window_policy().bucket;
        let stations = self.stations.iter().map(StationConfig::build).collect::<Result<Vec<_>, _>>()?;
        if let Some(s) = stations
            .iter()
            .find(|s| s.kind == StationKind::CalendarItems && s.range.width < bucket)
        {
            return Err(ScrapeError::config(format!(
                "{}: range width of {} min is shorter than the {} min window bucket",
                s.identifier,
                s.range.width.num_minutes(),
                bucket.num_minutes()
            )));
        }
        Registry::new(stations)
    }
}

impl StationConfig {
    /// Validate and convert into a [`Station`].
    pub fn build(&self) -> Result<Station, ScrapeError> {
        let id = self.identifier.trim();
        if id.is_empty() {
            return Err(ScrapeError::config(format!("station '{}' has no identifier", self.name)));
        }
        let time_zone: Tz = self
            .time_zone
            .parse()
            .map_err(|e| ScrapeError::config(format!("{}: time zone: {}", id, e)))?;
        NaiveTime::parse_from_str(&self.close_down, "%H:%M")
            .map_err(|e| ScrapeError::config(format!("{}: close_down '{}': {}", id, self.close_down, e)))?;
        match self.kind {
            StationKind::CalendarItems if self.calendar_url.is_none() => {
                return Err(ScrapeError::config(format!("{}: calendar-items needs calendar_url", id)));
            }
            StationKind::DayTable if self.day_url.is_none() => {
                return Err(ScrapeError::config(format!("{}: day-table needs day_url", id)));
            }
            _ => {}
        }
        if self.range.width_minutes <= 0 || self.range.lead_minutes < 0 {
            return Err(ScrapeError::config(format!("{}: range needs width > 0 and lead >= 0", id)));
        }
        debug!(identifier = id, kind = ?self.kind, "Configured station");
        Ok(Station {
            identifier: id.to_string(),
            name: self.name.clone(),
            close_down: self.close_down.clone(),
            program_url: self.program_url.clone(),
            time_zone,
            kind: self.kind,
            calendar_url: self.calendar_url.clone(),
            day_url: self.day_url.clone(),
            language: self.language.clone(),
            publisher: self.publisher.clone(),
            range: RangeParams {
                lead: Duration::minutes(self.range.lead_minutes),
                width: Duration::minutes(self.range.width_minutes),
                rows: self.range.rows,
            },
        })
    }
}

/// Read-only map from identifier to station.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    stations: BTreeMap<String, Arc<Station>>,
}

impl Registry {
    /// Fails on duplicate identifiers.
    pub fn new(stations: Vec<Station>) -> Result<Self, ScrapeError> {
        let mut map = BTreeMap::new();
        for s in stations {
            let id = s.identifier.clone();
            if map.insert(id.clone(), Arc::new(s)).is_some() {
                return Err(ScrapeError::config(format!("duplicate station '{}'", id)));
            }
        }
        Ok(Self { stations: map })
    }

    pub fn get(&self, identifier: &str) -> Result<Arc<Station>, ScrapeError> {
        self.stations
            .get(identifier)
            .cloned()
            .ok_or_else(|| ScrapeError::UnknownStation(identifier.to_string()))
    }

    /// Identifiers in sorted order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.stations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}
