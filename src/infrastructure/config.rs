use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::ingest::RetryPolicy;
use crate::application::timeline::DEFAULT_CAPACITY;
use crate::domain::geo::MapBoundingBox;
use crate::domain::settings::MarkerSettings;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub feed: FeedSettings,
    pub retry: RetrySettings,
    pub map: MapSettings,
    pub storage: StorageSettings,
    pub assets: AssetSettings,
    pub schedule: ScheduleSettings,
    pub marker: MarkerDefaults,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub window_minutes: i64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            base_url: "https://data.blitzortung.org/Data/Protected/last_strikes.php".to_string(),
            username: String::new(),
            password: String::new(),
            window_minutes: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub timeout_secs: u64,
    pub backoff_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout_secs: 10,
            backoff_secs: 2,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts.max(1),
            timeout: Duration::from_secs(self.timeout_secs),
            backoff: Duration::from_secs(self.backoff_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapSettings {
    pub west: f64,
    pub east: f64,
    pub north: f64,
    pub south: f64,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            west: -12.28,
            east: 34.98,
            north: 54.239,
            south: 35.77,
        }
    }
}

impl MapSettings {
    pub fn bounding_box(&self) -> anyhow::Result<MapBoundingBox> {
        anyhow::ensure!(
            self.east > self.west,
            "map.east ({}) must be greater than map.west ({})",
            self.east,
            self.west
        );
        anyhow::ensure!(
            self.north > self.south && self.north < 90.0 && self.south > -90.0,
            "map.north ({}) and map.south ({}) must satisfy -90 < south < north < 90",
            self.north,
            self.south
        );
        Ok(MapBoundingBox::new(self.west, self.east, self.north, self.south))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSettings {
    pub directory: PathBuf,
    pub capacity: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data/lightning"),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssetSettings {
    pub directory: PathBuf,
    pub fonts_directory: Option<PathBuf>,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("assets"),
            fonts_directory: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleSettings {
    pub interval_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarkerDefaults {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub show_marker: bool,
    pub show_legend: bool,
    pub show_activity_graph: bool,
}

impl Default for MarkerDefaults {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            show_marker: true,
            show_legend: true,
            show_activity_graph: true,
        }
    }
}

impl MarkerDefaults {
    pub fn settings(&self) -> MarkerSettings {
        MarkerSettings {
            marker_lat: self.latitude,
            marker_lon: self.longitude,
            show_marker: self.show_marker,
            show_legend: self.show_legend,
            show_activity_graph: self.show_activity_graph,
            last_updated: None,
        }
    }
}

/// Load `config/lightning.*`, overridden by `LIGHTNING__SECTION__KEY` variables.
pub fn load_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/lightning").required(false))
        .add_source(config::Environment::with_prefix("LIGHTNING").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}
