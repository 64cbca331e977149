// Marker and overlay settings owned by one subsystem instance
use crate::domain::geo::MAX_MERCATOR_LAT;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerSettings {
    pub marker_lat: Option<f64>,
    pub marker_lon: Option<f64>,
    pub show_marker: bool,
    pub show_legend: bool,
    pub show_activity_graph: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for MarkerSettings {
    fn default() -> Self {
        Self {
            marker_lat: None,
            marker_lon: None,
            show_marker: true,
            show_legend: true,
            show_activity_graph: true,
            last_updated: None,
        }
    }
}

impl MarkerSettings {
    /// Marker position to draw, if the marker is enabled and fully placed.
    pub fn marker_position(&self) -> Option<(f64, f64)> {
        if !self.show_marker {
            return None;
        }
        self.marker_lat.zip(self.marker_lon)
    }

    pub fn apply(&mut self, update: &SettingsUpdate) -> Result<(), SettingsError> {
        update.validate()?;
        if let Some(lat) = update.marker_lat {
            self.marker_lat = Some(lat);
        }
        if let Some(lon) = update.marker_lon {
            self.marker_lon = Some(lon);
        }
        if let Some(show) = update.show_marker {
            self.show_marker = show;
        }
        if let Some(show) = update.show_legend {
            self.show_legend = show;
        }
        if let Some(show) = update.show_activity_graph {
            self.show_activity_graph = show;
        }
        Ok(())
    }
}

/// Partial settings change; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub marker_lat: Option<f64>,
    pub marker_lon: Option<f64>,
    pub show_marker: Option<bool>,
    pub show_legend: Option<bool>,
    pub show_activity_graph: Option<bool>,
}

impl SettingsUpdate {
    fn validate(&self) -> Result<(), SettingsError> {
        if let Some(lat) = self.marker_lat {
            if !(-MAX_MERCATOR_LAT..=MAX_MERCATOR_LAT).contains(&lat) {
                return Err(SettingsError::Latitude(lat));
            }
        }
        if let Some(lon) = self.marker_lon {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(SettingsError::Longitude(lon));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SettingsError {
    #[error("marker latitude {0} is outside [-85.05, 85.05]")]
    Latitude(f64),
    #[error("marker longitude {0} is outside [-180, 180]")]
    Longitude(f64),
}
