// JSON file implementation of the settings store
use crate::application::settings_store::SettingsStore;
use crate::domain::settings::MarkerSettings;
use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<Option<MarkerSettings>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("read settings {}", self.path.display()));
            }
        };
        let settings = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse settings {}", self.path.display()))?;
        Ok(Some(settings))
    }

    fn save(&self, settings: &MarkerSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create settings directory {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(settings).context("encode settings")?;
        fs::write(&self.path, json)
            .with_context(|| format!("write settings {}", self.path.display()))
    }
}
