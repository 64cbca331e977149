// Settings store trait - opaque persistence for marker settings
use crate::domain::settings::MarkerSettings;

pub trait SettingsStore: Send + Sync {
    /// Previously saved settings, `None` if nothing was saved yet.
    fn load(&self) -> anyhow::Result<Option<MarkerSettings>>;

    fn save(&self, settings: &MarkerSettings) -> anyhow::Result<()>;
}
