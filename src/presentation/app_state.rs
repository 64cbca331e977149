// Application state for HTTP handlers
use crate::application::lightning_service::LightningService;

#[derive(Clone)]
pub struct AppState {
    pub lightning_service: LightningService,
}
