// HTTP request handlers
use crate::domain::settings::{MarkerSettings, SettingsError, SettingsUpdate};
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUpdatedResponse {
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Latest animation from memory; never waits on a running tick.
pub async fn get_animation(State(state): State<Arc<AppState>>) -> Response {
    match state.lightning_service.animation() {
        Some(bytes) => (
            [
                (header::CONTENT_TYPE, "image/gif"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            bytes,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn get_last_updated(State(state): State<Arc<AppState>>) -> Json<LastUpdatedResponse> {
    Json(LastUpdatedResponse {
        last_updated: state.lightning_service.last_updated(),
    })
}

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<MarkerSettings> {
    Json(state.lightning_service.settings())
}

/// Apply a partial settings change; out-of-range coordinates are rejected
/// with 422 and leave the stored settings untouched.
pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> Response {
    match state.lightning_service.update_settings(update).await {
        Ok(settings) => Json(settings).into_response(),
        Err(e) => match e.downcast_ref::<SettingsError>() {
            Some(invalid) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse {
                    error: invalid.to_string(),
                }),
            )
                .into_response(),
            None => {
                tracing::error!("Error updating settings: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
    }
}
