// Main entry point - Dependency injection, scheduler and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;
mod rendering;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use anyhow::Context;
use axum::{Router, routing::get};
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::ingest::{FetchError, StrikeSource};
use crate::application::lightning_service::{LightningService, PipelineSettings};
use crate::infrastructure::artifact_store::ArtifactStore;
use crate::infrastructure::blitzortung_client::BlitzortungClient;
use crate::infrastructure::config::load_config;
use crate::infrastructure::settings_file::{JsonSettingsStore, SETTINGS_FILE};
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    get_animation, get_last_updated, get_settings, health_check, put_settings,
};
use crate::rendering::animation::AnimationAssembler;
use crate::rendering::assets::MapAssets;
use crate::rendering::frame::FrameRenderer;
use crate::rendering::overlay::OverlayComposer;
use crate::rendering::svg::SvgRasterizer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = load_config()?;
    let bbox = config.map.bounding_box()?;

    // Rendering resources (fonts and images are loaded once)
    let svg = SvgRasterizer::with_system_fonts(config.assets.fonts_directory.as_deref());
    let assets = Arc::new(
        MapAssets::load(&config.assets.directory, &svg).context("Failed to load map assets")?,
    );

    // Feed client (infrastructure layer), credentials are checked before activation
    let client = Arc::new(BlitzortungClient::new(
        config.feed.base_url.clone(),
        config.feed.username.clone(),
        config.feed.password.clone(),
    )?);
    match client.check_connection().await {
        Ok(()) => tracing::info!("Connected to strike feed at {}", config.feed.base_url),
        Err(FetchError::Authentication) => {
            anyhow::bail!("Strike feed rejected the configured credentials")
        }
        Err(e) => tracing::warn!("Strike feed unreachable, continuing: {}", e),
    }

    // Create service (application layer)
    let store = ArtifactStore::new(&config.storage.directory);
    let settings_store = Arc::new(JsonSettingsStore::new(
        config.storage.directory.join(SETTINGS_FILE),
    ));
    let service = LightningService::new(
        client,
        store,
        settings_store,
        FrameRenderer::new(assets.clone(), bbox, svg.clone()),
        AnimationAssembler::new(OverlayComposer::new(assets, bbox, svg)),
        PipelineSettings {
            bbox,
            retry: config.retry.policy(),
            window_minutes: config.feed.window_minutes,
            capacity: config.storage.capacity,
        },
        config.marker.settings(),
    )?;
    service.activate().await?;

    // Periodic ticks; a slow tick skips missed slots instead of bursting
    let scheduler = {
        let service = service.clone();
        let period = Duration::from_secs(config.schedule.interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if let Err(e) = service.run_tick().await {
                    tracing::error!("Tick failed: {:#}", e);
                }
            }
        })
    };

    // Create application state
    let state_service = service.clone();
    let state = Arc::new(AppState {
        lightning_service: service,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/animation", get(get_animation))
        .route("/last-updated", get(get_last_updated))
        .route("/settings", get(get_settings).put(put_settings))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    tracing::info!("Starting lightning-map service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Waits for an in-flight tick before the scheduler is dropped
    state_service.deactivate(false).await?;
    scheduler.abort();
    tracing::info!("Lightning-map service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
