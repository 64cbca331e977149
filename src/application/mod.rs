// Application layer - Tick pipeline, retention and service orchestration
pub mod ingest;
pub mod lightning_service;
pub mod settings_store;
pub mod timeline;
