// Infrastructure layer - External dependencies and adapters
pub mod artifact_store;
pub mod blitzortung_client;
pub mod config;
pub mod settings_file;
