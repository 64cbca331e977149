// Domain layer - Pure types and rules, no I/O
pub mod activity;
pub mod geo;
pub mod settings;
pub mod strike;
pub mod tick;
