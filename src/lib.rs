pub mod accounts;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod links;
pub mod notifications;
pub mod sos;
pub mod state;
pub mod store;
pub mod telemetry;
