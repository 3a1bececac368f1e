// src/config.rs
pub mod app;
pub mod gateway;

pub use app::{AppConfig, DatabaseConfig, UsageLinkConfig};
pub use gateway::GatewayConfig;
