pub mod config;
pub mod container;
pub mod events;
pub mod extract;
pub mod patterns;
pub mod performance;
pub mod serialize;

/// Schema version stamped on every feature container
pub const SCHEMA_VERSION: &str = "1.0";

/// Application name for XDG paths
pub const APP_NAME: &str = "groovescan";
