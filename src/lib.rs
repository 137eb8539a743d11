pub mod analysis;
pub mod comparison;
pub mod config;
pub mod db;
pub mod gaps;
pub mod import;
pub mod penalty;
pub mod stats;
pub mod store;
pub mod tours;

/// Application name for XDG paths
pub const APP_NAME: &str = "tourbreak";
