pub mod config;
pub mod manager;


pub use config::{RetrySettings, Settings};
pub use manager::SettingsManager;
