//! Configuration module for inferer.
//!
//! Handles the settings file, environment variables and engine defaults.

mod settings;

pub use settings::{
    expand_env_vars, ConnectionSettings, DiscoverSettings, Settings, SettingsError, WorkerSettings,
};
