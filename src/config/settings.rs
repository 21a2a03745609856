//! TOML-based configuration for inferer.
//!
//! Supports a config file (inferer.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [connection]
//! driver = "mongodb"
//! connection_string = "${MONGO_URI}"
//!
//! [worker]
//! path = "./inferer-worker"
//! timeout_secs = 30
//!
//! [discover]
//! sample_size = 10
//! allow_full_scan = false
//! follow_identifier_arrays = true
//! max_concurrent_probes = 64
//! excluded_databases = ["config", "system", "admin", "local"]
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::discover::{DiscoverConfig, DEFAULT_EXCLUDED_DATABASES};
use crate::worker::protocol::ConnectionParams;
use crate::worker::DEFAULT_TIMEOUT_SECS;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Store the worker connects to.
    pub connection: ConnectionSettings,

    /// Worker process configuration.
    pub worker: WorkerSettings,

    /// Discovery engine configuration.
    pub discover: DiscoverSettings,
}

/// Connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Store driver understood by the worker.
    pub driver: String,

    /// Connection string (supports ${ENV_VAR} expansion).
    pub connection_string: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            driver: "mongodb".to_string(),
            connection_string: "mongodb://localhost:27017".to_string(),
        }
    }
}

impl ConnectionSettings {
    /// Get the connection string with environment variables expanded.
    pub fn resolved_connection_string(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.connection_string)
    }

    /// Protocol parameters sent with every worker request.
    pub fn to_params(&self) -> Result<ConnectionParams, SettingsError> {
        Ok(ConnectionParams {
            driver: self.driver.clone(),
            connection_string: self.resolved_connection_string()?,
        })
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Path to worker binary. Searched for when unset.
    pub path: Option<String>,

    /// Extra arguments passed to the worker.
    pub args: Vec<String>,

    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            path: None,
            args: Vec::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Discovery engine settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoverSettings {
    /// Documents sampled per collection.
    pub sample_size: usize,

    /// Track every scalar field for presence, not only identifiers.
    pub allow_full_scan: bool,

    /// Emit candidates for identifiers held in arrays.
    pub follow_identifier_arrays: bool,

    /// Ceiling on concurrent existence probes against the store.
    pub max_concurrent_probes: usize,

    /// Databases never scanned nor used as match targets.
    pub excluded_databases: Vec<String>,
}

impl Default for DiscoverSettings {
    fn default() -> Self {
        let config = DiscoverConfig::default();
        Self {
            sample_size: config.sample_size,
            allow_full_scan: config.allow_full_scan,
            follow_identifier_arrays: config.follow_identifier_arrays,
            max_concurrent_probes: config.max_concurrent_probes,
            excluded_databases: DEFAULT_EXCLUDED_DATABASES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl DiscoverSettings {
    /// Build the engine configuration, validating ranges.
    pub fn to_config(&self) -> Result<DiscoverConfig, SettingsError> {
        if self.sample_size == 0 {
            return Err(SettingsError::InvalidConfig(
                "discover.sample_size must be at least 1".to_string(),
            ));
        }
        Ok(DiscoverConfig::default()
            .with_sample_size(self.sample_size)
            .with_full_scan(self.allow_full_scan)
            .with_identifier_arrays(self.follow_identifier_arrays)
            .with_max_concurrent_probes(self.max_concurrent_probes)
            .with_excluded_databases(self.excluded_databases.clone()))
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `INFERER_CONFIG`
    /// 2. `./inferer.toml`
    /// 3. `~/.config/inferer/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("INFERER_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("inferer.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("inferer").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Get the worker binary path.
    ///
    /// Returns the configured path, or the first well-known location that exists.
    pub fn worker_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.worker.path {
            let expanded = expand_env_vars(path).ok()?;
            return Some(PathBuf::from(expanded));
        }

        ["./inferer-worker", "./worker/inferer-worker"]
            .into_iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.peek() == Some(&'{') {
            chars.next();
            chars.by_ref().take_while(|&ch| ch != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                name.push(ch);
            }
            if name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
            name
        };

        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name))?;
        result.push_str(&value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars_braces() {
        env::set_var("INFERER_TEST_VAR", "hello");
        assert_eq!(expand_env_vars("${INFERER_TEST_VAR}").unwrap(), "hello");
        assert_eq!(
            expand_env_vars("prefix_${INFERER_TEST_VAR}_suffix").unwrap(),
            "prefix_hello_suffix"
        );
        env::remove_var("INFERER_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_no_braces() {
        env::set_var("INFERER_TEST_VAR2", "world");
        assert_eq!(expand_env_vars("$INFERER_TEST_VAR2").unwrap(), "world");
        assert_eq!(expand_env_vars("$INFERER_TEST_VAR2!").unwrap(), "world!");
        assert_eq!(expand_env_vars("cost: 5$").unwrap(), "cost: 5$");
        env::remove_var("INFERER_TEST_VAR2");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("${NONEXISTENT_VAR_12345}");
        assert!(matches!(result, Err(SettingsError::MissingEnvVar(v)) if v == "NONEXISTENT_VAR_12345"));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[connection]
driver = "mongodb"
connection_string = "mongodb://db.internal:27017"

[worker]
path = "/opt/inferer/worker"
timeout_secs = 5

[discover]
sample_size = 25
allow_full_scan = true
excluded_databases = ["admin", "local"]
"#;

        let settings: Settings = toml::from_str(toml).unwrap();

        assert_eq!(settings.connection.driver, "mongodb");
        assert_eq!(settings.worker.timeout_secs, 5);
        assert_eq!(
            settings.worker_path(),
            Some(PathBuf::from("/opt/inferer/worker"))
        );

        let config = settings.discover.to_config().unwrap();
        assert_eq!(config.sample_size, 25);
        assert!(config.allow_full_scan);
        // Unset keys keep their defaults
        assert!(config.follow_identifier_arrays);
        assert!(config.is_excluded("admin"));
        assert!(!config.is_excluded("config"));
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        let config = settings.discover.to_config().unwrap();

        assert_eq!(config.sample_size, 10);
        assert!(!config.allow_full_scan);
        for db in ["config", "system", "admin", "local"] {
            assert!(config.is_excluded(db));
        }
        assert_eq!(settings.worker.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_zero_sample_size_is_rejected() {
        let settings: Settings = toml::from_str("[discover]\nsample_size = 0\n").unwrap();
        assert!(matches!(
            settings.discover.to_config(),
            Err(SettingsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_connection_params_expand_env() {
        env::set_var("INFERER_TEST_URI", "mongodb://secret@host");
        let conn = ConnectionSettings {
            driver: "mongodb".to_string(),
            connection_string: "${INFERER_TEST_URI}".to_string(),
        };
        assert_eq!(
            conn.to_params().unwrap().connection_string,
            "mongodb://secret@host"
        );
        env::remove_var("INFERER_TEST_URI");
    }
}
