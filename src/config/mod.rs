//! Configuration management for switchyard
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub use crate::error::ConfigError;
use crate::routing::{Role, StoreKind};

/// Main switchyard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Data sources, one router each
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Selection policy used within a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolerKind {
    #[default]
    Random,
    RoundRobin,
}

/// One logical data source routed by a single router
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Logical name, used in logs
    pub name: String,
    /// Store kind, decides which roles are allowed
    pub kind: StoreKind,
    /// Selection policy within a role
    #[serde(default)]
    pub pooler: PoolerKind,
    /// Tunables shared by every endpoint of the source
    #[serde(default)]
    pub tuning: TuningConfig,

    // Relational store roles
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub read: Vec<EndpointConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub write: Vec<EndpointConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shadow_read: Vec<EndpointConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shadow_write: Vec<EndpointConfig>,

    // Cache store roles
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default: Vec<EndpointConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shadow: Vec<EndpointConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gray: Vec<EndpointConfig>,
}

/// Connection tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Maximum open connections per backend
    pub max_open: u32,
    /// Maximum idle connections per backend
    pub max_idle: u32,
    /// Connection lifetime in seconds; sizes the retirement delay
    pub lifetime_window_sec: u64,
    /// Operations slower than this are logged as slow
    pub slow_threshold_ms: u64,
    /// Connect and probe timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            max_open: 200,
            max_idle: 10,
            lifetime_window_sec: 3,
            slow_threshold_ms: 10_000,
            connect_timeout_ms: 5_000,
        }
    }
}

/// A single backend endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Endpoint name, part of the identity key
    pub name: String,
    /// host:port
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Database index or schema name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// Fully resolved settings for constructing one backend
///
/// Combines an endpoint with the tunables of its source. Everything except
/// `slow_threshold` takes part in the identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    pub endpoint: EndpointConfig,
    pub tuning: TuningConfig,
}

impl BackendSettings {
    pub fn new(endpoint: EndpointConfig, tuning: TuningConfig) -> Self {
        Self { endpoint, tuning }
    }

    pub fn name(&self) -> &str {
        &self.endpoint.name
    }

    pub fn lifetime_window(&self) -> Duration {
        Duration::from_secs(self.tuning.lifetime_window_sec)
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.tuning.slow_threshold_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.tuning.connect_timeout_ms)
    }
}

impl SourceConfig {
    /// Endpoints configured for a role, mapped onto the unified role set
    pub fn endpoints(&self, role: Role) -> &[EndpointConfig] {
        match (self.kind, role) {
            (StoreKind::Relational, Role::Read) => &self.read,
            (StoreKind::Relational, Role::Write) => &self.write,
            (StoreKind::Relational, Role::ShadowRead) => &self.shadow_read,
            (StoreKind::Relational, Role::ShadowWrite) => &self.shadow_write,
            (StoreKind::Cache, Role::Write) => &self.default,
            (StoreKind::Cache, Role::ShadowWrite) => &self.shadow,
            (StoreKind::Cache, Role::Gray) => &self.gray,
            _ => &[],
        }
    }

    /// Resolved backend settings for every endpoint of a role
    pub fn settings(&self, role: Role) -> Vec<BackendSettings> {
        self.endpoints(role)
            .iter()
            .map(|endpoint| BackendSettings::new(endpoint.clone(), self.tuning.clone()))
            .collect()
    }

    /// Validate a single source
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "source name cannot be empty".to_string(),
            ));
        }

        let misplaced = match self.kind {
            StoreKind::Relational => [&self.default, &self.shadow, &self.gray]
                .iter()
                .any(|list| !list.is_empty()),
            StoreKind::Cache => [&self.read, &self.write, &self.shadow_read, &self.shadow_write]
                .iter()
                .any(|list| !list.is_empty()),
        };
        if misplaced {
            return Err(ConfigError::ValidationError(format!(
                "source {}: roles do not match store kind {}",
                self.name, self.kind
            )));
        }

        let has_primary = self
            .kind
            .primary_roles()
            .iter()
            .any(|role| !self.endpoints(*role).is_empty());
        if !has_primary {
            return Err(ConfigError::ValidationError(format!(
                "source {}: at least one primary endpoint is required",
                self.name
            )));
        }

        for role in self.kind.roles() {
            for endpoint in self.endpoints(*role) {
                if endpoint.name.trim().is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "source {}: empty endpoint name in role {}",
                        self.name, role
                    )));
                }
                validate_address(&endpoint.address).map_err(|reason| {
                    ConfigError::ValidationError(format!(
                        "source {}: invalid address '{}' for endpoint {}: {}",
                        self.name, endpoint.address, endpoint.name, reason
                    ))
                })?;
            }
        }

        if self.tuning.max_open == 0 {
            return Err(ConfigError::ValidationError(format!(
                "source {}: max_open must be greater than 0",
                self.name
            )));
        }

        if self.tuning.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(format!(
                "source {}: connect_timeout_ms must be greater than 0",
                self.name
            )));
        }

        Ok(())
    }
}

/// host:port with a non-empty host and a numeric port
fn validate_address(address: &str) -> Result<(), &'static str> {
    let (host, port) = address.rsplit_once(':').ok_or("must be host:port")?;
    if host.trim().is_empty() {
        return Err("host is empty");
    }
    port.parse::<u16>().map_err(|_| "port is not a number")?;
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            sources: vec![SourceConfig {
                name: "main".to_string(),
                kind: StoreKind::Relational,
                pooler: PoolerKind::Random,
                tuning: TuningConfig::default(),
                read: Vec::new(),
                write: vec![EndpointConfig {
                    name: "main_write".to_string(),
                    address: "127.0.0.1:3306".to_string(),
                    username: None,
                    password: None,
                    database: None,
                }],
                shadow_read: Vec::new(),
                shadow_write: Vec::new(),
                default: Vec::new(),
                shadow: Vec::new(),
                gray: Vec::new(),
            }],
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one source is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate source name: {}",
                    source.name
                )));
            }
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.as_str() {
            "json" | "text" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }

    /// Look up a source by name
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Create example configuration file
    pub fn create_example_config<P: AsRef<Path>>(path: P, kind: &str) -> Result<(), ConfigError> {
        let endpoint = |name: &str, address: &str| EndpointConfig {
            name: name.to_string(),
            address: address.to_string(),
            username: None,
            password: None,
            database: None,
        };

        let source = match kind {
            "relational" => SourceConfig {
                name: "orders".to_string(),
                kind: StoreKind::Relational,
                pooler: PoolerKind::Random,
                tuning: TuningConfig::default(),
                read: vec![
                    endpoint("orders_read_1", "10.0.1.10:3306"),
                    endpoint("orders_read_2", "10.0.1.11:3306"),
                ],
                write: vec![endpoint("orders_write", "10.0.1.12:3306")],
                shadow_read: Vec::new(),
                shadow_write: vec![endpoint("orders_shadow", "10.0.2.12:3306")],
                default: Vec::new(),
                shadow: Vec::new(),
                gray: Vec::new(),
            },
            "cache" => SourceConfig {
                name: "sessions".to_string(),
                kind: StoreKind::Cache,
                pooler: PoolerKind::RoundRobin,
                tuning: TuningConfig {
                    lifetime_window_sec: 240,
                    ..TuningConfig::default()
                },
                read: Vec::new(),
                write: Vec::new(),
                shadow_read: Vec::new(),
                shadow_write: Vec::new(),
                default: vec![
                    endpoint("sessions_1", "10.0.1.20:6379"),
                    endpoint("sessions_2", "10.0.1.21:6379"),
                ],
                shadow: vec![endpoint("sessions_shadow", "10.0.2.20:6379")],
                gray: vec![endpoint("sessions_gray", "10.0.3.20:6379")],
            },
            _ => {
                return Err(ConfigError::ValidationError(
                    "Kind must be 'relational' or 'cache'".to_string(),
                ))
            }
        };

        let config = Config {
            logging: LoggingConfig::default(),
            sources: vec![source],
        };
        config.save_to_file(path)
    }
}
