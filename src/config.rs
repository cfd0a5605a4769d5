use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::env;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::schema::FeatureSchema;
use crate::utils::serde_named;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Database dialect of a provider
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Dialect {
    #[default]
    Pgis,
    Gpkg,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Pgis => write!(f, "PGIS"),
            Dialect::Gpkg => write!(f, "GPKG"),
        }
    }
}

/// Connection pool settings
#[derive(Clone, Debug, Validate, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolSettings {
    /// Maximum number of connections, `-1` means computed from the schema
    #[validate(range(min = -1, message = "maxConnections must be -1 or positive"))]
    pub max_connections: i32,

    /// Minimum number of connections, defaults to `max_connections`
    pub min_connections: Option<i32>,

    #[validate(custom(function = "validate_duration"))]
    pub idle_timeout: String,

    pub init_fail_fast: bool,

    /// Whether the pool may be shared with other providers
    pub shared: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: -1,
            min_connections: None,
            idle_timeout: "10m".to_string(),
            init_fail_fast: true,
            shared: false,
        }
    }
}

impl PoolSettings {
    pub fn effective_min_connections(&self) -> i32 {
        self.min_connections.unwrap_or(self.max_connections)
    }
}

/// Statements executed by mutations, `{{id}}` is replaced with the feature id
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Triggers {
    pub on_delete: Vec<String>,
}

impl Triggers {
    pub fn on_delete_for(&self, id: &str) -> Vec<String> {
        self.on_delete
            .iter()
            .map(|statement| statement.replace("{{id}}", id))
            .collect()
    }
}

/// Connection info of a SQL feature provider
#[derive(Clone, Debug, Validate, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    #[serde(default)]
    pub dialect: Dialect,

    /// Database name, or file path for GeoPackage
    #[validate(length(min = 1, message = "database cannot be empty"))]
    pub database: String,

    /// Host with optional `:port`
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    /// Base64 encoded password
    #[serde(default)]
    pub password: Option<String>,

    /// Additional schemas besides the default one
    #[serde(default)]
    pub schemas: Vec<String>,

    #[serde(default)]
    #[validate(nested)]
    pub pool: PoolSettings,

    /// Options passed through to the driver
    #[serde(default)]
    pub driver_options: BTreeMap<String, String>,

    #[serde(default)]
    pub triggers: Triggers,
}

impl ConnectionInfo {
    pub fn new(dialect: Dialect, database: &str) -> Self {
        Self {
            dialect,
            database: database.to_string(),
            host: None,
            user: None,
            password: None,
            schemas: vec![],
            pool: PoolSettings::default(),
            driver_options: BTreeMap::new(),
            triggers: Triggers::default(),
        }
    }

    /// Decode the base64 password
    pub fn decoded_password(&self) -> Result<Option<String>, ConfigError> {
        let Some(encoded) = &self.password else {
            return Ok(None);
        };

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ConfigError::Parse {
                field: "password".to_string(),
                value: "<redacted>".to_string(),
                source: Box::new(e),
            })?;

        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| ConfigError::Parse {
                field: "password".to_string(),
                value: "<redacted>".to_string(),
                source: Box::new(e),
            })
    }

    /// Split `host` into host name and optional port
    pub fn host_and_port(&self) -> Result<Option<(String, Option<u16>)>, ConfigError> {
        let Some(host) = &self.host else {
            return Ok(None);
        };

        match host.rsplit_once(':') {
            Some((name, port)) => {
                let port = port.parse::<u16>().map_err(|e| ConfigError::Parse {
                    field: "host".to_string(),
                    value: host.clone(),
                    source: Box::new(e),
                })?;
                Ok(Some((name.to_string(), Some(port))))
            }
            None => Ok(Some((host.clone(), None))),
        }
    }

    /// Identifies the dataset behind this connection, used as the shared pool key
    pub fn dataset_identifier(&self) -> String {
        match &self.host {
            Some(host) => format!("{}/{}", host, self.database),
            None => self.database.clone(),
        }
    }

    /// Resolve `maxConnections=-1` against the number of queries per feature type
    pub fn with_effective_pool(&self, max_queries: usize, parallelism: usize) -> Self {
        let mut info = self.clone();
        if info.pool.max_connections <= 0 {
            info.pool.max_connections = (max_queries * parallelism) as i32;
        }
        info
    }

    /// Apply `FEATURESTORE_SQL_*` environment overrides
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = env::var("FEATURESTORE_SQL_HOST") {
            self.host = Some(host);
        }
        if let Ok(database) = env::var("FEATURESTORE_SQL_DATABASE") {
            self.database = database;
        }
        if let Ok(user) = env::var("FEATURESTORE_SQL_USER") {
            self.user = Some(user);
        }
        if let Ok(password) = env::var("FEATURESTORE_SQL_PASSWORD") {
            self.password = Some(password);
        }
        if env::var("FEATURESTORE_SQL_MAX_CONNECTIONS").is_ok() {
            self.pool.max_connections = parse_env_var("FEATURESTORE_SQL_MAX_CONNECTIONS", "-1")?;
        }

        self.validate()?;
        Ok(())
    }
}

/// Defaults applied to every table segment of a source path
#[derive(Clone, Debug, Validate, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SourcePathDefaults {
    #[validate(length(min = 1, message = "sortKey cannot be empty"))]
    pub sort_key: String,

    #[validate(length(min = 1, message = "primaryKey cannot be empty"))]
    pub primary_key: String,

    /// Tables matching this regex are treated as junction tables
    pub junction_table_pattern: Option<String>,

    /// Schema prefixed to tables without one
    pub schema: Option<String>,
}

impl Default for SourcePathDefaults {
    fn default() -> Self {
        Self {
            sort_key: "id".to_string(),
            primary_key: "id".to_string(),
            junction_table_pattern: Some(".+_2_.+".to_string()),
            schema: None,
        }
    }
}

#[derive(Clone, Debug, Validate, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryGeneration {
    pub compute_number_matched: bool,

    pub compute_number_skipped: bool,

    /// Collation used for accent insensitive comparisons
    pub accenti_collation: Option<String>,

    /// Maximum number of features fetched per chunk
    #[validate(range(min = 1, max = 100000, message = "chunkSize must be between 1 and 100000"))]
    pub chunk_size: u32,
}

impl Default for QueryGeneration {
    fn default() -> Self {
        Self {
            compute_number_matched: true,
            compute_number_skipped: false,
            accenti_collation: None,
            chunk_size: 1000,
        }
    }
}

/// Configuration of one SQL feature provider
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[validate(length(min = 1, message = "provider id cannot be empty"))]
    pub id: String,

    #[validate(nested)]
    pub connection_info: ConnectionInfo,

    #[serde(default)]
    #[validate(nested)]
    pub source_path_defaults: SourcePathDefaults,

    #[serde(default)]
    #[validate(nested)]
    pub query_generation: QueryGeneration,

    /// Feature types in declaration order
    #[serde(
        default,
        serialize_with = "serde_named::serialize",
        deserialize_with = "serde_named::deserialize"
    )]
    pub types: Vec<FeatureSchema>,
}

impl ProviderConfig {
    /// Create configuration from a YAML string
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content.chars().take(80).collect(),
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        Self::from_yaml_str(&content)
    }

    pub fn feature_type(&self, name: &str) -> Option<&FeatureSchema> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Stable SHA-256 hash of the serialized configuration
    pub fn content_hash(&self) -> Result<String, ConfigError> {
        let serialized = serde_json::to_vec(self).map_err(|e| ConfigError::Parse {
            field: "content_hash".to_string(),
            value: self.id.clone(),
            source: Box::new(e),
        })?;

        Ok(hex::encode(Sha256::digest(&serialized)))
    }
}

/// CLI configuration (parsed from command line arguments)
#[derive(Clone, Debug)]
pub struct CliConfig {
    pub config_file: std::path::PathBuf,
    pub feature_type: Option<String>,
    /// CQL2 text filter applied to `feature_type`
    pub filter: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

fn validate_duration(value: &str) -> Result<(), ValidationError> {
    parse_duration(value)
        .map(|_| ())
        .ok_or_else(|| ValidationError::new("invalid_duration"))
}

/// Parse durations like `500ms`, `30s`, `10m` or `1h`
pub fn parse_duration(value: &str) -> Option<std::time::Duration> {
    let value = value.trim();
    let split = value.find(|c: char| !c.is_ascii_digit())?;
    let (amount, unit) = value.split_at(split);
    let amount: u64 = amount.parse().ok()?;

    match unit {
        "ms" => Some(std::time::Duration::from_millis(amount)),
        "s" => Some(std::time::Duration::from_secs(amount)),
        "m" => Some(std::time::Duration::from_secs(amount * 60)),
        "h" => Some(std::time::Duration::from_secs(amount * 3600)),
        _ => None,
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const PROVIDER: &str = r#"
id: kitas
connectionInfo:
  dialect: PGIS
  database: kitas
  host: db.example.com:5433
  user: reader
  password: c2VjcmV0
  pool:
    maxConnections: 8
types:
  kita:
    sourcePath: /kita{sortKey=id}
    type: OBJECT
    properties:
      id:
        sourcePath: id
        type: STRING
        role: ID
      name:
        sourcePath: name
        type: STRING
"#;

    #[test]
    fn test_default_pool_settings() {
        let pool = PoolSettings::default();
        assert!(pool.validate().is_ok());
        assert_eq!(pool.max_connections, -1);
        assert_eq!(pool.effective_min_connections(), -1);
        assert!(pool.init_fail_fast);
        assert!(!pool.shared);
    }

    #[test]
    fn test_invalid_idle_timeout() {
        let pool = PoolSettings {
            idle_timeout: "ten minutes".to_string(),
            ..Default::default()
        };
        assert!(pool.validate().is_err());
    }

    #[test]
    fn test_invalid_max_connections() {
        let pool = PoolSettings {
            max_connections: -5,
            ..Default::default()
        };
        assert!(pool.validate().is_err());
    }

    #[test]
    fn test_provider_from_yaml() {
        let config = ProviderConfig::from_yaml_str(PROVIDER).unwrap();
        assert_eq!(config.id, "kitas");
        assert_eq!(config.connection_info.dialect, Dialect::Pgis);
        assert_eq!(config.connection_info.pool.max_connections, 8);
        assert_eq!(config.connection_info.pool.effective_min_connections(), 8);
        assert_eq!(config.source_path_defaults.sort_key, "id");
        assert!(config.query_generation.compute_number_matched);
        assert_eq!(config.types.len(), 1);
        assert_eq!(config.types[0].name, "kita");
        assert_eq!(config.types[0].properties[0].name, "id");
        assert_eq!(config.types[0].properties[1].name, "name");
    }

    #[test]
    fn test_password_and_host() {
        let config = ProviderConfig::from_yaml_str(PROVIDER).unwrap();
        let info = &config.connection_info;
        assert_eq!(info.decoded_password().unwrap().as_deref(), Some("secret"));
        assert_eq!(
            info.host_and_port().unwrap(),
            Some(("db.example.com".to_string(), Some(5433)))
        );
        assert_eq!(info.dataset_identifier(), "db.example.com:5433/kitas");
    }

    #[test]
    fn test_dynamic_max_connections() {
        let info = ConnectionInfo::new(Dialect::Gpkg, "data.gpkg");
        let effective = info.with_effective_pool(3, 4);
        assert_eq!(effective.pool.max_connections, 12);
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = ProviderConfig::from_yaml_str(PROVIDER).unwrap();
        let b = ProviderConfig::from_yaml_str(PROVIDER).unwrap();
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());

        let mut c = b.clone();
        c.query_generation.compute_number_matched = false;
        assert_ne!(a.content_hash().unwrap(), c.content_hash().unwrap());
    }

    #[test]
    fn test_delete_triggers() {
        let triggers = Triggers {
            on_delete: vec!["DELETE FROM audit WHERE kita_id={{id}}".to_string()],
        };
        assert_eq!(
            triggers.on_delete_for("42"),
            vec!["DELETE FROM audit WHERE kita_id=42".to_string()]
        );
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Some(std::time::Duration::from_secs(30)));
        assert_eq!(parse_duration("10m"), Some(std::time::Duration::from_secs(600)));
        assert_eq!(parse_duration("m"), None);
        assert_eq!(parse_duration("5d"), None);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        let mut info = ConnectionInfo::new(Dialect::Pgis, "kitas");
        env::set_var("FEATURESTORE_SQL_HOST", "localhost:5432");
        env::set_var("FEATURESTORE_SQL_MAX_CONNECTIONS", "16");
        let result = info.apply_env();
        env::remove_var("FEATURESTORE_SQL_HOST");
        env::remove_var("FEATURESTORE_SQL_MAX_CONNECTIONS");
        assert!(result.is_ok());
        assert_eq!(info.host.as_deref(), Some("localhost:5432"));
        assert_eq!(info.pool.max_connections, 16);
    }
}
