//! Configuration management
//!
//! Configuration is loaded from:
//! - config.yml file
//! - Environment variables prefixed with `BECORE_` (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Token issuing configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Upload configuration
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:5000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/becore.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend (memory or s3)
    #[serde(default)]
    pub driver: StorageDriver,
    /// Bucket holding every object
    #[serde(default)]
    pub bucket: String,
    /// Custom endpoint, e.g. a MinIO or Yandex Object Storage URL
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Address buckets as `endpoint/bucket/key` instead of virtual hosts
    #[serde(default = "default_force_path_style")]
    pub force_path_style: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            driver: StorageDriver::default(),
            bucket: String::new(),
            service_url: None,
            region: default_region(),
            access_key: String::new(),
            secret_key: String::new(),
            force_path_style: default_force_path_style(),
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_force_path_style() -> bool {
    true
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.driver == StorageDriver::S3 && self.bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.bucket is required when storage.driver is s3".to_string(),
            ));
        }
        Ok(())
    }
}

/// Object storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageDriver {
    /// Process-local store (default, for development and tests)
    #[default]
    Memory,
    /// S3-compatible object storage
    S3,
}

/// Bearer token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
    /// Token lifetime in hours (default: 24)
    #[serde(default = "default_token_lifetime_hours")]
    pub token_lifetime_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            issuer: default_issuer(),
            audience: default_audience(),
            token_lifetime_hours: default_token_lifetime_hours(),
        }
    }
}

/// Minimum accepted length of the signing secret in bytes
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Longest accepted token lifetime: one year
pub const MAX_TOKEN_LIFETIME_HOURS: i64 = 24 * 365;

fn default_jwt_secret() -> String {
    "change-me-becore-development-signing-secret".to_string()
}

fn default_issuer() -> String {
    "becore-api".to_string()
}

fn default_audience() -> String {
    "becore-client".to_string()
}

fn default_token_lifetime_hours() -> i64 {
    24
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::ValidationError(format!(
                "auth.jwt_secret must be at least {} bytes",
                MIN_JWT_SECRET_LEN
            )));
        }
        if !(1..=MAX_TOKEN_LIFETIME_HOURS).contains(&self.token_lifetime_hours) {
            return Err(ConfigError::ValidationError(format!(
                "auth.token_lifetime_hours must be between 1 and {}",
                MAX_TOKEN_LIFETIME_HOURS
            )));
        }
        Ok(())
    }
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum file size in bytes (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// MIME types accepted for page icons and raw images
    #[serde(default = "default_allowed_icon_types")]
    pub allowed_icon_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_icon_types: default_allowed_icon_types(),
        }
    }
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_allowed_icon_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
    ]
}

impl UploadConfig {
    /// Check if a MIME type is accepted as an icon
    pub fn is_icon_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_icon_types.iter().any(|t| t == mime_type)
    }
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `BECORE_<SECTION>_<KEY>`, e.g.
    /// `BECORE_SERVER_PORT`, `BECORE_STORAGE_BUCKET`, `BECORE_AUTH_JWT_SECRET`.
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Check cross-field constraints that serde defaults cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.validate()?;
        self.auth.validate()?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("BECORE_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("BECORE_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("BECORE_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        // Database configuration
        if let Ok(driver) = std::env::var("BECORE_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("BECORE_DATABASE_URL") {
            self.database.url = url;
        }

        // Storage configuration
        if let Ok(driver) = std::env::var("BECORE_STORAGE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "memory" => self.storage.driver = StorageDriver::Memory,
                "s3" => self.storage.driver = StorageDriver::S3,
                _ => {}
            }
        }
        if let Ok(bucket) = std::env::var("BECORE_STORAGE_BUCKET") {
            self.storage.bucket = bucket;
        }
        if let Ok(url) = std::env::var("BECORE_STORAGE_SERVICE_URL") {
            self.storage.service_url = Some(url);
        }
        if let Ok(region) = std::env::var("BECORE_STORAGE_REGION") {
            self.storage.region = region;
        }
        if let Ok(key) = std::env::var("BECORE_STORAGE_ACCESS_KEY") {
            self.storage.access_key = key;
        }
        if let Ok(secret) = std::env::var("BECORE_STORAGE_SECRET_KEY") {
            self.storage.secret_key = secret;
        }
        if let Ok(flag) = std::env::var("BECORE_STORAGE_FORCE_PATH_STYLE") {
            if let Ok(flag) = flag.parse::<bool>() {
                self.storage.force_path_style = flag;
            }
        }

        // Auth configuration
        if let Ok(secret) = std::env::var("BECORE_AUTH_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(issuer) = std::env::var("BECORE_AUTH_ISSUER") {
            self.auth.issuer = issuer;
        }
        if let Ok(audience) = std::env::var("BECORE_AUTH_AUDIENCE") {
            self.auth.audience = audience;
        }
        if let Ok(hours) = std::env::var("BECORE_AUTH_TOKEN_LIFETIME_HOURS") {
            if let Ok(hours) = hours.parse::<i64>() {
                self.auth.token_lifetime_hours = hours;
            }
        }

        // Upload configuration
        if let Ok(size) = std::env::var("BECORE_UPLOAD_MAX_FILE_SIZE") {
            if let Ok(size) = size.parse::<u64>() {
                self.upload.max_file_size = size;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
