//! Tracker configuration.
//!
//! The configuration file is TOML. Every section is optional and falls back
//! to its defaults. [`Config::resolve`] turns the raw strings into typed
//! [`Settings`], collecting every problem it finds along the way.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, PrimitiveDateTime, UtcOffset};

use tracker_core::geo::{KM_TO_MILES, METRE_TO_FEET, MPS_TO_MPH};
use tracker_store::Dsn;

/// Tracker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Tracking-service settings.
    pub source: SourceConfig,
    /// Start date and day boundaries.
    pub tracking: TrackingConfig,
    /// Ingestion run settings.
    pub ingest: IngestConfig,
    /// Unit conversion factors.
    pub units: UnitsConfig,
    /// KML export settings.
    pub export: ExportConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// ```
    /// use tracker_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolve().map(|_| ())
    }

    /// Parse every section into typed settings.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let mut errors = Vec::new();

        let dsn = self.storage.resolve(&mut errors);
        errors.extend(self.source.validate());
        let tracking = self.tracking.resolve(&mut errors);
        errors.extend(self.ingest.validate());
        errors.extend(self.units.validate());
        errors.extend(self.export.validate());

        match (dsn, tracking) {
            (Some(dsn), Some((utc_offset, start_timestamp))) if errors.is_empty() => Ok(Settings {
                dsn,
                start_timestamp,
                utc_offset,
                batch_size: self.source.batch_size,
                lock: LockSettings {
                    name: self.ingest.lock_name.clone(),
                    timeout: Duration::from_secs(self.ingest.lock_timeout_secs),
                    lease: Duration::from_secs(self.ingest.lock_lease_secs),
                },
                run_interval: Duration::from_secs(self.ingest.interval_secs),
                units: self.units.clone(),
                export_dir: self.export.dir.clone(),
            }),
            _ => Err(ConfigError::Validation(errors)),
        }
    }

    /// Load, validate and resolve configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
        Self::load(path)?.resolve()
    }
}

/// Typed settings derived from a valid [`Config`].
#[derive(Debug, Clone)]
pub struct Settings {
    /// Store connection descriptor.
    pub dsn: Dsn,
    /// Unix timestamp before which nothing is ingested.
    pub start_timestamp: i64,
    /// Offset in which day tags and "today" are computed.
    pub utc_offset: UtcOffset,
    /// Maximum samples fetched per run.
    pub batch_size: u32,
    /// Named lock serializing ingestion runs.
    pub lock: LockSettings,
    /// Pause between scheduled runs.
    pub run_interval: Duration,
    /// Unit conversion factors.
    pub units: UnitsConfig,
    /// Directory KML files are written to.
    pub export_dir: PathBuf,
}

/// Named lock settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSettings {
    pub name: String,
    pub timeout: Duration,
    pub lease: Duration,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Store DSN, `host[:port]|user|password|database`.
    pub dsn: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dsn: format!(
                "localhost|tracker||{}",
                tracker_store::default_db_path().display()
            ),
        }
    }
}

impl StorageConfig {
    fn resolve(&self, errors: &mut Vec<ValidationError>) -> Option<Dsn> {
        if self.dsn.trim().is_empty() {
            errors.push(ValidationError {
                field: "storage.dsn".to_string(),
                message: "DSN cannot be empty".to_string(),
            });
            return None;
        }

        match self.dsn.parse::<Dsn>() {
            Ok(dsn) => Some(dsn),
            Err(e) => {
                errors.push(ValidationError {
                    field: "storage.dsn".to_string(),
                    message: e.to_string(),
                });
                None
            }
        }
    }
}

/// Tracking-service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Service endpoint.
    pub base_url: String,
    /// API key of the tracked account.
    pub api_key: String,
    /// Maximum samples requested per run.
    pub batch_size: u32,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
}

/// Largest batch the service hands out per request.
pub const MAX_BATCH_SIZE: u32 = 1000;
/// Smallest batch accepted.
///
/// A run resumes at the newest stored timestamp inclusively, so each batch
/// starts with the newest stored fix of every device that reported in that
/// second. With up to two tracked devices a batch needs one more row than
/// that to get past them.
pub const MIN_BATCH_SIZE: u32 = 3;

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://www.instamapper.com/api".to_string(),
            api_key: String::new(),
            batch_size: 10,
            timeout_secs: 10,
        }
    }
}

impl SourceConfig {
    /// Validate tracking-service configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            errors.push(ValidationError {
                field: "source.base_url".to_string(),
                message: format!(
                    "invalid URL '{}': must start with http:// or https://",
                    self.base_url
                ),
            });
        }

        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            errors.push(ValidationError {
                field: "source.batch_size".to_string(),
                message: format!(
                    "batch size {} out of range ({}-{})",
                    self.batch_size, MIN_BATCH_SIZE, MAX_BATCH_SIZE
                ),
            });
        }

        if self.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "source.timeout_secs".to_string(),
                message: "timeout must be at least 1 second".to_string(),
            });
        }

        errors
    }
}

/// Start date and day-boundary configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// First moment that counts, `YYYY-MM-DD` or `YYYY-MM-DD HH:MM`.
    pub start_date: String,
    /// Offset of the day boundary, e.g. `+00:00` or `-05:00`.
    pub utc_offset: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            start_date: "2011-08-24 15:00".to_string(),
            utc_offset: "+00:00".to_string(),
        }
    }
}

impl TrackingConfig {
    fn resolve(&self, errors: &mut Vec<ValidationError>) -> Option<(UtcOffset, i64)> {
        let offset = match parse_utc_offset(&self.utc_offset) {
            Some(offset) => offset,
            None => {
                errors.push(ValidationError {
                    field: "tracking.utc_offset".to_string(),
                    message: format!(
                        "invalid offset '{}': expected '+HH:MM' or '-HH:MM'",
                        self.utc_offset
                    ),
                });
                return None;
            }
        };

        match parse_start_date(&self.start_date, offset) {
            Some(start) => Some((offset, start)),
            None => {
                errors.push(ValidationError {
                    field: "tracking.start_date".to_string(),
                    message: format!(
                        "invalid date '{}': expected 'YYYY-MM-DD' or 'YYYY-MM-DD HH:MM'",
                        self.start_date
                    ),
                });
                None
            }
        }
    }
}

/// Parse a `+HH:MM` offset. `Z` and `UTC` are accepted for zero.
pub fn parse_utc_offset(s: &str) -> Option<UtcOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("utc") || s == "Z" {
        return Some(UtcOffset::UTC);
    }
    UtcOffset::parse(s, format_description!("[offset_hour sign:mandatory]:[offset_minute]")).ok()
}

/// Unix timestamp of a start date read in `offset`.
pub fn parse_start_date(s: &str, offset: UtcOffset) -> Option<i64> {
    let s = s.trim();
    let local = PrimitiveDateTime::parse(s, format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .or_else(|_| {
            Date::parse(s, format_description!("[year]-[month]-[day]")).map(Date::midnight)
        })
        .ok()?;
    Some(local.assume_offset(offset).unix_timestamp())
}

/// Ingestion run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Name of the lock serializing runs.
    pub lock_name: String,
    /// Seconds the store may block while granting the lock.
    pub lock_timeout_secs: u64,
    /// Seconds a lock outlives a holder that stops renewing it.
    pub lock_lease_secs: u64,
    /// Seconds between runs for `run`.
    pub interval_secs: u64,
}

/// Longest lock wait accepted (5 minutes).
pub const MAX_LOCK_TIMEOUT: u64 = 300;
/// Minimum interval between scheduled runs in seconds.
pub const MIN_RUN_INTERVAL: u64 = 10;

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            lock_name: "ingestion".to_string(),
            lock_timeout_secs: 10,
            lock_lease_secs: 30,
            interval_secs: 60,
        }
    }
}

impl IngestConfig {
    /// Validate ingestion configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.lock_name.trim().is_empty() {
            errors.push(ValidationError {
                field: "ingest.lock_name".to_string(),
                message: "lock name cannot be empty".to_string(),
            });
        }

        if self.lock_timeout_secs > MAX_LOCK_TIMEOUT {
            errors.push(ValidationError {
                field: "ingest.lock_timeout_secs".to_string(),
                message: format!(
                    "lock timeout {} is too long (maximum {} seconds)",
                    self.lock_timeout_secs, MAX_LOCK_TIMEOUT
                ),
            });
        }

        if self.lock_lease_secs <= self.lock_timeout_secs {
            errors.push(ValidationError {
                field: "ingest.lock_lease_secs".to_string(),
                message: format!(
                    "lock lease {} must be longer than the lock timeout ({})",
                    self.lock_lease_secs, self.lock_timeout_secs
                ),
            });
        }

        if self.interval_secs < MIN_RUN_INTERVAL {
            errors.push(ValidationError {
                field: "ingest.interval_secs".to_string(),
                message: format!(
                    "interval {} is too short (minimum {} seconds)",
                    self.interval_secs, MIN_RUN_INTERVAL
                ),
            });
        }

        errors
    }
}

/// Unit conversion factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitsConfig {
    pub km_to_miles: f64,
    pub metre_to_feet: f64,
    pub mps_to_mph: f64,
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self {
            km_to_miles: KM_TO_MILES,
            metre_to_feet: METRE_TO_FEET,
            mps_to_mph: MPS_TO_MPH,
        }
    }
}

impl UnitsConfig {
    /// Validate conversion factors.
    pub fn validate(&self) -> Vec<ValidationError> {
        [
            ("units.km_to_miles", self.km_to_miles),
            ("units.metre_to_feet", self.metre_to_feet),
            ("units.mps_to_mph", self.mps_to_mph),
        ]
        .into_iter()
        .filter(|(_, factor)| !(factor.is_finite() && *factor > 0.0))
        .map(|(field, factor)| ValidationError {
            field: field.to_string(),
            message: format!("conversion factor {} must be a positive number", factor),
        })
        .collect()
    }
}

/// KML export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory `<tag>.kml` files are written to.
    pub dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("gps-tracker")
                .join("kml"),
        }
    }
}

impl ExportConfig {
    /// Validate export configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.dir.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "export.dir".to_string(),
                message: "export directory cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `storage.dsn` or `units.km_to_miles`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gps-tracker")
        .join("tracker.toml")
}
