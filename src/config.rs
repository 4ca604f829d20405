//! Settings file and immutable load options
//!
//! The YAML settings file (`stagesync.yaml`) holds everything that is not a
//! secret. Client credentials always come from the environment. Once loaded,
//! [`Settings::load_options`] produces the [`LoadOptions`] value handed to the
//! run controller; nothing reads configuration after that point.

use crate::error::{Error, Result};
use crate::types::{LoadMode, OptionStringExt};
use crate::window::{midnight, ExtractionWindow};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use url::Url;

/// Environment variable holding the OAuth2 client id
pub const ENV_CLIENT_ID: &str = "STAGESYNC_CLIENT_ID";

/// Environment variable holding the OAuth2 client secret
pub const ENV_CLIENT_SECRET: &str = "STAGESYNC_CLIENT_SECRET";

/// Environment variable overriding `api.token_url`
pub const ENV_TOKEN_URL: &str = "STAGESYNC_TOKEN_URL";

/// Environment variable overriding `database.path`
pub const ENV_DATABASE: &str = "STAGESYNC_DATABASE";

/// Settings file looked up when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "stagesync.yaml";

const DEFAULT_BASE_URL: &str = "https://api.bling.com.br/Api/v3/";
const DEFAULT_TOKEN_URL: &str = "https://www.bling.com.br/Api/v3/oauth/token";

// ============================================================================
// Settings File
// ============================================================================

/// Complete settings loaded from YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Upstream API access
    #[serde(default)]
    pub api: ApiSettings,

    /// Window and mode configuration
    #[serde(default)]
    pub load: LoadSettings,

    /// Which entities run and their sizing overrides
    #[serde(default)]
    pub entities: EntitySettings,

    /// Staging database
    #[serde(default)]
    pub database: DatabaseSettings,
}

/// Upstream API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL every endpoint path is joined onto
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// OAuth2 token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Minimum spacing between consecutive upstream calls
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,

    /// Sleep before the single retry of a rate-limited call
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_url: default_token_url(),
            timeout_secs: default_timeout_secs(),
            min_request_interval_ms: default_min_request_interval_ms(),
            rate_limit_backoff_ms: default_rate_limit_backoff_ms(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_min_request_interval_ms() -> u64 {
    350
}

fn default_rate_limit_backoff_ms() -> u64 {
    2000
}

/// Window and mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSettings {
    /// Default load mode for every entity
    #[serde(default)]
    pub mode: LoadMode,

    /// Days subtracted from the watermark
    #[serde(default = "default_margin_days")]
    pub margin_days: u32,

    /// Minutes subtracted from "now" for the window end
    #[serde(default)]
    pub drift_minutes: u32,

    /// Historical range re-imported by full loads
    #[serde(default)]
    pub full_bounds: FullBounds,

    /// Start of history for entities that were never loaded
    #[serde(default = "default_epoch")]
    pub initial_epoch: NaiveDate,

    /// Consecutive empty pages that end a crawl
    #[serde(default = "default_empty_page_tolerance")]
    pub empty_page_tolerance: u32,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            mode: LoadMode::default(),
            margin_days: default_margin_days(),
            drift_minutes: 0,
            full_bounds: FullBounds::default(),
            initial_epoch: default_epoch(),
            empty_page_tolerance: default_empty_page_tolerance(),
        }
    }
}

fn default_margin_days() -> u32 {
    2
}

fn default_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default()
}

fn default_empty_page_tolerance() -> u32 {
    1
}

/// Configured full-load range; an open end means "today"
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FullBounds {
    /// First day re-imported
    #[serde(default = "default_epoch")]
    pub start: NaiveDate,

    /// Last day re-imported
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl Default for FullBounds {
    fn default() -> Self {
        Self {
            start: default_epoch(),
            end: None,
        }
    }
}

/// Entity selection and sizing overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitySettings {
    /// Entities to run, in order; empty means the whole catalog
    #[serde(default)]
    pub enabled: Vec<String>,

    /// Per-entity overrides keyed by entity name
    #[serde(default)]
    pub overrides: HashMap<String, EntityOverride>,
}

/// Sizing and mode overrides for one entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityOverride {
    /// Listing page size
    #[serde(default)]
    pub page_size: Option<u32>,

    /// Buffer flush threshold
    #[serde(default)]
    pub batch_size: Option<u32>,

    /// Force a mode for this entity
    #[serde(default)]
    pub mode: Option<LoadMode>,
}

/// Staging database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// DuckDB file path (`:memory:` for a throwaway database)
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "stagesync.duckdb".to_string()
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::config(format!(
                    "Failed to read settings file '{}': {}",
                    path.display(),
                    e
                ))
            }
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse settings from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(yaml)?;
        Ok(settings)
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides using `lookup` to read variables
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(token_url) = lookup(ENV_TOKEN_URL).none_if_empty() {
            self.api.token_url = token_url;
        }
        if let Some(path) = lookup(ENV_DATABASE).none_if_empty() {
            self.database.path = path;
        }
        self
    }

    /// Validate everything that can be checked without touching the network
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        Url::parse(&self.api.token_url)
            .map_err(|e| Error::invalid_value("api.token_url", e.to_string()))?;

        if self.api.timeout_secs == 0 {
            return Err(Error::invalid_value(
                "api.timeout_secs",
                "must be greater than zero",
            ));
        }

        if let Some(end) = self.load.full_bounds.end {
            if self.load.full_bounds.start > end {
                return Err(Error::invalid_value(
                    "load.full_bounds",
                    format!("start {} is after end {}", self.load.full_bounds.start, end),
                ));
            }
        }

        if self.load.empty_page_tolerance == 0 {
            return Err(Error::invalid_value(
                "load.empty_page_tolerance",
                "must be at least 1",
            ));
        }

        for (entity, overrides) in &self.entities.overrides {
            if overrides.page_size == Some(0) {
                return Err(Error::invalid_value(
                    format!("entities.overrides.{entity}.page_size"),
                    "must be greater than zero",
                ));
            }
            if overrides.batch_size == Some(0) {
                return Err(Error::invalid_value(
                    format!("entities.overrides.{entity}.batch_size"),
                    "must be greater than zero",
                ));
            }
        }

        if self.database.path.trim().is_empty() {
            return Err(Error::missing_field("database.path"));
        }

        Ok(())
    }

    /// Base URL with a trailing slash so relative paths join underneath it
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.api.base_url.trim().to_string();
        if raw.is_empty() {
            return Err(Error::missing_field("api.base_url"));
        }
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|e| Error::invalid_value("api.base_url", e.to_string()))
    }

    /// Freeze the load section into run-time options.
    ///
    /// An open full-bounds end resolves to `now`.
    pub fn load_options(&self, now: NaiveDateTime) -> Result<LoadOptions> {
        let end = self
            .load
            .full_bounds
            .end
            .map(midnight)
            .unwrap_or(now);
        let full_bounds = ExtractionWindow::new(midnight(self.load.full_bounds.start), end)
            .map_err(|e| Error::invalid_value("load.full_bounds", e.to_string()))?;

        Ok(LoadOptions {
            mode: self.load.mode,
            margin_days: self.load.margin_days,
            drift_minutes: self.load.drift_minutes,
            full_bounds,
            initial_epoch: midnight(self.load.initial_epoch),
            empty_page_tolerance: self.load.empty_page_tolerance.max(1),
        })
    }

    /// Override for `entity`, if any
    pub fn entity_override(&self, entity: &str) -> Option<&EntityOverride> {
        self.entities.overrides.get(entity)
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// OAuth2 client credentials
#[derive(Clone)]
pub struct ClientCredentials {
    /// Client id
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

impl ClientCredentials {
    /// Read credentials from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials using `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let client_id = lookup(ENV_CLIENT_ID)
            .none_if_empty()
            .ok_or_else(|| Error::missing_field(ENV_CLIENT_ID))?;
        let client_secret = lookup(ENV_CLIENT_SECRET)
            .none_if_empty()
            .ok_or_else(|| Error::missing_field(ENV_CLIENT_SECRET))?;
        Ok(Self {
            client_id,
            client_secret,
        })
    }
}

// ============================================================================
// Load Options
// ============================================================================

/// Immutable options passed to the run controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Default mode
    pub mode: LoadMode,
    /// Safety margin in days
    pub margin_days: u32,
    /// Drift cutoff in minutes
    pub drift_minutes: u32,
    /// Range used by full loads
    pub full_bounds: ExtractionWindow,
    /// Start of history for never-loaded entities
    pub initial_epoch: NaiveDateTime,
    /// Consecutive empty pages that end a crawl
    pub empty_page_tolerance: u32,
}

impl LoadOptions {
    /// Options with default margin, drift, epoch and tolerance
    pub fn new(mode: LoadMode, full_bounds: ExtractionWindow) -> Self {
        Self {
            mode,
            margin_days: default_margin_days(),
            drift_minutes: 0,
            full_bounds,
            initial_epoch: midnight(default_epoch()),
            empty_page_tolerance: default_empty_page_tolerance(),
        }
    }

    /// Set the mode
    pub fn with_mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the safety margin
    pub fn with_margin_days(mut self, margin_days: u32) -> Self {
        self.margin_days = margin_days;
        self
    }

    /// Set the drift cutoff
    pub fn with_drift_minutes(mut self, drift_minutes: u32) -> Self {
        self.drift_minutes = drift_minutes;
        self
    }

    /// Set the start of history
    pub fn with_initial_epoch(mut self, initial_epoch: NaiveDateTime) -> Self {
        self.initial_epoch = initial_epoch;
        self
    }

    /// Set the empty page tolerance (minimum 1)
    pub fn with_empty_page_tolerance(mut self, tolerance: u32) -> Self {
        self.empty_page_tolerance = tolerance.max(1);
        self
    }
}
