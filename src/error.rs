//! Error types for stagesync
//!
//! Two classes of failure exist:
//!
//! - [`Error`] is run-level. Anything surfacing as an `Error` aborts the
//!   current entity run, marks the run record as `error` and leaves the
//!   watermark untouched.
//! - [`ItemError`] is item-level. It describes why a single upstream record
//!   could not be fetched or mapped; it is written to the failure ledger and
//!   the crawl continues.

use thiserror::Error;

/// The main (run-level) error type
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Unknown entity: {entity}")]
    UnknownEntity { entity: String },

    #[error("Invalid extraction window: {message}")]
    Window { message: String },

    // ============================================================================
    // Authentication Errors
    // ============================================================================
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Token refresh failed: {message}")]
    TokenRefresh { message: String },

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Rate limited after retry (backoff {backoff_ms}ms)")]
    RateLimited { backoff_ms: u64 },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Storage Errors
    // ============================================================================
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("State error: {message}")]
    State { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a token refresh error
    pub fn token_refresh(message: impl Into<String>) -> Self {
        Self::TokenRefresh {
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Create a window error
    pub fn window(message: impl Into<String>) -> Self {
        Self::Window {
            message: message.into(),
        }
    }

    /// Create an unknown entity error
    pub fn unknown_entity(entity: impl Into<String>) -> Self {
        Self::UnknownEntity {
            entity: entity.into(),
        }
    }

    /// HTTP status code carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            Error::RateLimited { .. } => Some(429),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the upstream answered 404
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Whether this error aborts the run even when raised for a single item
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Error::Auth { .. }
                | Error::TokenRefresh { .. }
                | Error::Config { .. }
                | Error::MissingConfigField { .. }
                | Error::InvalidConfigValue { .. }
                | Error::Storage { .. }
                | Error::Database(_)
                | Error::State { .. }
        )
    }
}

/// Result type alias for stagesync
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}

// ============================================================================
// Item-level errors
// ============================================================================

/// Why a single upstream item could not be loaded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    /// Detail endpoint answered 404
    #[error("not found upstream")]
    NotFound,

    /// Detail endpoint answered without a usable body
    #[error("empty or missing payload")]
    EmptyPayload,

    /// Transport or HTTP failure while fetching the detail
    #[error("fetch failed: {message}")]
    Fetch { message: String },

    /// Payload did not have the expected shape
    #[error("malformed payload: {message}")]
    Malformed { message: String },

    /// Payload was well-formed but could not be mapped
    #[error("mapping failed: {message}")]
    Mapping { message: String },
}

impl ItemError {
    /// Create a malformed payload error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create a mapping error
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping {
            message: message.into(),
        }
    }
}

impl From<&Error> for ItemError {
    fn from(err: &Error) -> Self {
        if err.is_not_found() {
            ItemError::NotFound
        } else {
            ItemError::Fetch {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for ItemError {
    fn from(err: serde_json::Error) -> Self {
        ItemError::malformed(err.to_string())
    }
}
