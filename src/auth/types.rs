//! Token types and storage

use crate::config::ClientCredentials;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Tokens expiring within this many seconds are refreshed before use
pub const REFRESH_MARGIN_SECS: i64 = 120;

/// Expiry timestamps above this are taken to be in milliseconds
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Expiry as unix seconds, accepting millisecond timestamps
pub fn normalize_expiry(expires_at: i64) -> i64 {
    if expires_at > MILLIS_THRESHOLD {
        expires_at / 1000
    } else {
        expires_at
    }
}

/// Stored OAuth2 token set
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer token
    pub access_token: String,
    /// Token used to obtain the next access token
    pub refresh_token: String,
    /// Expiry in unix seconds
    pub expires_at: i64,
}

impl TokenSet {
    /// Create a token set, normalising the expiry to seconds
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: normalize_expiry(expires_at),
        }
    }

    /// Whether the token must be refreshed at `now` (unix seconds)
    pub fn needs_refresh(&self, now: i64) -> bool {
        self.expires_at - now < REFRESH_MARGIN_SECS
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

impl TokenResponse {
    /// Token set issued at `now`, keeping `previous_refresh` when the
    /// endpoint does not rotate the refresh token
    pub fn into_token_set(self, previous_refresh: Option<&str>, now: i64) -> Result<TokenSet> {
        let refresh_token = self
            .refresh_token
            .or_else(|| previous_refresh.map(str::to_string))
            .ok_or_else(|| Error::auth("token response has no refresh_token"))?;
        Ok(TokenSet::new(
            self.access_token,
            refresh_token,
            now + self.expires_in,
        ))
    }
}

/// OAuth2 client configuration
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    /// Token endpoint
    pub token_url: String,
    /// Client credentials sent as HTTP Basic auth
    pub credentials: ClientCredentials,
}

impl OAuth2Config {
    /// Create a config
    pub fn new(token_url: impl Into<String>, credentials: ClientCredentials) -> Self {
        Self {
            token_url: token_url.into(),
            credentials,
        }
    }
}

/// Persistence of the single current token set
pub trait TokenStore: Send + Sync {
    /// Current token set, if one was ever saved
    fn load(&self) -> Result<Option<TokenSet>>;

    /// Replace the current token set
    fn save(&self, tokens: &TokenSet) -> Result<()>;
}

/// Token store kept in memory
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Option<TokenSet>>,
}

impl MemoryTokenStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `tokens`
    pub fn with_tokens(tokens: TokenSet) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<TokenSet>> {
        self.tokens
            .read()
            .map(|t| t.clone())
            .map_err(|_| Error::state("token store lock poisoned"))
    }

    fn save(&self, tokens: &TokenSet) -> Result<()> {
        let mut guard = self
            .tokens
            .write()
            .map_err(|_| Error::state("token store lock poisoned"))?;
        *guard = Some(tokens.clone());
        Ok(())
    }
}
