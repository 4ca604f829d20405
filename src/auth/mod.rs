//! Credential provider
//!
//! The upstream API takes a short-lived bearer token obtained through the
//! OAuth2 refresh-token flow. `Authenticator` loads the token set from a
//! [`TokenStore`], refreshes it shortly before it expires, persists the new
//! set and caches it in memory for the rest of the process.

mod authenticator;
mod types;

pub use authenticator::{Authenticator, CredentialProvider, StaticToken};
pub use types::{
    normalize_expiry, MemoryTokenStore, OAuth2Config, TokenSet, TokenStore, REFRESH_MARGIN_SECS,
};
