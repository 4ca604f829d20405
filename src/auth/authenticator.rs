//! Credential providers

use super::types::{OAuth2Config, TokenResponse, TokenSet, TokenStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Supplies a valid bearer token before each upstream call
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Bearer token valid for at least the refresh margin
    async fn bearer_token(&self) -> Result<String>;
}

/// Fixed bearer token
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// OAuth2 refresh-token authenticator backed by a token store
pub struct Authenticator {
    config: OAuth2Config,
    store: Arc<dyn TokenStore>,
    http_client: Client,
    cached_token: Arc<RwLock<Option<TokenSet>>>,
}

impl Authenticator {
    /// Create an authenticator with its own HTTP client
    pub fn new(config: OAuth2Config, store: Arc<dyn TokenStore>) -> Self {
        Self::with_client(config, store, Client::new())
    }

    /// Create an authenticator sharing an existing HTTP client
    pub fn with_client(config: OAuth2Config, store: Arc<dyn TokenStore>, http_client: Client) -> Self {
        Self {
            config,
            store,
            http_client,
            cached_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Get a valid token, refreshing if necessary
    async fn get_or_refresh_token(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        {
            let cached = self.cached_token.read().await;
            if let Some(tokens) = cached.as_ref() {
                if !tokens.needs_refresh(now) {
                    return Ok(tokens.access_token.clone());
                }
            }
        }

        let mut cached = self.cached_token.write().await;

        // Another caller may have refreshed while we waited
        if let Some(tokens) = cached.as_ref() {
            if !tokens.needs_refresh(now) {
                return Ok(tokens.access_token.clone());
            }
        }

        let stored = match cached.take() {
            Some(tokens) => tokens,
            None => self
                .store
                .load()?
                .ok_or_else(|| Error::auth("no token stored; run `stagesync init-token` first"))?,
        };

        let tokens = if stored.needs_refresh(now) {
            let refreshed = self.refresh(&stored).await?;
            self.store.save(&refreshed)?;
            info!(expires_at = refreshed.expires_at, "Access token refreshed");
            refreshed
        } else {
            stored
        };

        let access_token = tokens.access_token.clone();
        *cached = Some(tokens);
        Ok(access_token)
    }

    /// Exchange a refresh token for a new token set
    async fn refresh(&self, current: &TokenSet) -> Result<TokenSet> {
        debug!(token_url = %self.config.token_url, "Refreshing access token");
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", current.refresh_token.as_str()),
        ];
        let response = self.post_token_form(&form).await?;
        response.into_token_set(Some(&current.refresh_token), Utc::now().timestamp())
    }

    /// Exchange an authorization code for the first token set and persist it
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        let tokens = self
            .post_token_form(&form)
            .await?
            .into_token_set(None, Utc::now().timestamp())?;
        self.store.save(&tokens)?;
        *self.cached_token.write().await = Some(tokens.clone());
        Ok(tokens)
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http_client
            .post(&self.config.token_url)
            .header("Authorization", basic_auth_header(&self.config))
            .form(form)
            .send()
            .await
            .map_err(|e| Error::token_refresh(format!("token request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::token_refresh("token endpoint answered 429"));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::token_refresh(format!(
                "token request failed with status {}: {}",
                status.as_u16(),
                body
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::token_refresh(format!("invalid token response: {e}")))
    }

    /// Drop the in-memory token so the next call reloads from the store
    pub async fn clear_cache(&self) {
        *self.cached_token.write().await = None;
    }

    /// Get the OAuth2 config
    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }
}

#[async_trait]
impl CredentialProvider for Authenticator {
    async fn bearer_token(&self) -> Result<String> {
        self.get_or_refresh_token().await
    }
}

fn basic_auth_header(config: &OAuth2Config) -> String {
    let raw = format!(
        "{}:{}",
        config.credentials.client_id, config.credentials.client_secret
    );
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(raw)
    )
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("token_url", &self.config.token_url)
            .finish_non_exhaustive()
    }
}
