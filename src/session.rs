//! Explicit session context: the bearer token and current user, hydrated from
//! the local store at startup and cleared on logout.

use std::sync::Arc;

use anyhow::Context;

use crate::api_client::{SavoaClient, User};
use crate::error::ApiError;
use crate::storage::{AUTH_TOKEN_KEY, LocalStore};

pub const MIN_PASSWORD_LEN: usize = 6;

pub struct Session {
    store: Arc<dyn LocalStore>,
    client: SavoaClient,
    token: Option<String>,
    user: Option<User>,
    hydrated: bool,
}

impl Session {
    /// `client` is used as a template; credentials are attached per call.
    pub fn new(store: Arc<dyn LocalStore>, client: SavoaClient) -> Self {
        Session {
            store,
            client: client.anonymous(),
            token: None,
            user: None,
            hydrated: false,
        }
    }

    /// Load the persisted token, if any.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn hydrate(&mut self) -> anyhow::Result<()> {
        self.token = self
            .store
            .get(AUTH_TOKEN_KEY)
            .await
            .with_context(|| "Failed to read session token")?
            .filter(|t| !t.trim().is_empty());
        self.hydrated = true;
        tracing::debug!(has_token = self.token.is_some(), "session hydrated");
        Ok(())
    }

    /// Exchange credentials for a token, persist it and load the user.
    #[tracing::instrument(level = "debug", skip(self, password))]
    pub async fn login(&mut self, login: &str, password: &str) -> anyhow::Result<()> {
        let resp = self.client.login(login, password).await?;
        self.store
            .set(AUTH_TOKEN_KEY, &resp.token)
            .await
            .with_context(|| "Failed to persist session token")?;
        self.token = Some(resp.token);
        tracing::info!(%login, "logged in");
        self.fetch_me().await?;
        Ok(())
    }

    /// Refresh the current user. Without a token the user is cleared.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn fetch_me(&mut self) -> Result<Option<&User>, ApiError> {
        if self.token.is_none() {
            self.user = None;
            return Ok(None);
        }
        let me = self.client().get_me().await?;
        self.user = Some(me);
        Ok(self.user.as_ref())
    }

    /// Forget the token locally and in the store.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn logout(&mut self) -> anyhow::Result<()> {
        self.token = None;
        self.user = None;
        self.store
            .remove(AUTH_TOKEN_KEY)
            .await
            .with_context(|| "Failed to remove session token")?;
        tracing::info!("logged out");
        Ok(())
    }

    /// Client carrying the session token, or an anonymous one.
    pub fn client(&self) -> SavoaClient {
        match &self.token {
            Some(token) => self.client.clone().with_token(token.clone()),
            None => self.client.clone(),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// Why a password reset was refused.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResetPasswordError {
    #[error("password must be at least {} characters", MIN_PASSWORD_LEN)]
    TooShort,
    #[error("reset link expired")]
    TokenExpired,
    #[error("reset link already used")]
    TokenUsed,
    #[error("invalid reset link")]
    InvalidToken,
    #[error("{0}")]
    Other(String),
}

impl From<ApiError> for ResetPasswordError {
    fn from(err: ApiError) -> Self {
        match err.payload_str("error") {
            Some("token_expired") => ResetPasswordError::TokenExpired,
            Some("token_used") => ResetPasswordError::TokenUsed,
            Some("invalid_token") => ResetPasswordError::InvalidToken,
            Some(other) => ResetPasswordError::Other(other.to_string()),
            None => ResetPasswordError::Other(err.to_string()),
        }
    }
}

/// Ask the backend to email a reset link. Sent without credentials.
pub async fn forgot_password(client: &SavoaClient, email: &str) -> Result<(), ApiError> {
    client.anonymous().forgot_password(email.trim()).await
}

/// Set a new password using the emailed reset token.
pub async fn reset_password(
    client: &SavoaClient,
    token: &str,
    new_password: &str,
) -> Result<(), ResetPasswordError> {
    if new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ResetPasswordError::TooShort);
    }
    client
        .anonymous()
        .reset_password(token, new_password)
        .await
        .map_err(ResetPasswordError::from)
}
