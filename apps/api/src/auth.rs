//! Identity verification for bearer tokens.
//!
//! Tokens are Google-issued ID tokens, checked against the token-info endpoint.
//! Handlers receive the caller through the [`MaybeIdentity`] extractor.

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::errors::AppError;
use crate::state::AppState;

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub email: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token audience mismatch")]
    AudienceMismatch,

    #[error("Identity provider unreachable: {0}")]
    Provider(#[from] reqwest::Error),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<Identity, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    sub: Option<String>,
    email: Option<String>,
    aud: Option<String>,
}

/// Verifies Google ID tokens via the token-info endpoint.
pub struct GoogleTokenVerifier {
    client: Client,
    token_info_url: String,
    /// When set, the token's `aud` claim must match.
    audience: Option<String>,
}

impl GoogleTokenVerifier {
    pub fn new(token_info_url: String, audience: Option<String>) -> Result<Self, AuthError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(10)).build()?,
            token_info_url,
            audience,
        })
    }
}

#[async_trait]
impl IdentityVerifier for GoogleTokenVerifier {
    async fn verify_token(&self, token: &str) -> Result<Identity, AuthError> {
        let response = self
            .client
            .get(&self.token_info_url)
            .query(&[("id_token", token)])
            .send()
            .await?;

        if !response.status().is_success() {
            debug!("Token rejected by identity provider: {}", response.status());
            return Err(AuthError::InvalidToken);
        }

        let info: TokenInfo = response.json().await?;
        if let Some(expected) = &self.audience {
            if info.aud.as_deref() != Some(expected.as_str()) {
                return Err(AuthError::AudienceMismatch);
            }
        }

        let subject = info
            .sub
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::InvalidToken)?;
        Ok(Identity {
            subject,
            email: info.email,
        })
    }
}

/// The caller's identity, if a bearer token was supplied.
///
/// A missing header yields `None`; a present but invalid token is rejected with 401.
pub struct MaybeIdentity(pub Option<Identity>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(MaybeIdentity(None));
        };

        let token = header
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;

        let identity = state.verifier.verify_token(token).await.map_err(|e| {
            debug!("Token verification failed: {e}");
            AppError::Unauthorized
        })?;
        Ok(MaybeIdentity(Some(identity)))
    }
}
