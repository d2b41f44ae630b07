//! Bearer token issuing and validation (HS256 JWT)

use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::auth::AuthError;
use crate::domain::{Clock, DomainError};

/// Claims carried by an issued token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject id
    pub sub: String,
    pub username: String,
    pub role: String,
    pub iss: String,
    pub aud: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

/// A signed token and its expiry
#[derive(Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token rejection
///
/// Every failure displays the same text. [`InvalidToken::kind`] tells
/// operators which check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid token")]
pub struct InvalidToken {
    kind: AuthError,
}

impl InvalidToken {
    fn new(kind: AuthError) -> Self {
        Self { kind }
    }

    /// One of `MalformedToken`, `ExpiredToken` or `SignatureMismatch`
    pub fn kind(&self) -> AuthError {
        self.kind
    }
}

/// Token service configuration
#[derive(Clone)]
pub struct TokenConfig {
    pub signing_secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl TokenConfig {
    pub fn new(
        signing_secret: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl: Duration::minutes(60),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

impl Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("signing_secret", &"[hidden]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Issues and verifies bearer tokens with a symmetric signing key
#[derive(Clone)]
pub struct TokenService {
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("config", &self.config)
            .field("encoding_key", &"[hidden]")
            .field("decoding_key", &"[hidden]")
            .finish()
    }
}

impl TokenService {
    /// Build the service; an empty signing secret is a configuration error
    pub fn new(config: TokenConfig, clock: Arc<dyn Clock>) -> Result<Self, DomainError> {
        if config.signing_secret.trim().is_empty() {
            return Err(DomainError::configuration("Token signing secret is not set"));
        }

        if config.ttl <= Duration::zero() {
            return Err(DomainError::configuration("Token TTL must be positive"));
        }

        let encoding_key = EncodingKey::from_secret(config.signing_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.signing_secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = 0;
        // Expiry is checked against the injected clock instead
        validation.validate_exp = false;

        Ok(Self {
            config,
            encoding_key,
            decoding_key,
            validation,
            clock,
        })
    }

    /// Sign a token for the given subject, valid for the configured TTL
    pub fn issue(
        &self,
        subject_id: &str,
        username: &str,
        role: &str,
    ) -> Result<IssuedToken, DomainError> {
        let now = self.clock.now();
        let expires_at = now + self.config.ttl;

        let claims = TokenClaims {
            sub: subject_id.to_string(),
            username: username.to_string(),
            role: role.to_string(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| DomainError::internal(format!("Failed to sign token: {}", e)))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Verify signature, issuer, audience and expiry with zero leeway
    pub fn validate(&self, token: &str) -> Result<TokenClaims, InvalidToken> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| {
                let kind = match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                    ErrorKind::InvalidSignature => AuthError::SignatureMismatch,
                    _ => AuthError::MalformedToken,
                };
                debug!(reason = kind.code(), "Token rejected");
                InvalidToken::new(kind)
            },
        )?;

        if self.clock.now().timestamp() >= data.claims.exp {
            debug!(reason = AuthError::ExpiredToken.code(), "Token rejected");
            return Err(InvalidToken::new(AuthError::ExpiredToken));
        }

        Ok(data.claims)
    }

    pub fn extract_subject(&self, token: &str) -> Option<String> {
        self.validate(token).ok().map(|claims| claims.sub)
    }

    pub fn extract_role(&self, token: &str) -> Option<String> {
        self.validate(token).ok().map(|claims| claims.role)
    }
}
