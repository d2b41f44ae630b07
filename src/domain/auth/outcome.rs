//! Authorization outcomes

use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use super::scope::scope_satisfies;
use crate::domain::api_key::{ApiKeyId, ApiKeyRecord};

/// Role carried by bearer tokens that grants every scope
pub const ADMIN_ROLE: &str = "admin";

/// Why an authorization attempt did not produce `Valid`
///
/// The three token variants share one display text so the message never
/// reveals which token check failed. Use [`AuthError::code`] for operator
/// facing detail.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,

    #[error("unknown key")]
    UnknownKey,

    #[error("revoked")]
    RevokedKey,

    #[error("expired")]
    ExpiredKey,

    #[error("bad token")]
    MalformedToken,

    #[error("bad token")]
    ExpiredToken,

    #[error("bad token")]
    SignatureMismatch,

    #[error("rate limited")]
    RateLimited,

    #[error("insufficient scope")]
    InsufficientScope,

    #[error("store unavailable")]
    StoreUnavailable,
}

impl AuthError {
    /// Stable machine-readable code for logs and the audit trail
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::UnknownKey => "unknown_key",
            Self::RevokedKey => "revoked_key",
            Self::ExpiredKey => "expired_key",
            Self::MalformedToken => "malformed_token",
            Self::ExpiredToken => "expired_token",
            Self::SignatureMismatch => "signature_mismatch",
            Self::RateLimited => "rate_limited",
            Self::InsufficientScope => "insufficient_scope",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

/// How the caller authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    ApiKey,
    BearerToken,
}

/// The resolved caller
///
/// Built by the validator from a key record or verified token claims and
/// handed to the caller read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    kind: IdentityKind,
    subject_id: String,
    display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_id: Option<ApiKeyId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    scopes: BTreeSet<String>,
    admin: bool,
}

impl Identity {
    pub fn from_key(record: &ApiKeyRecord) -> Self {
        Self {
            kind: IdentityKind::ApiKey,
            subject_id: record.id().to_string(),
            display_name: record.name().to_string(),
            key_id: Some(*record.id()),
            role: None,
            scopes: record.scopes().clone(),
            admin: record.is_admin(),
        }
    }

    /// Identity for a verified bearer token; scopes derive from the role
    pub fn from_token(
        subject_id: impl Into<String>,
        username: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        let role = role.into();

        Self {
            kind: IdentityKind::BearerToken,
            subject_id: subject_id.into(),
            display_name: username.into(),
            key_id: None,
            admin: role == ADMIN_ROLE,
            role: Some(role),
            scopes: BTreeSet::new(),
        }
    }

    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn key_id(&self) -> Option<&ApiKeyId> {
        self.key_id.as_ref()
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn satisfies(&self, required_scope: &str) -> bool {
        scope_satisfies(&self.scopes, self.admin, required_scope)
    }
}

/// The single outcome of one authorization attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid {
        identity: Identity,
        granted_scopes: BTreeSet<String>,
    },
    Invalid {
        reason: AuthError,
    },
    RateLimited {
        identity: Identity,
    },
    Expired {
        identity: Identity,
    },
    InsufficientScope {
        identity: Identity,
        required_scope: String,
    },
}

impl ValidationResult {
    pub fn valid(identity: Identity) -> Self {
        let granted_scopes = identity.scopes().clone();
        Self::Valid {
            identity,
            granted_scopes,
        }
    }

    pub fn invalid(reason: AuthError) -> Self {
        Self::Invalid { reason }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// The resolved identity, if resolution got that far
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Valid { identity, .. }
            | Self::RateLimited { identity }
            | Self::Expired { identity }
            | Self::InsufficientScope { identity, .. } => Some(identity),
            Self::Invalid { .. } => None,
        }
    }

    /// The taxonomy entry behind a non-valid outcome
    pub fn error(&self) -> Option<AuthError> {
        match self {
            Self::Valid { .. } => None,
            Self::Invalid { reason } => Some(*reason),
            Self::RateLimited { .. } => Some(AuthError::RateLimited),
            Self::Expired { .. } => Some(AuthError::ExpiredKey),
            Self::InsufficientScope { .. } => Some(AuthError::InsufficientScope),
        }
    }

    /// HTTP status a front end should answer with
    ///
    /// Infrastructure failures collapse into 401 with everything else that
    /// means "not authenticated".
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Valid { .. } => 200,
            Self::Invalid { .. } | Self::Expired { .. } => 401,
            Self::InsufficientScope { .. } => 403,
            Self::RateLimited { .. } => 429,
        }
    }

    /// Low-cardinality label for metrics
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::Valid { .. } => "valid",
            Self::Invalid { .. } => "invalid",
            Self::RateLimited { .. } => "rate_limited",
            Self::Expired { .. } => "expired",
            Self::InsufficientScope { .. } => "insufficient_scope",
        }
    }
}
