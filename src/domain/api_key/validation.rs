//! Validation rules for API key creation input

use thiserror::Error;

/// Errors that can occur while validating API key input
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiKeyValidationError {
    #[error("API key ID is not a valid identifier: '{0}'")]
    InvalidId(String),

    #[error("API key name cannot be empty")]
    EmptyName,

    #[error("API key name exceeds maximum length of {0} characters")]
    NameTooLong(usize),

    #[error("Scope cannot be empty")]
    EmptyScope,

    #[error("Scope exceeds maximum length of {0} characters")]
    ScopeTooLong(usize),

    #[error("Scope '{scope}' contains invalid character '{found}'. Allowed: a-z, 0-9, ':', '_', '.', '-', '*'")]
    InvalidScopeCharacter { scope: String, found: char },

    #[error("Expiry must be a positive number of days, got {0}")]
    NonPositiveExpiry(i64),

    #[error("Expiry exceeds maximum of {0} days")]
    ExpiryTooLong(i64),
}

const MAX_NAME_LENGTH: usize = 100;
const MAX_SCOPE_LENGTH: usize = 64;
const MAX_EXPIRY_DAYS: i64 = 36_500;

/// Validate a display name for a new key
pub fn validate_key_name(name: &str) -> Result<(), ApiKeyValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ApiKeyValidationError::EmptyName);
    }

    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(ApiKeyValidationError::NameTooLong(MAX_NAME_LENGTH));
    }

    Ok(())
}

/// Validate a single scope string
///
/// Scopes are lowercase, namespaced with ':' (e.g. `quiz:read`), and may use
/// a trailing `*` as a wildcard segment.
pub fn validate_scope(scope: &str) -> Result<(), ApiKeyValidationError> {
    if scope.is_empty() {
        return Err(ApiKeyValidationError::EmptyScope);
    }

    if scope.len() > MAX_SCOPE_LENGTH {
        return Err(ApiKeyValidationError::ScopeTooLong(MAX_SCOPE_LENGTH));
    }

    if let Some(found) = scope
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || ":_.-*".contains(*c)))
    {
        return Err(ApiKeyValidationError::InvalidScopeCharacter {
            scope: scope.to_string(),
            found,
        });
    }

    Ok(())
}

/// Validate every scope in a set
pub fn validate_scopes<'a>(
    scopes: impl IntoIterator<Item = &'a String>,
) -> Result<(), ApiKeyValidationError> {
    scopes.into_iter().try_for_each(|s| validate_scope(s))
}

/// Validate a requested lifetime in days
pub fn validate_expiry_days(days: i64) -> Result<(), ApiKeyValidationError> {
    if days <= 0 {
        return Err(ApiKeyValidationError::NonPositiveExpiry(days));
    }

    if days > MAX_EXPIRY_DAYS {
        return Err(ApiKeyValidationError::ExpiryTooLong(MAX_EXPIRY_DAYS));
    }

    Ok(())
}
