//! Request authorization
//!
//! [`KeyValidator`] turns one [`AuthRequest`] into one [`ValidationResult`].
//! The checks run in a fixed order: credential presence, resolution,
//! revocation, expiry, quota, then scope. A caller holding a revoked or
//! expired key therefore never learns whether quota or scope would have
//! stopped it.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::domain::api_key::{ApiKeyId, ApiKeyRecord, KeyStore};
use crate::domain::audit::{AuditEntry, AuditId};
use crate::domain::auth::{
    AuthError, AuthRequest, Identity, PresentedCredential, RequestContext, ValidationResult,
};
use crate::domain::rate_limit::RateDecision;
use crate::domain::Clock;
use crate::infrastructure::api_key::ApiKeyGenerator;
use crate::infrastructure::audit::AuditRecorder;
use crate::infrastructure::rate_limit::RateLimiter;
use crate::infrastructure::secret::SecretHasher;

use super::token::TokenService;

/// Metric counting authorization outcomes
pub const AUTH_DECISIONS_METRIC: &str = "keygate_auth_decisions_total";

/// The outcome of one request together with its audit entry id
#[derive(Debug, Clone)]
pub struct AuthDecision {
    pub result: ValidationResult,
    pub audit_id: AuditId,
}

/// Orchestrates credential checks for every inbound request
pub struct KeyValidator {
    store: Arc<dyn KeyStore>,
    hasher: Arc<dyn SecretHasher>,
    generator: ApiKeyGenerator,
    limiter: Arc<RateLimiter>,
    tokens: Arc<TokenService>,
    audit: AuditRecorder,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for KeyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValidator")
            .field("generator", &self.generator)
            .field("limiter", &self.limiter)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl KeyValidator {
    pub fn new(
        store: Arc<dyn KeyStore>,
        hasher: Arc<dyn SecretHasher>,
        limiter: Arc<RateLimiter>,
        tokens: Arc<TokenService>,
        audit: AuditRecorder,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            hasher,
            generator: ApiKeyGenerator::default(),
            limiter,
            tokens,
            audit,
            clock,
        }
    }

    /// Generator whose type prefix presented keys must carry
    pub fn with_generator(mut self, generator: ApiKeyGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    /// Decide one request, audit the outcome and record key usage
    ///
    /// Never fails: infrastructure trouble resolves to
    /// `Invalid(StoreUnavailable)`.
    pub async fn validate(&self, request: &AuthRequest) -> AuthDecision {
        let result = self.decide(request).await;

        let entry = AuditEntry::for_decision(self.clock.now(), &request.context, &result);
        let audit_id = self.audit.record(entry);

        counter!(AUTH_DECISIONS_METRIC, "outcome" => result.outcome_label()).increment(1);

        debug!(
            method = %request.context.method,
            path = %request.context.path,
            outcome = result.outcome_label(),
            reason = result.error().map(|e| e.code()),
            audit_id = %audit_id,
            "Authorization decided"
        );

        if let ValidationResult::Valid { identity, .. } = &result {
            if let Some(key_id) = identity.key_id() {
                self.touch_usage(*key_id, request.context.source_ip.clone());
            }
        }

        AuthDecision { result, audit_id }
    }

    async fn decide(&self, request: &AuthRequest) -> ValidationResult {
        match &request.credential {
            None => ValidationResult::invalid(AuthError::MissingCredential),
            Some(PresentedCredential::BearerToken(token)) => {
                self.decide_token(token, &request.context)
            }
            Some(PresentedCredential::ApiKey(key)) => {
                self.decide_key(key, &request.context).await
            }
        }
    }

    fn decide_token(&self, token: &str, context: &RequestContext) -> ValidationResult {
        let claims = match self.tokens.validate(token) {
            Ok(claims) => claims,
            Err(e) => return ValidationResult::invalid(e.kind()),
        };

        // Tokens have no key record: nothing to revoke and no quota to spend
        let identity = Identity::from_token(claims.sub, claims.username, claims.role);

        check_scope(identity, context)
    }

    async fn decide_key(&self, key: &str, context: &RequestContext) -> ValidationResult {
        let Some(prefix) = self.generator.extract_prefix(key) else {
            return ValidationResult::invalid(AuthError::UnknownKey);
        };

        let candidates = match self.store.find_by_prefix(&prefix).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(prefix = %prefix, error = %e, "Key lookup failed");
                return ValidationResult::invalid(AuthError::StoreUnavailable);
            }
        };

        let Some(record) = self.match_candidate(key, candidates).await else {
            debug!(prefix = %prefix, "No key matched the presented secret");
            return ValidationResult::invalid(AuthError::UnknownKey);
        };

        if !record.is_active() {
            return ValidationResult::invalid(AuthError::RevokedKey);
        }

        let identity = Identity::from_key(&record);

        if record.is_expired_at(self.clock.now()) {
            return ValidationResult::Expired { identity };
        }

        match self
            .limiter
            .check_and_increment(record.id(), record.hourly_quota(), record.daily_quota())
            .await
        {
            Ok(RateDecision::Admit) => {}
            Ok(RateDecision::Deny { window }) => {
                debug!(key_id = %record.id(), window = %window, "Quota exhausted");
                return ValidationResult::RateLimited { identity };
            }
            Err(e) => {
                warn!(key_id = %record.id(), error = %e, "Quota check failed");
                return ValidationResult::invalid(AuthError::StoreUnavailable);
            }
        }

        check_scope(identity, context)
    }

    /// The candidate whose hash the presented secret verifies against
    async fn match_candidate(
        &self,
        key: &str,
        candidates: Vec<ApiKeyRecord>,
    ) -> Option<ApiKeyRecord> {
        if candidates.is_empty() {
            return None;
        }

        let hasher = self.hasher.clone();
        let key = key.to_string();

        let verified = tokio::task::spawn_blocking(move || {
            candidates
                .into_iter()
                .find(|candidate| hasher.verify(&key, candidate.secret_hash()))
        })
        .await;

        match verified {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Secret verification task failed");
                None
            }
        }
    }

    /// Best-effort usage bookkeeping off the request path
    fn touch_usage(&self, key_id: ApiKeyId, source_ip: Option<String>) {
        let store = self.store.clone();
        let at = self.clock.now();

        tokio::spawn(async move {
            if let Err(e) = store.touch_usage(&key_id, source_ip, at).await {
                warn!(key_id = %key_id, error = %e, "Failed to record key usage");
            }
        });
    }
}

fn check_scope(identity: Identity, context: &RequestContext) -> ValidationResult {
    match &context.required_scope {
        Some(required) if !identity.satisfies(required) => ValidationResult::InsufficientScope {
            identity,
            required_scope: required.clone(),
        },
        _ => ValidationResult::valid(identity),
    }
}
