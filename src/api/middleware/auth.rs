//! Credential extractors
//!
//! Every protected handler takes [`RequireCredential`] or [`RequireScope`].
//! Both run the key validator once, publish the audit id for the back-fill
//! middleware, and reject with a body that names the status class only.

use std::marker::PhantomData;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{
        header::{self, AsHeaderName},
        request::Parts,
        HeaderMap,
    },
};

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::auth::{
    AuthRequest, Identity, PresentedCredential, RequestContext, ValidationResult, ADMIN_SCOPE,
    API_KEY_HEADER,
};

use super::audit::AuditSlot;

const REQUEST_ID_HEADER: &str = "x-request-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Extractor that accepts any valid credential
#[derive(Debug, Clone)]
pub struct RequireCredential(pub Identity);

impl FromRequestParts<AppState> for RequireCredential {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authorize(parts, state, None).await.map(Self)
    }
}

/// Binds a required scope to a marker type
pub trait ScopeRequirement: Send + Sync + 'static {
    const SCOPE: &'static str;
}

/// Key-management scope
#[derive(Debug, Clone, Copy)]
pub struct AdminScope;

impl ScopeRequirement for AdminScope {
    const SCOPE: &'static str = ADMIN_SCOPE;
}

/// Extractor that requires a credential granting `S::SCOPE`
#[derive(Debug, Clone)]
pub struct RequireScope<S: ScopeRequirement>(pub Identity, PhantomData<fn() -> S>);

impl<S: ScopeRequirement> RequireScope<S> {
    pub fn into_identity(self) -> Identity {
        self.0
    }
}

pub type RequireAdmin = RequireScope<AdminScope>;

impl<S: ScopeRequirement> FromRequestParts<AppState> for RequireScope<S> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authorize(parts, state, Some(S::SCOPE))
            .await
            .map(|identity| Self(identity, PhantomData))
    }
}

async fn authorize(
    parts: &mut Parts,
    state: &AppState,
    required_scope: Option<&str>,
) -> Result<Identity, ApiError> {
    let request = auth_request(parts, required_scope);
    let decision = state.validator.validate(&request).await;

    if let Some(slot) = parts.extensions.get::<AuditSlot>() {
        slot.set(decision.audit_id);
    }

    match decision.result {
        ValidationResult::Valid { identity, .. } => Ok(identity),
        other => Err(rejection(&other)),
    }
}

fn auth_request(parts: &Parts, required_scope: Option<&str>) -> AuthRequest {
    let headers = &parts.headers;
    let credential = PresentedCredential::from_headers(
        header_str(headers, API_KEY_HEADER),
        header_str(headers, header::AUTHORIZATION),
    );

    let mut context = RequestContext::new(parts.method.as_str(), parts.uri.path())
        .with_source_ip(source_ip(parts))
        .with_user_agent(header_str(headers, header::USER_AGENT).map(String::from))
        .with_request_id(header_str(headers, REQUEST_ID_HEADER).map(String::from));

    if let Some(scope) = required_scope {
        context = context.with_required_scope(scope);
    }

    AuthRequest::new(credential, context)
}

fn header_str<K: AsHeaderName>(headers: &HeaderMap, name: K) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// First `X-Forwarded-For` hop, else the peer address
fn source_ip(parts: &Parts) -> Option<String> {
    let forwarded = header_str(&parts.headers, FORWARDED_FOR_HEADER)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(String::from);

    forwarded.or_else(|| {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    })
}

fn rejection(result: &ValidationResult) -> ApiError {
    match result {
        ValidationResult::InsufficientScope { .. } => ApiError::forbidden("Insufficient scope"),
        ValidationResult::RateLimited { .. } => ApiError::rate_limited("Rate limit exceeded"),
        _ => ApiError::unauthorized("Invalid or missing credentials"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;

    use crate::domain::api_key::{ApiKeyId, ApiKeyRecord};
    use crate::domain::auth::AuthError;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    fn identity() -> Identity {
        Identity::from_key(&ApiKeyRecord::new(
            ApiKeyId::generate(),
            "k",
            "h",
            "qk_abcdefgh",
            Utc::now(),
        ))
    }

    #[test]
    fn test_auth_request_reads_headers() {
        let parts = parts(
            Request::builder()
                .method("POST")
                .uri("/admin/api-keys?x=1")
                .header("x-api-key", "qk_abcdefghij")
                .header("user-agent", "curl/8.0")
                .header("x-request-id", "req-1"),
        );

        let request = auth_request(&parts, Some("admin"));

        assert_eq!(
            request.credential,
            Some(PresentedCredential::ApiKey("qk_abcdefghij".to_string()))
        );
        assert_eq!(request.context.method, "POST");
        assert_eq!(request.context.path, "/admin/api-keys");
        assert_eq!(request.context.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(request.context.request_id.as_deref(), Some("req-1"));
        assert_eq!(request.context.required_scope.as_deref(), Some("admin"));
    }

    #[test]
    fn test_source_ip_prefers_first_forwarded_hop() {
        let mut parts = parts(
            Request::builder().header("x-forwarded-for", " 203.0.113.7 , 10.0.0.1"),
        );
        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 2], 4000))));

        assert_eq!(source_ip(&parts).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_source_ip_falls_back_to_peer() {
        let mut parts = parts(Request::builder());
        assert_eq!(source_ip(&parts), None);

        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 2], 4000))));
        assert_eq!(source_ip(&parts).as_deref(), Some("192.168.1.2"));
    }

    #[test]
    fn test_rejection_status_and_generic_body() {
        let cases = [
            (
                ValidationResult::invalid(AuthError::RevokedKey),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ValidationResult::invalid(AuthError::StoreUnavailable),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ValidationResult::Expired {
                    identity: identity(),
                },
                StatusCode::UNAUTHORIZED,
            ),
            (
                ValidationResult::InsufficientScope {
                    identity: identity(),
                    required_scope: "admin".to_string(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                ValidationResult::RateLimited {
                    identity: identity(),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
        ];

        for (result, status) in cases {
            let err = rejection(&result);
            assert_eq!(err.status, status);
            assert_eq!(err.status.as_u16(), result.http_status());

            let message = err.response.error.message.to_lowercase();
            assert!(!message.contains("revoked"));
            assert!(!message.contains("store"));
            assert!(!message.contains("expired"));
        }
    }
}
