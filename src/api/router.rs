use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::infrastructure::observability::{create_metrics_router, PrometheusMetrics};

use super::admin;
use super::health;
use super::middleware::{audit_response_middleware, metrics_middleware};
use super::state::AppState;
use super::v1;

/// Create the full router with application state
///
/// `/metrics` is mounted only when a Prometheus recorder is installed.
pub fn create_router(state: AppState, metrics: Option<PrometheusMetrics>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health::health_check))
        .nest("/v1", v1::create_v1_router())
        .nest("/admin", admin::create_admin_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            audit_response_middleware,
        ))
        .layer(middleware::from_fn(metrics_middleware))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if let Some(m) = metrics {
        router = router.merge(create_metrics_router(m));
    }

    router
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::domain::auth::AuthError;
    use crate::domain::{Clock, ManualClock};
    use crate::infrastructure::api_key::{ApiKeyService, CreateApiKeyRequest, InMemoryKeyStore};
    use crate::infrastructure::audit::{AuditRecorder, InMemoryAuditSink};
    use crate::infrastructure::auth::{KeyValidator, TokenConfig, TokenService};
    use crate::infrastructure::rate_limit::{InMemoryCounterStore, RateLimiter};
    use crate::infrastructure::secret::{Argon2SecretHasher, HashCost};

    struct Harness {
        app: Router,
        state: AppState,
        audit: Arc<InMemoryAuditSink>,
        tokens: Arc<TokenService>,
        admin_key: String,
    }

    async fn harness() -> Harness {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let audit = Arc::new(InMemoryAuditSink::new());
        let store = Arc::new(
            InMemoryKeyStore::new()
                .with_audit_source(audit.clone())
                .with_clock(clock.clone()),
        );
        let hasher = Arc::new(Argon2SecretHasher::new(HashCost::minimal()).unwrap());
        let limiter = Arc::new(RateLimiter::new(
            Arc::new(InMemoryCounterStore::new()),
            clock.clone(),
        ));
        let tokens = Arc::new(
            TokenService::new(
                TokenConfig::new("router-test-secret", "keygate", "keygate-api"),
                clock.clone(),
            )
            .unwrap(),
        );
        let (recorder, _worker) = AuditRecorder::spawn(audit.clone(), 64);

        let validator = KeyValidator::new(
            store.clone(),
            hasher.clone(),
            limiter,
            tokens.clone(),
            recorder,
            clock.clone(),
        );
        let service = ApiKeyService::new(store, hasher, clock);

        let admin_key = service
            .create_api_key(CreateApiKeyRequest::new("root").with_admin(true), None)
            .await
            .unwrap()
            .plaintext_key;

        let state = AppState::new(Arc::new(validator), Arc::new(service));

        Harness {
            app: create_router(state.clone(), None),
            state,
            audit,
            tokens,
            admin_key,
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, body)
    }

    fn get_with_key(uri: &str, key: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-api-key", key)
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, key: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-api-key", key)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn create_key(h: &Harness, body: Value) -> Value {
        let (status, created) = send(&h.app, post_json("/admin/api-keys", &h.admin_key, body)).await;
        assert_eq!(status, StatusCode::CREATED, "{}", created);
        created
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness().await;
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let (status, body) = send(&h.app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_missing_credential_is_401_and_audited() {
        let h = harness().await;
        let request = Request::builder()
            .uri("/v1/whoami")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "authentication_error");

        h.state.validator.audit().flush().await;
        let entries = h.audit.entries().await;
        let entry = entries.last().unwrap();

        assert!(!entry.authorized());
        assert_eq!(entry.error_message(), Some(AuthError::MissingCredential.code()));
        assert_eq!(entry.source_ip(), Some("203.0.113.9"));
        assert_eq!(entry.status_code(), Some(401));
        assert!(entry.response_time_ms().is_some());
    }

    #[tokio::test]
    async fn test_created_key_authenticates() {
        let h = harness().await;
        let created = create_key(&h, json!({"name": "Grader", "scopes": ["quiz:read"]})).await;
        let key = created["plaintext_key"].as_str().unwrap();

        let (status, body) = send(&h.app, get_with_key("/v1/whoami", key)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["identity"]["display_name"], "Grader");
        assert_eq!(body["identity"]["kind"], "api_key");
        assert_eq!(body["identity"]["key_id"], created["key_id"]);
    }

    #[tokio::test]
    async fn test_admin_routes_require_admin_scope() {
        let h = harness().await;
        let created = create_key(&h, json!({"name": "Grader", "scopes": ["quiz:read"]})).await;
        let key = created["plaintext_key"].as_str().unwrap();

        let (status, body) =
            send(&h.app, post_json("/admin/api-keys", key, json!({"name": "x"}))).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["message"], "Insufficient scope");
    }

    #[tokio::test]
    async fn test_invalid_create_request_is_400() {
        let h = harness().await;

        let (status, body) = send(
            &h.app,
            post_json("/admin/api-keys", &h.admin_key, json!({"name": "  "})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[tokio::test]
    async fn test_revoked_key_is_rejected() {
        let h = harness().await;
        let created = create_key(&h, json!({"name": "Grader"})).await;
        let key = created["plaintext_key"].as_str().unwrap();
        let uri = format!("/admin/api-keys/{}/revoke", created["key_id"].as_str().unwrap());

        let (status, body) = send(&h.app, post_json(&uri, &h.admin_key, json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active"], false);

        let (status, body) = send(&h.app, get_with_key("/v1/whoami", key)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(!body.to_string().contains("revoked"));
    }

    #[tokio::test]
    async fn test_hourly_quota_is_429() {
        let h = harness().await;
        let created = create_key(&h, json!({"name": "Tight", "hourly_quota": 1})).await;
        let key = created["plaintext_key"].as_str().unwrap();

        let (first, _) = send(&h.app, get_with_key("/v1/whoami", key)).await;
        let (second, body) = send(&h.app, get_with_key("/v1/whoami", key)).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["type"], "rate_limit_error");
    }

    #[tokio::test]
    async fn test_stats_reflect_audited_requests() {
        let h = harness().await;
        let created = create_key(&h, json!({"name": "Tight", "hourly_quota": 2})).await;
        let key = created["plaintext_key"].as_str().unwrap();
        let key_id = created["key_id"].as_str().unwrap();

        for _ in 0..3 {
            send(&h.app, get_with_key("/v1/whoami", key)).await;
        }
        h.state.validator.audit().flush().await;

        let uri = format!("/admin/api-keys/{}/stats?window=last_hour", key_id);
        let (status, body) = send(&h.app, get_with_key(&uri, &h.admin_key)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["window"], "last_hour");
        assert_eq!(body["total"], 3);
        assert_eq!(body["success"], 2);
        assert_eq!(body["rate_limited"], 1);
    }

    #[tokio::test]
    async fn test_stats_rejects_unknown_window_and_key() {
        let h = harness().await;
        let created = create_key(&h, json!({"name": "Grader"})).await;
        let key_id = created["key_id"].as_str().unwrap();

        let uri = format!("/admin/api-keys/{}/stats?window=fortnight", key_id);
        let (status, body) = send(&h.app, get_with_key(&uri, &h.admin_key)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["param"], "window");

        let uri = format!("/admin/api-keys/{}/stats", uuid::Uuid::new_v4());
        let (status, _) = send(&h.app, get_with_key(&uri, &h.admin_key)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bearer_admin_can_manage_keys() {
        let h = harness().await;
        let admin = h.tokens.issue("user-1", "ada", "admin").unwrap();
        let member = h.tokens.issue("user-2", "bob", "member").unwrap();

        let request = |token: &str| {
            Request::builder()
                .method("POST")
                .uri("/admin/api-keys")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"name": "From token"}).to_string()))
                .unwrap()
        };

        let (status, created) = send(&h.app, request(&admin.token)).await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/admin/api-keys/{}", created["key_id"].as_str().unwrap());
        let (_, key) = send(&h.app, get_with_key(&uri, &h.admin_key)).await;
        assert_eq!(key["created_by"], "user-1");
        assert!(key.get("secret_hash").is_none());

        let (status, _) = send(&h.app, request(&member.token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&h.app, request("not.a.token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
