//! Inbound credential presentation and request context

use crate::domain::api_key::Metadata;

/// Header carrying a raw API key
pub const API_KEY_HEADER: &str = "x-api-key";

const BEARER_PREFIX: &str = "Bearer ";

/// A credential as presented by the caller
#[derive(Clone, PartialEq, Eq)]
pub enum PresentedCredential {
    ApiKey(String),
    BearerToken(String),
}

impl PresentedCredential {
    /// Pick the credential from raw header values
    ///
    /// `X-API-Key` wins when both headers are present. Blank values and
    /// non-Bearer `Authorization` schemes count as absent.
    pub fn from_headers(api_key: Option<&str>, authorization: Option<&str>) -> Option<Self> {
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            return Some(Self::ApiKey(key.to_string()));
        }

        authorization
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| Self::BearerToken(token.to_string()))
    }
}

impl std::fmt::Debug for PresentedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey([redacted])"),
            Self::BearerToken(_) => f.write_str("BearerToken([redacted])"),
        }
    }
}

/// Facts about the inbound request that end up in the audit trail
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
    pub required_scope: Option<String>,
    pub metadata: Metadata,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_source_ip(mut self, ip: Option<String>) -> Self {
        self.source_ip = ip;
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_required_scope(mut self, scope: impl Into<String>) -> Self {
        self.required_scope = Some(scope.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// One authorization question: who is calling, and for what
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub credential: Option<PresentedCredential>,
    pub context: RequestContext,
}

impl AuthRequest {
    pub fn new(credential: Option<PresentedCredential>, context: RequestContext) -> Self {
        Self {
            credential,
            context,
        }
    }

    pub fn api_key(key: impl Into<String>, context: RequestContext) -> Self {
        Self::new(Some(PresentedCredential::ApiKey(key.into())), context)
    }

    pub fn bearer(token: impl Into<String>, context: RequestContext) -> Self {
        Self::new(Some(PresentedCredential::BearerToken(token.into())), context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_header() {
        assert_eq!(
            PresentedCredential::from_headers(Some("qk_abc"), None),
            Some(PresentedCredential::ApiKey("qk_abc".to_string()))
        );
    }

    #[test]
    fn test_bearer_header() {
        assert_eq!(
            PresentedCredential::from_headers(None, Some("Bearer eyJhbGci.x.y")),
            Some(PresentedCredential::BearerToken("eyJhbGci.x.y".to_string()))
        );
    }

    #[test]
    fn test_api_key_takes_precedence() {
        assert_eq!(
            PresentedCredential::from_headers(Some("qk_abc"), Some("Bearer tok")),
            Some(PresentedCredential::ApiKey("qk_abc".to_string()))
        );
    }

    #[test]
    fn test_blank_and_foreign_schemes_are_absent() {
        assert_eq!(PresentedCredential::from_headers(Some("   "), None), None);
        assert_eq!(PresentedCredential::from_headers(None, Some("Basic dXNlcjpw")), None);
        assert_eq!(PresentedCredential::from_headers(None, Some("Bearer    ")), None);
        assert_eq!(PresentedCredential::from_headers(None, None), None);
    }

    #[test]
    fn test_blank_api_key_falls_back_to_bearer() {
        assert_eq!(
            PresentedCredential::from_headers(Some(""), Some("Bearer tok")),
            Some(PresentedCredential::BearerToken("tok".to_string()))
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let cred = PresentedCredential::ApiKey("qk_super_secret".to_string());
        assert!(!format!("{:?}", cred).contains("super_secret"));
    }
}
