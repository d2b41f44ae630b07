//! Domain layer - Core entities, contracts and decision rules

pub mod api_key;
pub mod audit;
pub mod auth;
pub mod clock;
pub mod error;
pub mod rate_limit;

pub use api_key::{ApiKeyId, ApiKeyRecord, KeyStore, KeyUsageStats, StatsWindow};
pub use audit::{AuditEntry, AuditId, AuditSink};
pub use auth::{AuthError, AuthRequest, Identity, PresentedCredential, RequestContext, ValidationResult};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DomainError;
pub use rate_limit::{CounterStore, RateDecision, WindowKind};
