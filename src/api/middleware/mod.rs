//! API middleware components

pub mod audit;
pub mod auth;
pub mod metrics;

pub use audit::{audit_response_middleware, AuditSlot};
pub use auth::{AdminScope, RequireAdmin, RequireCredential, RequireScope, ScopeRequirement};
pub use metrics::metrics_middleware;
