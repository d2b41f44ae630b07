//! Authentication and authorization domain
//!
//! Credential presentation, the resolved caller identity, scope rules and
//! the tagged [`ValidationResult`] every request resolves to.

mod credential;
mod outcome;
mod scope;

pub use credential::{AuthRequest, PresentedCredential, RequestContext, API_KEY_HEADER};
pub use outcome::{AuthError, Identity, IdentityKind, ValidationResult, ADMIN_ROLE};
pub use scope::{scope_satisfies, ADMIN_SCOPE, WILDCARD_SCOPE};
