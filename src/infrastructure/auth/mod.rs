//! Authentication infrastructure
//!
//! Bearer token handling and the request validator.

mod token;
mod validator;

pub use token::{InvalidToken, IssuedToken, TokenClaims, TokenConfig, TokenService};
pub use validator::{AuthDecision, KeyValidator, AUTH_DECISIONS_METRIC};
