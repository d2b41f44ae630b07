//! Infrastructure layer - Stores, credential checks and service wiring

pub mod api_key;
pub mod audit;
pub mod auth;
pub mod logging;
pub mod observability;
pub mod rate_limit;
pub mod secret;
pub mod storage;
