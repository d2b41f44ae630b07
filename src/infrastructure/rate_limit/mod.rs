//! Fixed-window quota enforcement and counter stores

mod in_memory;
mod limiter;
mod redis;

pub use in_memory::InMemoryCounterStore;
pub use limiter::RateLimiter;
pub use redis::{RedisCounterConfig, RedisCounterStore};
