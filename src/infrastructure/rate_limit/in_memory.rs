//! In-memory counter store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::api_key::ApiKeyId;
use crate::domain::rate_limit::{CounterStore, RateWindowCounter, WindowKind};
use crate::domain::DomainError;

/// Single-process counter store
///
/// Holds one counter per key and window kind; an increment in a newer window
/// replaces the stale counter. Increments are serialized by one write lock,
/// which makes them linearizable within this process only.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: RwLock<HashMap<(ApiKeyId, WindowKind), RateWindowCounter>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count for a key, or zero if the window has moved on
    pub async fn current(
        &self,
        key_id: &ApiKeyId,
        kind: WindowKind,
        window_start: DateTime<Utc>,
    ) -> i64 {
        let counters = self.counters.read().await;

        counters
            .get(&(*key_id, kind))
            .filter(|counter| counter.window_start == window_start)
            .map_or(0, |counter| counter.count)
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_and_get(
        &self,
        key_id: &ApiKeyId,
        kind: WindowKind,
        window_start: DateTime<Utc>,
    ) -> Result<i64, DomainError> {
        let mut counters = self.counters.write().await;

        let counter = counters
            .entry((*key_id, kind))
            .or_insert_with(|| RateWindowCounter::new(window_start));

        Ok(counter.increment_in(window_start))
    }
}
