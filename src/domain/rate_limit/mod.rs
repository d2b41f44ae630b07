//! Fixed-window quota types and the counter store contract

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::domain::api_key::ApiKeyId;
use crate::domain::DomainError;

/// Granularity of a quota window
///
/// Windows are aligned to UTC wall-clock boundaries (top of the hour,
/// midnight), not to the first request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Hour,
    Day,
}

impl WindowKind {
    pub fn length(&self) -> Duration {
        match self {
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::days(1),
        }
    }

    /// Floor `now` to the start of the window containing it
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let len = self.length().num_seconds();
        let secs = now.timestamp();
        let start = secs - secs.rem_euclid(len);

        DateTime::from_timestamp(start, 0).unwrap_or(now)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }
}

impl std::fmt::Display for WindowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request count for one key in one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindowCounter {
    pub window_start: DateTime<Utc>,
    pub count: i64,
}

impl RateWindowCounter {
    pub fn new(window_start: DateTime<Utc>) -> Self {
        Self {
            window_start,
            count: 0,
        }
    }

    /// Increment within `window_start`, resetting first if the window moved on
    pub fn increment_in(&mut self, window_start: DateTime<Utc>) -> i64 {
        if self.window_start != window_start {
            *self = Self::new(window_start);
        }

        self.count += 1;
        self.count
    }
}

/// Outcome of a quota check for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Admit,
    Deny { window: WindowKind },
}

impl RateDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit)
    }
}

/// Shared counter storage with an atomic increment primitive
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter for `(key_id, kind, window_start)`,
    /// creating it at zero if absent, and return the post-increment value
    async fn increment_and_get(
        &self,
        key_id: &ApiKeyId,
        kind: WindowKind,
        window_start: DateTime<Utc>,
    ) -> Result<i64, DomainError>;
}
