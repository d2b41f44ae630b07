//! Rate limiter
//!
//! Fixed-window counting at hour and day granularity against a shared
//! [`CounterStore`]. Windows are aligned to UTC boundaries, so a caller can
//! spend a full quota on each side of a boundary.

use std::sync::Arc;

use tracing::debug;

use crate::domain::api_key::ApiKeyId;
use crate::domain::rate_limit::{CounterStore, RateDecision, WindowKind};
use crate::domain::{Clock, DomainError};

/// Per-key quota enforcement
pub struct RateLimiter {
    counters: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(counters: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { counters, clock }
    }

    /// Count one request against both windows and decide admission
    ///
    /// Both counters are incremented even when the request ends up denied;
    /// increments are never rolled back. A non-positive quota denies without
    /// touching the store.
    pub async fn check_and_increment(
        &self,
        key_id: &ApiKeyId,
        hourly_quota: i64,
        daily_quota: i64,
    ) -> Result<RateDecision, DomainError> {
        if hourly_quota <= 0 {
            return Ok(RateDecision::Deny {
                window: WindowKind::Hour,
            });
        }

        if daily_quota <= 0 {
            return Ok(RateDecision::Deny {
                window: WindowKind::Day,
            });
        }

        let now = self.clock.now();
        let hour_start = WindowKind::Hour.window_start(now);
        let day_start = WindowKind::Day.window_start(now);

        let (hourly, daily) = tokio::try_join!(
            self.counters
                .increment_and_get(key_id, WindowKind::Hour, hour_start),
            self.counters
                .increment_and_get(key_id, WindowKind::Day, day_start),
        )?;

        debug!(
            key_id = %key_id,
            hourly,
            hourly_quota,
            daily,
            daily_quota,
            "Quota counters incremented"
        );

        if hourly > hourly_quota {
            return Ok(RateDecision::Deny {
                window: WindowKind::Hour,
            });
        }

        if daily > daily_quota {
            return Ok(RateDecision::Deny {
                window: WindowKind::Day,
            });
        }

        Ok(RateDecision::Admit)
    }
}
