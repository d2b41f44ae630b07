//! Response back-fill for audit entries

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::api::state::AppState;
use crate::domain::audit::AuditId;

/// Per-request slot the credential extractors fill with their audit id
#[derive(Debug, Clone, Default)]
pub struct AuditSlot(Arc<OnceLock<AuditId>>);

impl AuditSlot {
    /// First writer wins
    pub fn set(&self, id: AuditId) {
        let _ = self.0.set(id);
    }

    pub fn get(&self) -> Option<AuditId> {
        self.0.get().copied()
    }
}

/// Fill status code and response time once the handler has answered
///
/// Requests that never ran a credential extractor have nothing to back-fill.
pub async fn audit_response_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let slot = AuditSlot::default();
    request.extensions_mut().insert(slot.clone());

    let response = next.run(request).await;

    if let Some(audit_id) = slot.get() {
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        state
            .validator
            .audit()
            .backfill(audit_id, response.status().as_u16(), elapsed_ms);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_keeps_first_id() {
        let slot = AuditSlot::default();
        let first = AuditId::generate();

        assert_eq!(slot.get(), None);

        slot.set(first);
        slot.clone().set(AuditId::generate());

        assert_eq!(slot.get(), Some(first));
    }
}
