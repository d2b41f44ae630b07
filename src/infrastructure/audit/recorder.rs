//! Best-effort audit delivery
//!
//! [`AuditRecorder`] hands entries to a single background worker over a
//! bounded channel. The caller never waits on the sink: a full queue or a
//! failed write is logged and dropped.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::audit::{AuditEntry, AuditId, AuditSink};

/// Default number of queued audit commands
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

enum Command {
    Append(AuditEntry),
    Backfill {
        id: AuditId,
        status_code: u16,
        response_time_ms: u64,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle for submitting audit entries
///
/// Cloning is cheap; the worker stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct AuditRecorder {
    sender: mpsc::Sender<Command>,
}

impl AuditRecorder {
    /// Start the delivery worker writing into `sink`
    pub fn spawn(sink: Arc<dyn AuditSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(sink, receiver));

        (Self { sender }, worker)
    }

    /// Queue an entry and return its id without waiting for the write
    pub fn record(&self, entry: AuditEntry) -> AuditId {
        let id = entry.id();

        if let Err(e) = self.sender.try_send(Command::Append(entry)) {
            warn!(audit_id = %id, error = %e, "Audit entry dropped");
        }

        id
    }

    /// Queue a back-fill of the response fields of an earlier entry
    pub fn backfill(&self, id: AuditId, status_code: u16, response_time_ms: u64) {
        let command = Command::Backfill {
            id,
            status_code,
            response_time_ms,
        };

        if let Err(e) = self.sender.try_send(command) {
            warn!(audit_id = %id, error = %e, "Audit backfill dropped");
        }
    }

    /// Wait until every command queued before this call has been applied
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();

        if self.sender.send(Command::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }
}

async fn run_worker(sink: Arc<dyn AuditSink>, mut receiver: mpsc::Receiver<Command>) {
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Append(entry) => {
                let id = entry.id();
                match sink.append(entry).await {
                    Ok(_) => debug!(audit_id = %id, "Audit entry written"),
                    Err(e) => warn!(audit_id = %id, error = %e, "Failed to write audit entry"),
                }
            }
            Command::Backfill {
                id,
                status_code,
                response_time_ms,
            } => {
                if let Err(e) = sink.update(id, status_code, response_time_ms).await {
                    warn!(audit_id = %id, error = %e, "Failed to back-fill audit entry");
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!("Audit worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::MockAuditSink;
    use crate::domain::auth::{AuthError, RequestContext, ValidationResult};
    use crate::domain::DomainError;
    use crate::infrastructure::audit::InMemoryAuditSink;
    use chrono::Utc;

    fn entry() -> AuditEntry {
        AuditEntry::for_decision(
            Utc::now(),
            &RequestContext::new("GET", "/v1/whoami"),
            &ValidationResult::invalid(AuthError::MissingCredential),
        )
    }

    #[tokio::test]
    async fn test_record_then_backfill_applies_in_order() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let (recorder, _worker) = AuditRecorder::spawn(sink.clone(), 16);

        let id = recorder.record(entry());
        recorder.backfill(id, 401, 3);
        recorder.flush().await;

        let stored = sink.get(id).await.unwrap();
        assert_eq!(stored.status_code(), Some(401));
        assert_eq!(stored.response_time_ms(), Some(3));
    }

    #[tokio::test]
    async fn test_record_returns_entry_id() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let (recorder, _worker) = AuditRecorder::spawn(sink.clone(), 16);
        let entry = entry();
        let expected = entry.id();

        assert_eq!(recorder.record(entry), expected);
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let mut sink = MockAuditSink::new();
        sink.expect_append()
            .returning(|_| Err(DomainError::storage("audit db down")));
        sink.expect_update()
            .returning(|_, _, _| Err(DomainError::storage("audit db down")));

        let (recorder, _worker) = AuditRecorder::spawn(Arc::new(sink), 16);

        let id = recorder.record(entry());
        recorder.backfill(id, 200, 1);
        recorder.flush().await;
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (sender, _receiver) = mpsc::channel(1);
        let recorder = AuditRecorder { sender };

        recorder.record(entry());
        // Second command does not fit; record must still return immediately
        let id = recorder.record(entry());
        recorder.backfill(id, 200, 1);
    }

    #[tokio::test]
    async fn test_worker_stops_when_handles_dropped() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let (recorder, worker) = AuditRecorder::spawn(sink.clone(), 16);

        recorder.record(entry());
        drop(recorder);
        worker.await.unwrap();

        assert_eq!(sink.entries().await.len(), 1);
    }
}
