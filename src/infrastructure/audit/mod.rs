//! Audit trail delivery and sinks

mod in_memory;
mod postgres;
mod recorder;

pub use in_memory::InMemoryAuditSink;
pub use postgres::PostgresAuditSink;
pub use recorder::{AuditRecorder, DEFAULT_QUEUE_CAPACITY};
