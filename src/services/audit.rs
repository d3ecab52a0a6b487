//! Fire-and-forget audit event sink.
//!
//! Audit writes must never block or fail the primary request path: `record`
//! dispatches the write on a background task whose outcome is observed only
//! for logging.

use std::sync::Arc;

use crate::{db::AuditEventRepo, models::CreateAuditEvent};

/// The sink consumed by the identity core. A trait so deployments can swap
/// the database-backed sink for an external pipeline.
pub trait AuditSink: Send + Sync {
    /// Record an event. Returns immediately; failures are swallowed.
    fn record(&self, event: CreateAuditEvent);
}

pub type SharedAuditSink = Arc<dyn AuditSink>;

/// Audit sink backed by the audit_events table.
pub struct DbAuditSink {
    repo: Arc<dyn AuditEventRepo>,
}

impl DbAuditSink {
    pub fn new(repo: Arc<dyn AuditEventRepo>) -> Self {
        Self { repo }
    }
}

impl AuditSink for DbAuditSink {
    fn record(&self, event: CreateAuditEvent) {
        let repo = Arc::clone(&self.repo);
        tokio::spawn(async move {
            let action = event.action.clone();
            if let Err(e) = repo.create(event).await {
                tracing::warn!(action = %action, error = %e, "Failed to record audit event");
            }
        });
    }
}
