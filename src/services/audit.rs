//! Audit emission collaborator.
//!
//! The core emits structured [`AuditEvent`]s; persistence and querying are
//! external. Sinks swallow their own failures so a broken audit pipeline
//! never rolls back the state transition that produced the event.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::models::AuditEvent;

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Production default until a persistence-backed sink is wired in: emits
/// the event into the structured log stream.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        tracing::info!(
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            action = event.action.as_str(),
            details = %event.details,
            performed_by = %event.performed_by,
            "Audit event"
        );
    }
}

/// Recording mock for tests.
#[derive(Default)]
pub struct MockAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MockAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("mock mutex poisoned").clone()
    }
}

#[async_trait]
impl AuditSink for MockAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().expect("mock mutex poisoned").push(event);
    }
}
