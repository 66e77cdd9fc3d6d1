//! Audit event - structured change record emitted by the workflow.
//!
//! The core only emits these; persisting and querying them belongs to the
//! audit collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    MemberUpdated,
    RequestApproved,
    RequestRejected,
    RequestRevoked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::MemberUpdated => "member_updated",
            AuditAction::RequestApproved => "request_approved",
            AuditAction::RequestRejected => "request_rejected",
            AuditAction::RequestRevoked => "request_revoked",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub action: AuditAction,
    /// Free-form context. Field names only, never field values.
    pub details: String,
    pub performed_by: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        action: AuditAction,
        details: impl Into<String>,
        performed_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            action,
            details: details.into(),
            performed_by: performed_by.into(),
            created_at: now,
        }
    }
}
