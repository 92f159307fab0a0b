//! Notified parties and the communications sent to them.

use breachflow_types::{
    ActorId, CommunicationId, CommunicationStatus, IncidentId, NotificationMethod,
    NotificationStatus, RecipientType, StakeholderId, StakeholderKind, TenantId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};

/// One notification target for one attempt. A retried send creates a new row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stakeholder {
    pub id: StakeholderId,
    pub incident_id: IncidentId,
    pub tenant_id: TenantId,
    pub kind: StakeholderKind,
    pub contact_name: Option<String>,
    pub contact_email: String,
    pub method: NotificationMethod,
    pub status: NotificationStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Stakeholder {
    pub fn pending(
        incident_id: IncidentId,
        tenant_id: TenantId,
        kind: StakeholderKind,
        contact_name: Option<String>,
        contact_email: String,
        method: NotificationMethod,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: StakeholderId::generate(),
            incident_id,
            tenant_id,
            kind,
            contact_name,
            contact_email,
            method,
            status: NotificationStatus::Pending,
            sent_at: None,
            created_at: now,
        }
    }

    /// Records the outcome of the send. Only `pending` rows can be marked.
    pub fn mark(&mut self, next: NotificationStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(WorkflowError::InvalidTransition(format!(
                "stakeholder {} cannot move from {} to {next}",
                self.id, self.status
            )));
        }
        self.status = next;
        if next == NotificationStatus::Sent {
            self.sent_at = Some(now);
        }
        Ok(())
    }
}

/// Record of one rendered message and its delivery outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Communication {
    pub id: CommunicationId,
    pub incident_id: IncidentId,
    pub tenant_id: TenantId,
    pub recipient: String,
    pub recipient_type: RecipientType,
    pub subject: String,
    pub body: String,
    pub template_name: String,
    pub method: NotificationMethod,
    pub status: CommunicationStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_by: ActorId,
    pub created_at: DateTime<Utc>,
}
