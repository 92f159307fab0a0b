//! Append-only incident timeline.
//!
//! [`TimelineRecorder`] can only add entries and read them back. Entries are
//! never altered or removed; the breach register is built from them.

use std::fmt;
use std::sync::Arc;

use breachflow_types::{ActorId, IncidentId, TenantId, TimelineEntryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::TimelineRepository;

/// What happened to an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventType {
    BreachCreated,
    SubmittedForVerification,
    BreachVerified,
    BreachRejected,
    DataPrincipalNotificationApproved,
    DpbNotified,
    DpbNotificationFailed,
    DataPrincipalsNotified,
    Escalation,
}

impl TimelineEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BreachCreated => "breach_created",
            Self::SubmittedForVerification => "submitted_for_verification",
            Self::BreachVerified => "breach_verified",
            Self::BreachRejected => "breach_rejected",
            Self::DataPrincipalNotificationApproved => "data_principal_notification_approved",
            Self::DpbNotified => "dpb_notified",
            Self::DpbNotificationFailed => "dpb_notification_failed",
            Self::DataPrincipalsNotified => "data_principals_notified",
            Self::Escalation => "escalation",
        }
    }
}

impl fmt::Display for TimelineEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: TimelineEntryId,
    pub incident_id: IncidentId,
    pub tenant_id: TenantId,
    pub event_type: TimelineEventType,
    pub description: String,
    /// `None` for system-initiated events such as escalation sweeps.
    pub performed_by: Option<ActorId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TimelineRecorder {
    repo: Arc<dyn TimelineRepository>,
}

impl TimelineRecorder {
    pub fn new(repo: Arc<dyn TimelineRepository>) -> Self {
        Self { repo }
    }

    /// Appends one entry and returns it.
    pub fn record(
        &self,
        incident_id: IncidentId,
        tenant_id: TenantId,
        event_type: TimelineEventType,
        description: impl Into<String>,
        performed_by: Option<ActorId>,
        occurred_at: DateTime<Utc>,
    ) -> Result<TimelineEntry> {
        let entry = TimelineEntry {
            id: TimelineEntryId::generate(),
            incident_id,
            tenant_id,
            event_type,
            description: description.into(),
            performed_by,
            occurred_at,
        };
        self.repo.append(&entry)?;
        Ok(entry)
    }

    pub fn for_incident(&self, incident_id: IncidentId) -> Result<Vec<TimelineEntry>> {
        Ok(self.repo.list(incident_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_entries_come_back_in_occurrence_order() {
        let recorder = TimelineRecorder::new(Arc::new(MemoryStore::new()));
        let incident = IncidentId::generate();
        let tenant = TenantId::generate();
        let t0 = Utc.with_ymd_and_hms(2025, 4, 1, 10, 0, 0).unwrap();

        recorder
            .record(incident, tenant, TimelineEventType::Escalation, "late", None, t0 + Duration::hours(1))
            .expect("append");
        recorder
            .record(incident, tenant, TimelineEventType::BreachCreated, "created", None, t0)
            .expect("append");
        recorder
            .record(incident, tenant, TimelineEventType::SubmittedForVerification, "same instant", None, t0)
            .expect("append");

        let entries = recorder.for_incident(incident).expect("list");
        let kinds: Vec<_> = entries.iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                TimelineEventType::BreachCreated,
                TimelineEventType::SubmittedForVerification,
                TimelineEventType::Escalation,
            ]
        );
    }

    #[test]
    fn test_event_type_wire_name() {
        let json = serde_json::to_string(&TimelineEventType::DpbNotified).expect("serialize");
        assert_eq!(json, "\"dpb_notified\"");
        assert_eq!(TimelineEventType::DpbNotified.to_string(), "dpb_notified");
    }
}
