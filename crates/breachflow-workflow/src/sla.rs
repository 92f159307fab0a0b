//! SLA compliance evaluation.

use breachflow_types::IncidentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::incident::BreachIncident;

/// Status of one notification track (regulator or data principals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSla {
    pub deadline: DateTime<Utc>,
    pub notified: bool,
    pub notified_at: Option<DateTime<Utc>>,
    pub within_sla: bool,
    /// Only meaningful while not yet notified; always `false` afterwards.
    pub overdue: bool,
}

impl TrackSla {
    pub fn evaluate(
        deadline: DateTime<Utc>,
        notified_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        match notified_at {
            Some(at) => Self {
                deadline,
                notified: true,
                notified_at: Some(at),
                within_sla: at < deadline,
                overdue: false,
            },
            None => Self {
                deadline,
                notified: false,
                notified_at: None,
                within_sla: now < deadline,
                overdue: now > deadline,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaReport {
    pub incident_id: IncidentId,
    pub checked_at: DateTime<Utc>,
    pub dpb: TrackSla,
    pub data_principal: TrackSla,
    pub is_overdue: bool,
}

impl SlaReport {
    pub fn for_incident(incident: &BreachIncident, now: DateTime<Utc>) -> Self {
        Self {
            incident_id: incident.id,
            checked_at: now,
            dpb: TrackSla::evaluate(incident.dpb_deadline(), incident.dpb_reported_at(), now),
            data_principal: TrackSla::evaluate(
                incident.data_principal_deadline(),
                incident.data_principal_notified_at(),
                now,
            ),
            is_overdue: incident.is_overdue_at(now),
        }
    }
}
