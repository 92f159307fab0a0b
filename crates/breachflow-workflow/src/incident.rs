//! The breach incident aggregate.
//!
//! [`BreachIncident`] owns its lifecycle fields. They are private and only
//! change through the `pub(crate)` transition methods below, each of which
//! consults the [`IncidentStatus`] transition table. Deadlines are computed once
//! in [`BreachIncident::open`] and have no setter.
//!
//! Every persisted update carries the `version` the caller loaded; repositories
//! reject a save whose version no longer matches.

use breachflow_types::{ActorId, IncidentId, IncidentStatus, Severity, StageKind, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deadline::{self, Deadlines};
use crate::error::{Result, WorkflowError};

/// Input for creating an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBreachIncident {
    pub tenant_id: TenantId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub breach_type: Option<String>,
    pub breach_date: DateTime<Utc>,
    /// Defaults to the creation time when absent.
    #[serde(default)]
    pub detection_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub containment_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub affected_users_count: u64,
}

impl NewBreachIncident {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "breach title must not be empty".to_string(),
            ));
        }

        if let Some(detected) = self.detection_date {
            if detected < self.breach_date {
                return Err(WorkflowError::Validation(format!(
                    "detection date {detected} precedes breach date {}",
                    self.breach_date
                )));
            }
        }

        if let Some(contained) = self.containment_date {
            if contained < self.breach_date {
                return Err(WorkflowError::Validation(format!(
                    "containment date {contained} precedes breach date {}",
                    self.breach_date
                )));
            }
        }

        Ok(())
    }
}

/// A recorded approval: who, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub by: ActorId,
    pub at: DateTime<Utc>,
}

/// One data-breach incident and its notification state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreachIncident {
    pub id: IncidentId,
    pub tenant_id: TenantId,
    pub title: String,
    pub description: String,
    pub breach_type: Option<String>,
    pub breach_date: DateTime<Utc>,
    pub containment_date: Option<DateTime<Utc>>,
    pub severity: Option<Severity>,
    pub affected_users_count: u64,
    pub created_by: ActorId,
    pub created_at: DateTime<Utc>,

    status: IncidentStatus,
    current_stage: StageKind,
    deadlines: Deadlines,
    dpb_reported_at: Option<DateTime<Utc>>,
    data_principal_approval: Option<Approval>,
    data_principal_notified_at: Option<DateTime<Utc>>,
    notified_users_count: u64,
    is_overdue: bool,
    verification: Option<Approval>,
    version: u64,
}

impl BreachIncident {
    /// Creates a draft incident in the detection stage with its deadlines fixed.
    pub fn open(
        new: NewBreachIncident,
        id: IncidentId,
        created_by: ActorId,
        now: DateTime<Utc>,
    ) -> Self {
        let deadlines = deadline::compute_deadlines(new.detection_date, new.severity, now);

        Self {
            id,
            tenant_id: new.tenant_id,
            title: new.title,
            description: new.description,
            breach_type: new.breach_type,
            breach_date: new.breach_date,
            containment_date: new.containment_date,
            severity: new.severity,
            affected_users_count: new.affected_users_count,
            created_by,
            created_at: now,
            status: IncidentStatus::Draft,
            current_stage: StageKind::Detection,
            deadlines,
            dpb_reported_at: None,
            data_principal_approval: None,
            data_principal_notified_at: None,
            notified_users_count: 0,
            is_overdue: deadline::is_dpb_overdue(now, deadlines.dpb, false),
            verification: None,
            version: 0,
        }
    }

    pub fn status(&self) -> IncidentStatus {
        self.status
    }

    pub fn current_stage(&self) -> StageKind {
        self.current_stage
    }

    pub fn detection_date(&self) -> DateTime<Utc> {
        self.deadlines.detected_at
    }

    pub fn deadlines(&self) -> Deadlines {
        self.deadlines
    }

    pub fn dpb_deadline(&self) -> DateTime<Utc> {
        self.deadlines.dpb
    }

    pub fn data_principal_deadline(&self) -> DateTime<Utc> {
        self.deadlines.data_principal
    }

    pub fn dpb_reported(&self) -> bool {
        self.dpb_reported_at.is_some()
    }

    pub fn dpb_reported_at(&self) -> Option<DateTime<Utc>> {
        self.dpb_reported_at
    }

    pub fn data_principal_notification_approved(&self) -> bool {
        self.data_principal_approval.is_some()
    }

    pub fn data_principal_approval(&self) -> Option<Approval> {
        self.data_principal_approval
    }

    pub fn data_principal_notified_at(&self) -> Option<DateTime<Utc>> {
        self.data_principal_notified_at
    }

    pub fn notified_users_count(&self) -> u64 {
        self.notified_users_count
    }

    /// Stored overdue flag, as last set at creation or by an escalation sweep.
    pub fn is_overdue(&self) -> bool {
        self.is_overdue
    }

    /// Overdue as of `now`: the stored flag, or a regulator deadline that has
    /// since passed without a report.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.is_overdue || deadline::is_dpb_overdue(now, self.deadlines.dpb, self.dpb_reported())
    }

    pub fn verification(&self) -> Option<Approval> {
        self.verification
    }

    /// Optimistic-concurrency token.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Called by repositories when they persist an update.
    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn advance(&mut self, next: IncidentStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(WorkflowError::InvalidTransition(format!(
                "incident {} cannot move from {} to {next}",
                self.id, self.status
            )));
        }
        self.status = next;
        Ok(())
    }

    pub(crate) fn submit_for_verification(&mut self) -> Result<()> {
        self.advance(IncidentStatus::PendingVerification)?;
        self.current_stage = StageKind::Verification;
        Ok(())
    }

    pub(crate) fn mark_verified(&mut self, by: ActorId, at: DateTime<Utc>) -> Result<()> {
        self.advance(IncidentStatus::Verified)?;
        self.verification = Some(Approval { by, at });
        self.current_stage = StageKind::Notification;
        Ok(())
    }

    pub(crate) fn mark_rejected(&mut self) -> Result<()> {
        self.advance(IncidentStatus::Rejected)
    }

    pub(crate) fn approve_data_principal_notification(
        &mut self,
        by: ActorId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != IncidentStatus::Verified {
            return Err(WorkflowError::precondition(format!(
                "breach must be verified before approving data principal notification (status: {})",
                self.status
            )));
        }
        self.data_principal_approval = Some(Approval { by, at });
        Ok(())
    }

    pub(crate) fn mark_dpb_reported(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.advance(IncidentStatus::Notifying)?;
        self.dpb_reported_at = Some(at);
        Ok(())
    }

    /// Records a completed fan-out batch. The first batch fixes the notification
    /// time used for SLA evaluation; later batches only add to the count.
    pub(crate) fn mark_data_principals_notified(
        &mut self,
        at: DateTime<Utc>,
        delivered: u64,
    ) -> Result<()> {
        self.advance(IncidentStatus::Notified)?;
        self.data_principal_notified_at.get_or_insert(at);
        self.notified_users_count += delivered;
        Ok(())
    }

    pub(crate) fn flag_overdue(&mut self) {
        self.is_overdue = true;
    }
}
