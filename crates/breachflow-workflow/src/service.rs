//! The breach workflow orchestrator.
//!
//! [`BreachWorkflowService`] is the only way to mutate an incident. Every
//! mutating operation follows the same shape:
//!
//! ```text
//! lock(incident) -> load -> check precondition -> transition -> save(version)
//!                -> stage changes -> exactly one timeline entry
//! ```
//!
//! Precondition failures return before anything is written. Operations on the
//! same incident are serialized by a per-incident lock, and the repository
//! rejects any save whose version is stale.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use breachflow_types::{ActorId, IncidentId, IncidentStatus, StageKind, StageStatus, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, WorkflowError};
use crate::incident::{BreachIncident, NewBreachIncident};
use crate::notify::{DpbContact, FanOutReport, Notifier, NotifierParts, StakeholderNotifier};
use crate::sla::SlaReport;
use crate::stage::{WorkflowStage, WorkflowStageTracker};
use crate::stakeholder::{Communication, Stakeholder};
use crate::store::{CommunicationRepository, IncidentRepository, StakeholderRepository, WorkflowStore};
use crate::template::{MemoryTemplateStore, PlaceholderRenderer, TemplateRenderer, TemplateStore};
use crate::timeline::{TimelineEntry, TimelineEventType, TimelineRecorder};

/// Default size of the data-principal notification pool.
pub const DEFAULT_FANOUT_WORKERS: usize = 4;

/// Tunables for the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub dpb: DpbContact,
    pub fanout_workers: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            dpb: DpbContact::default(),
            fanout_workers: DEFAULT_FANOUT_WORKERS,
        }
    }
}

/// Outcome of a verification review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum VerificationDecision {
    Approve,
    Reject { reason: String },
}

impl VerificationDecision {
    /// Builds a decision from an approve flag and optional reason. A rejection
    /// must carry a non-blank reason.
    pub fn from_flag(approved: bool, rejection_reason: Option<String>) -> Result<Self> {
        if approved {
            return Ok(Self::Approve);
        }

        match rejection_reason {
            Some(reason) if !reason.trim().is_empty() => Ok(Self::Reject { reason }),
            _ => Err(WorkflowError::Validation(
                "a rejection reason is required when verification is rejected".to_string(),
            )),
        }
    }
}

/// Incidents flagged by one escalation sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationReport {
    pub tenant_id: TenantId,
    pub checked_at: DateTime<Utc>,
    pub escalated: Vec<IncidentId>,
}

/// One line of the breach register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterEntry {
    pub incident: BreachIncident,
    pub timeline: Vec<TimelineEntry>,
}

/// Per-incident mutexes. The map holds weak handles, so a slot is
/// dropped once no operation holds it and pruned on the next lookup.
#[derive(Debug, Default)]
struct IncidentLocks {
    slots: Mutex<HashMap<IncidentId, Weak<Mutex<()>>>>,
}

impl IncidentLocks {
    fn slot(&self, id: IncidentId) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(live) = slots.get(&id).and_then(Weak::upgrade) {
            return live;
        }

        slots.retain(|_, slot| slot.strong_count() > 0);
        let slot = Arc::new(Mutex::new(()));
        slots.insert(id, Arc::downgrade(&slot));
        slot
    }
}

pub struct BreachWorkflowService {
    incidents: Arc<dyn IncidentRepository>,
    stakeholders: Arc<dyn StakeholderRepository>,
    communications: Arc<dyn CommunicationRepository>,
    stages: WorkflowStageTracker,
    timeline: TimelineRecorder,
    notifier: StakeholderNotifier,
    templates: Arc<dyn TemplateStore>,
    clock: Arc<dyn Clock>,
    locks: IncidentLocks,
}

/// Builder for [`BreachWorkflowService`].
pub struct BreachWorkflowServiceBuilder<S> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
    templates: Arc<dyn TemplateStore>,
    renderer: Arc<dyn TemplateRenderer>,
    clock: Arc<dyn Clock>,
    settings: WorkflowSettings,
}

impl<S: WorkflowStore + 'static> BreachWorkflowServiceBuilder<S> {
    /// Replaces the seeded system templates.
    pub fn templates(mut self, templates: Arc<dyn TemplateStore>) -> Self {
        self.templates = templates;
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<BreachWorkflowService> {
        if self.settings.fanout_workers == 0 {
            return Err(WorkflowError::Validation(
                "fanout_workers must be at least 1".to_string(),
            ));
        }

        let notifier = StakeholderNotifier::new(NotifierParts {
            notifier: self.notifier,
            templates: self.templates.clone(),
            renderer: self.renderer,
            stakeholders: self.store.clone(),
            communications: self.store.clone(),
            clock: self.clock.clone(),
            dpb: self.settings.dpb,
            workers: self.settings.fanout_workers,
        })?;

        Ok(BreachWorkflowService {
            incidents: self.store.clone(),
            stakeholders: self.store.clone(),
            communications: self.store.clone(),
            stages: WorkflowStageTracker::new(self.store.clone()),
            timeline: TimelineRecorder::new(self.store),
            notifier,
            templates: self.templates,
            clock: self.clock,
            locks: IncidentLocks::default(),
        })
    }
}

impl BreachWorkflowService {
    /// Starts a builder with system templates, placeholder rendering, the
    /// system clock and default settings.
    pub fn builder<S: WorkflowStore + 'static>(
        store: Arc<S>,
        notifier: Arc<dyn Notifier>,
    ) -> BreachWorkflowServiceBuilder<S> {
        BreachWorkflowServiceBuilder {
            store,
            notifier,
            templates: Arc::new(MemoryTemplateStore::with_system_templates()),
            renderer: Arc::new(PlaceholderRenderer),
            clock: Arc::new(SystemClock),
            settings: WorkflowSettings::default(),
        }
    }

    pub fn templates(&self) -> &Arc<dyn TemplateStore> {
        &self.templates
    }

    pub fn dpb_contact(&self) -> &DpbContact {
        self.notifier.dpb_contact()
    }

    fn load(&self, id: IncidentId) -> Result<BreachIncident> {
        self.incidents
            .get(id)?
            .ok_or_else(|| WorkflowError::incident_not_found(id))
    }

    fn record(
        &self,
        incident: &BreachIncident,
        event_type: TimelineEventType,
        description: impl Into<String>,
        performed_by: Option<ActorId>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.timeline.record(
            incident.id,
            incident.tenant_id,
            event_type,
            description,
            performed_by,
            at,
        )?;
        Ok(())
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    /// Opens an incident with its deadlines, six stages and a creation entry.
    pub fn create_breach_with_workflow(
        &self,
        new: NewBreachIncident,
        created_by: ActorId,
    ) -> Result<BreachIncident> {
        new.validate()?;

        let now = self.clock.now();
        let incident = BreachIncident::open(new, IncidentId::generate(), created_by, now);

        self.incidents.create(&incident)?;
        self.stages
            .initialize_stages(incident.id, incident.tenant_id, now)?;
        self.record(
            &incident,
            TimelineEventType::BreachCreated,
            format!("Breach incident created: {}", incident.title),
            Some(created_by),
            now,
        )?;

        info!(
            incident_id = %incident.id,
            tenant_id = %incident.tenant_id,
            dpb_deadline = %incident.dpb_deadline(),
            data_principal_deadline = %incident.data_principal_deadline(),
            "breach incident created"
        );
        Ok(incident)
    }

    /// Moves a draft incident into verification.
    pub fn submit_for_verification(&self, id: IncidentId, by: ActorId) -> Result<BreachIncident> {
        let slot = self.locks.slot(id);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let mut incident = self.load(id)?;
        if incident.status() != IncidentStatus::Draft {
            return Err(WorkflowError::precondition(format!(
                "only draft breaches can be submitted for verification (status: {})",
                incident.status()
            )));
        }

        let now = self.clock.now();
        incident.submit_for_verification()?;
        let incident = self.incidents.update(&incident)?;
        self.stages.advance_to(id, StageKind::Verification, now)?;
        self.record(
            &incident,
            TimelineEventType::SubmittedForVerification,
            "Breach submitted for verification",
            Some(by),
            now,
        )?;

        info!(incident_id = %id, "breach submitted for verification");
        Ok(incident)
    }

    /// Approves or rejects the verification stage.
    ///
    /// Approval opens the notification stage. Rejection is terminal; there is
    /// no resubmission path.
    pub fn verify_breach(
        &self,
        id: IncidentId,
        by: ActorId,
        decision: VerificationDecision,
    ) -> Result<BreachIncident> {
        let slot = self.locks.slot(id);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let mut incident = self.load(id)?;
        if incident.status() != IncidentStatus::PendingVerification {
            return Err(WorkflowError::precondition(format!(
                "breach must be pending verification (status: {})",
                incident.status()
            )));
        }

        let now = self.clock.now();
        match decision {
            VerificationDecision::Approve => {
                incident.mark_verified(by, now)?;
                incident = self.incidents.update(&incident)?;
                self.stages
                    .approve_stage(id, StageKind::Verification, by, now)?;
                self.stages.update_stage_status(
                    id,
                    StageKind::Notification,
                    StageStatus::InProgress,
                    now,
                )?;
                self.record(
                    &incident,
                    TimelineEventType::BreachVerified,
                    "Breach verified",
                    Some(by),
                    now,
                )?;
                info!(incident_id = %id, verified_by = %by, "breach verified");
            }
            VerificationDecision::Reject { reason } => {
                incident.mark_rejected()?;
                incident = self.incidents.update(&incident)?;
                self.stages
                    .reject_stage(id, StageKind::Verification, by, &reason, now)?;
                self.record(
                    &incident,
                    TimelineEventType::BreachRejected,
                    format!("Breach verification rejected: {reason}"),
                    Some(by),
                    now,
                )?;
                info!(incident_id = %id, rejected_by = %by, "breach verification rejected");
            }
        }

        Ok(incident)
    }

    pub fn approve_data_principal_notification(
        &self,
        id: IncidentId,
        by: ActorId,
    ) -> Result<BreachIncident> {
        let slot = self.locks.slot(id);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let mut incident = self.load(id)?;
        if incident.data_principal_notification_approved() {
            return Err(WorkflowError::precondition(
                "data principal notification is already approved",
            ));
        }

        let now = self.clock.now();
        incident.approve_data_principal_notification(by, now)?;
        let incident = self.incidents.update(&incident)?;
        self.record(
            &incident,
            TimelineEventType::DataPrincipalNotificationApproved,
            "Data principal notification approved",
            Some(by),
            now,
        )?;

        info!(incident_id = %id, approved_by = %by, "data principal notification approved");
        Ok(incident)
    }

    /// Notifies the regulator.
    ///
    /// A transport failure still leaves a failed stakeholder row, a failed
    /// communication and a `dpb_notification_failed` timeline entry before the
    /// error is returned. The incident itself is unchanged and the call can be
    /// retried.
    pub fn send_dpb_notification(&self, id: IncidentId, by: ActorId) -> Result<Stakeholder> {
        let slot = self.locks.slot(id);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let mut incident = self.load(id)?;
        let stakeholder = match self.notifier.notify_dpb(&incident, by) {
            Ok(stakeholder) => stakeholder,
            Err(WorkflowError::Transport { recipient, source }) => {
                self.record(
                    &incident,
                    TimelineEventType::DpbNotificationFailed,
                    format!("DPB notification to {recipient} failed: {source}"),
                    Some(by),
                    self.clock.now(),
                )?;
                return Err(WorkflowError::Transport { recipient, source });
            }
            Err(e) => return Err(e),
        };

        let now = self.clock.now();
        incident.mark_dpb_reported(now)?;
        let incident = self.incidents.update(&incident)?;
        self.record(
            &incident,
            TimelineEventType::DpbNotified,
            "Data Protection Board notified",
            Some(by),
            now,
        )?;

        let within_sla = now < incident.dpb_deadline();
        info!(incident_id = %id, within_sla, "Data Protection Board notified");
        Ok(stakeholder)
    }

    /// Notifies affected individuals. Individual failures are counted, not
    /// raised. A later call sends a follow-up batch and adds to the count.
    pub fn send_data_principal_notifications(
        &self,
        id: IncidentId,
        recipients: &[String],
        by: ActorId,
    ) -> Result<FanOutReport> {
        let slot = self.locks.slot(id);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let mut incident = self.load(id)?;
        if incident.status().is_terminal() && incident.status() != IncidentStatus::Notified {
            return Err(WorkflowError::precondition(format!(
                "cannot notify data principals of a {} breach",
                incident.status()
            )));
        }

        let report = self
            .notifier
            .notify_data_principals(&incident, recipients, by)?;

        let now = self.clock.now();
        let first_batch = incident.status() != IncidentStatus::Notified;
        incident.mark_data_principals_notified(now, report.success_count)?;
        let incident = self.incidents.update(&incident)?;

        if first_batch {
            let approver = incident
                .data_principal_approval()
                .map_or(by, |approval| approval.by);
            self.stages
                .approve_stage(id, StageKind::Notification, approver, now)?;
        }

        self.record(
            &incident,
            TimelineEventType::DataPrincipalsNotified,
            format!(
                "Notified {} affected individuals ({} failed)",
                report.success_count, report.fail_count
            ),
            Some(by),
            now,
        )?;

        info!(
            incident_id = %id,
            success_count = report.success_count,
            fail_count = report.fail_count,
            "data principals notified"
        );
        Ok(report)
    }

    // ========================================================================
    // SLA tracking
    // ========================================================================

    /// Read-only SLA snapshot for both notification tracks.
    pub fn check_sla_compliance(&self, id: IncidentId) -> Result<SlaReport> {
        let incident = self.load(id)?;
        Ok(SlaReport::for_incident(&incident, self.clock.now()))
    }

    /// Flags every unreported incident of `tenant_id` whose regulator deadline
    /// has passed. Incidents already flagged are skipped.
    pub fn escalate_overdue_breaches(&self, tenant_id: TenantId) -> Result<EscalationReport> {
        let now = self.clock.now();
        let needs_escalation =
            |i: &BreachIncident| !i.is_overdue() && !i.dpb_reported() && now > i.dpb_deadline();

        let candidates: Vec<IncidentId> = self
            .incidents
            .list_for_tenant(tenant_id)?
            .into_iter()
            .filter(|i| needs_escalation(i))
            .map(|i| i.id)
            .collect();

        let mut escalated = Vec::with_capacity(candidates.len());
        for id in candidates {
            let slot = self.locks.slot(id);
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

            // State may have moved since the scan.
            let mut incident = self.load(id)?;
            if !needs_escalation(&incident) {
                continue;
            }

            incident.flag_overdue();
            let incident = self.incidents.update(&incident)?;
            self.record(
                &incident,
                TimelineEventType::Escalation,
                "DPB notification deadline exceeded - escalated",
                None,
                now,
            )?;

            // TODO: alert tenant administrators once a notification channel for
            // internal recipients exists.
            warn!(
                incident_id = %id,
                tenant_id = %tenant_id,
                dpb_deadline = %incident.dpb_deadline(),
                "breach escalated: DPB notification overdue"
            );
            escalated.push(id);
        }

        info!(tenant_id = %tenant_id, escalated = escalated.len(), "escalation sweep finished");
        Ok(EscalationReport {
            tenant_id,
            checked_at: now,
            escalated,
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Every incident of the tenant with its timeline, ordered by detection.
    pub fn get_breach_register(&self, tenant_id: TenantId) -> Result<Vec<RegisterEntry>> {
        let mut incidents = self.incidents.list_for_tenant(tenant_id)?;
        incidents.sort_by_key(|i| (i.detection_date(), i.created_at));

        incidents
            .into_iter()
            .map(|incident| {
                let timeline = self.timeline.for_incident(incident.id)?;
                Ok(RegisterEntry { incident, timeline })
            })
            .collect()
    }

    pub fn get_incident(&self, id: IncidentId) -> Result<BreachIncident> {
        self.load(id)
    }

    pub fn get_stages(&self, id: IncidentId) -> Result<Vec<WorkflowStage>> {
        self.load(id)?;
        self.stages.stages(id)
    }

    pub fn get_stakeholders(&self, id: IncidentId) -> Result<Vec<Stakeholder>> {
        self.load(id)?;
        Ok(self.stakeholders.list(id)?)
    }

    pub fn get_communications(&self, id: IncidentId) -> Result<Vec<Communication>> {
        self.load(id)?;
        Ok(self.communications.list(id)?)
    }

    pub fn get_timeline(&self, id: IncidentId) -> Result<Vec<TimelineEntry>> {
        self.load(id)?;
        self.timeline.for_incident(id)
    }
}
