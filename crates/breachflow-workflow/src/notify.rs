//! Outbound notification to the regulator and to affected individuals.
//!
//! The actual send is delegated to a [`Notifier`]. Retries and timeouts are
//! that collaborator's business; this module records what was attempted.
//!
//! # Fan-out
//!
//! Data-principal notices are sent on a bounded rayon pool. For each recipient
//! the stakeholder row is written before the send is attempted, and the
//! aggregate [`FanOutReport`] is computed only after every recipient has been
//! attempted. One recipient failing never aborts the batch.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use breachflow_types::{
    ActorId, CommunicationId, CommunicationStatus, IncidentStatus, NotificationMethod,
    NotificationStatus, RecipientType, StakeholderId, StakeholderKind,
};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{Result, WorkflowError};
use crate::incident::BreachIncident;
use crate::stakeholder::{Communication, Stakeholder};
use crate::store::{CommunicationRepository, StakeholderRepository};
use crate::template::{
    DATA_PRINCIPAL_NOTIFICATION_TEMPLATE, DPB_NOTIFICATION_TEMPLATE, RenderedMessage,
    TemplateContext, TemplateRenderer, TemplateStore,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The transport refused this recipient.
    #[error("recipient rejected: {0}")]
    Rejected(String),

    /// The transport could not be reached.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Outbound message transport.
pub trait Notifier: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> std::result::Result<(), SendError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Keeps every delivered message in memory. Recipients registered with
/// [`RecordingNotifier::fail_for`] are rejected.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, recipient: impl Into<String>) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(recipient.into());
    }

    pub fn recover(&self, recipient: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(recipient);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, to: &str, subject: &str, body: &str) -> std::result::Result<(), SendError> {
        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(to)
        {
            return Err(SendError::Rejected(to.to_string()));
        }

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentMessage {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        Ok(())
    }
}

/// Regulator contact used for every DPB notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpbContact {
    pub name: String,
    pub email: String,
    pub method: NotificationMethod,
}

impl Default for DpbContact {
    fn default() -> Self {
        Self {
            name: "Data Protection Board of India".to_string(),
            email: "dpb@meity.gov.in".to_string(),
            method: NotificationMethod::Email,
        }
    }
}

/// Per-recipient result of a fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientOutcome {
    pub recipient: String,
    /// `None` when the stakeholder row itself could not be written.
    pub stakeholder_id: Option<StakeholderId>,
    pub delivered: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanOutReport {
    pub success_count: u64,
    pub fail_count: u64,
    pub outcomes: Vec<RecipientOutcome>,
}

impl FanOutReport {
    fn from_outcomes(outcomes: Vec<RecipientOutcome>) -> Self {
        let success_count = outcomes.iter().filter(|o| o.delivered).count() as u64;
        let fail_count = outcomes.len() as u64 - success_count;
        Self {
            success_count,
            fail_count,
            outcomes,
        }
    }
}

/// Sends notices and records stakeholder and communication rows.
pub struct StakeholderNotifier {
    notifier: Arc<dyn Notifier>,
    templates: Arc<dyn TemplateStore>,
    renderer: Arc<dyn TemplateRenderer>,
    stakeholders: Arc<dyn StakeholderRepository>,
    communications: Arc<dyn CommunicationRepository>,
    clock: Arc<dyn Clock>,
    pool: rayon::ThreadPool,
    dpb: DpbContact,
}

pub(crate) struct NotifierParts {
    pub notifier: Arc<dyn Notifier>,
    pub templates: Arc<dyn TemplateStore>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub stakeholders: Arc<dyn StakeholderRepository>,
    pub communications: Arc<dyn CommunicationRepository>,
    pub clock: Arc<dyn Clock>,
    pub dpb: DpbContact,
    pub workers: usize,
}

impl StakeholderNotifier {
    pub(crate) fn new(parts: NotifierParts) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parts.workers.max(1))
            .thread_name(|i| format!("breachflow-notify-{i}"))
            .build()?;

        Ok(Self {
            notifier: parts.notifier,
            templates: parts.templates,
            renderer: parts.renderer,
            stakeholders: parts.stakeholders,
            communications: parts.communications,
            clock: parts.clock,
            pool,
            dpb: parts.dpb,
        })
    }

    pub fn dpb_contact(&self) -> &DpbContact {
        &self.dpb
    }

    /// Sends the regulator notice for a verified incident.
    ///
    /// The template is resolved before anything is written, so a missing
    /// template leaves no rows behind. On a failed send the stakeholder row is
    /// marked failed, a failed communication is recorded, and
    /// [`WorkflowError::Transport`] is returned.
    pub fn notify_dpb(&self, incident: &BreachIncident, sent_by: ActorId) -> Result<Stakeholder> {
        if incident.status() != IncidentStatus::Verified {
            return Err(WorkflowError::precondition(format!(
                "breach must be verified before DPB notification (status: {})",
                incident.status()
            )));
        }

        let template = self
            .templates
            .get_template(DPB_NOTIFICATION_TEMPLATE, RecipientType::Dpb)?;
        let message = RenderedMessage::render(
            &template,
            self.renderer.as_ref(),
            &TemplateContext::from_incident(incident),
        );

        let mut stakeholder = Stakeholder::pending(
            incident.id,
            incident.tenant_id,
            StakeholderKind::Dpb,
            Some(self.dpb.name.clone()),
            self.dpb.email.clone(),
            self.dpb.method,
            self.clock.now(),
        );
        self.stakeholders.create(&stakeholder)?;

        let sent = self
            .notifier
            .send(&stakeholder.contact_email, &message.subject, &message.body);

        let now = self.clock.now();
        let status = if sent.is_ok() {
            NotificationStatus::Sent
        } else {
            NotificationStatus::Failed
        };
        stakeholder.mark(status, now)?;
        self.stakeholders.update(&stakeholder)?;
        self.record_communication(
            incident,
            &stakeholder,
            &message,
            sent.as_ref().err(),
            sent_by,
        )?;

        match sent {
            Ok(()) => Ok(stakeholder),
            Err(source) => {
                warn!(
                    incident_id = %incident.id,
                    recipient = %stakeholder.contact_email,
                    error = %source,
                    "DPB notification failed"
                );
                Err(WorkflowError::Transport {
                    recipient: stakeholder.contact_email,
                    source,
                })
            }
        }
    }

    /// Sends the data-principal notice to every recipient.
    pub fn notify_data_principals(
        &self,
        incident: &BreachIncident,
        recipients: &[String],
        sent_by: ActorId,
    ) -> Result<FanOutReport> {
        if !incident.data_principal_notification_approved() {
            return Err(WorkflowError::precondition(
                "data principal notification must be approved first",
            ));
        }
        validate_recipients(recipients)?;

        let template = self.templates.get_template(
            DATA_PRINCIPAL_NOTIFICATION_TEMPLATE,
            RecipientType::DataPrincipal,
        )?;
        let message = RenderedMessage::render(
            &template,
            self.renderer.as_ref(),
            &TemplateContext::from_incident(incident),
        );

        let outcomes: Vec<RecipientOutcome> = self.pool.install(|| {
            recipients
                .par_iter()
                .map(|recipient| self.deliver_one(incident, recipient.trim(), &message, sent_by))
                .collect()
        });

        let report = FanOutReport::from_outcomes(outcomes);
        debug_assert_eq!(
            report.success_count + report.fail_count,
            recipients.len() as u64
        );
        Ok(report)
    }

    /// One recipient of a fan-out. Errors are folded into the outcome.
    fn deliver_one(
        &self,
        incident: &BreachIncident,
        recipient: &str,
        message: &RenderedMessage,
        sent_by: ActorId,
    ) -> RecipientOutcome {
        let mut stakeholder = Stakeholder::pending(
            incident.id,
            incident.tenant_id,
            StakeholderKind::AffectedIndividual,
            None,
            recipient.to_string(),
            message.method,
            self.clock.now(),
        );

        if let Err(e) = self.stakeholders.create(&stakeholder) {
            warn!(incident_id = %incident.id, recipient, error = %e, "could not record stakeholder");
            return RecipientOutcome {
                recipient: recipient.to_string(),
                stakeholder_id: None,
                delivered: false,
                error: Some(e.to_string()),
            };
        }

        let sent = if is_deliverable(recipient) {
            self.notifier.send(recipient, &message.subject, &message.body)
        } else {
            Err(SendError::Rejected(format!(
                "malformed recipient address: {recipient:?}"
            )))
        };
        let status = if sent.is_ok() {
            NotificationStatus::Sent
        } else {
            NotificationStatus::Failed
        };

        let recorded = stakeholder.mark(status, self.clock.now()).and_then(|()| {
            self.stakeholders.update(&stakeholder)?;
            self.record_communication(
                incident,
                &stakeholder,
                message,
                sent.as_ref().err(),
                sent_by,
            )
        });
        if let Err(e) = recorded {
            warn!(incident_id = %incident.id, recipient, error = %e, "could not record delivery outcome");
        }

        match sent {
            Ok(()) => {
                debug!(incident_id = %incident.id, recipient, "data principal notified");
                RecipientOutcome {
                    recipient: recipient.to_string(),
                    stakeholder_id: Some(stakeholder.id),
                    delivered: true,
                    error: None,
                }
            }
            Err(e) => {
                warn!(incident_id = %incident.id, recipient, error = %e, "data principal notification failed");
                RecipientOutcome {
                    recipient: recipient.to_string(),
                    stakeholder_id: Some(stakeholder.id),
                    delivered: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn record_communication(
        &self,
        incident: &BreachIncident,
        stakeholder: &Stakeholder,
        message: &RenderedMessage,
        error: Option<&SendError>,
        sent_by: ActorId,
    ) -> Result<()> {
        let now = self.clock.now();
        let communication = Communication {
            id: CommunicationId::generate(),
            incident_id: incident.id,
            tenant_id: incident.tenant_id,
            recipient: stakeholder.contact_email.clone(),
            recipient_type: stakeholder.kind.recipient_type(),
            subject: message.subject.clone(),
            body: message.body.clone(),
            template_name: message.template_name.clone(),
            method: stakeholder.method,
            status: if error.is_none() {
                CommunicationStatus::Sent
            } else {
                CommunicationStatus::Failed
            },
            sent_at: stakeholder.sent_at,
            error_message: error.map(ToString::to_string),
            created_by: sent_by,
            created_at: now,
        };
        self.communications.create(&communication)?;
        Ok(())
    }
}

fn validate_recipients(recipients: &[String]) -> Result<()> {
    if recipients.is_empty() {
        return Err(WorkflowError::Validation(
            "at least one recipient is required".to_string(),
        ));
    }
    Ok(())
}

/// Malformed addresses are still recorded, as failed deliveries.
fn is_deliverable(recipient: &str) -> bool {
    !recipient.is_empty() && recipient.contains('@')
}
