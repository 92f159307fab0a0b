//! Breach workflow endpoints.
//!
//! Each handler is a direct call into the matching [`BreachWorkflowService`]
//! operation. Service calls block on the repository locks, so they run on
//! the blocking pool.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use breachflow_types::{IncidentId, Severity, TenantId};
use breachflow_workflow::{
    BreachIncident, BreachWorkflowService, Communication, EscalationReport, FanOutReport,
    NewBreachIncident, RegisterEntry, SlaReport, Stakeholder, TimelineEntry, VerificationDecision,
    WorkflowError, WorkflowStage,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ApiError;
use crate::extract::{ApiJson, RequestContext};
use crate::state::AppState;

/// Body of `POST /breaches`. The tenant comes from the request context.
#[derive(Debug, Deserialize)]
pub struct CreateBreachRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub breach_type: Option<String>,
    pub breach_date: DateTime<Utc>,
    #[serde(default)]
    pub detection_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub containment_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub affected_users_count: u64,
}

/// Reads an optional severity, treating `""` like an absent value.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<Severity>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

impl CreateBreachRequest {
    fn into_new(self, tenant_id: TenantId) -> NewBreachIncident {
        NewBreachIncident {
            tenant_id,
            title: self.title,
            description: self.description,
            breach_type: self.breach_type,
            breach_date: self.breach_date,
            detection_date: self.detection_date,
            containment_date: self.containment_date,
            severity: self.severity,
            affected_users_count: self.affected_users_count,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub approved: bool,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DataPrincipalNotificationRequest {
    pub affected_emails: Vec<String>,
}

/// Response of `GET /breaches/{id}`.
#[derive(Debug, Serialize)]
pub struct BreachDetail {
    pub incident: BreachIncident,
    pub stages: Vec<WorkflowStage>,
    pub stakeholders: Vec<Stakeholder>,
    pub communications: Vec<Communication>,
}

/// POST /breaches
pub async fn create_breach(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiJson(req): ApiJson<CreateBreachRequest>,
) -> Result<Response, ApiError> {
    let actor = ctx.actor()?;
    let new = req.into_new(ctx.tenant_id);

    let incident = run(state, move |service| {
        service.create_breach_with_workflow(new, actor)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(incident)).into_response())
}

/// POST /breaches/submit-for-verification/{id}
pub async fn submit_for_verification(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<IncidentId>,
) -> Result<Json<BreachIncident>, ApiError> {
    let actor = ctx.actor()?;
    let incident = run(state, move |service| {
        owned_by(service, id, ctx.tenant_id)?;
        service.submit_for_verification(id, actor)
    })
    .await?;

    Ok(Json(incident))
}

/// POST /breaches/verify/{id}
pub async fn verify_breach(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<IncidentId>,
    ApiJson(req): ApiJson<VerifyRequest>,
) -> Result<Json<BreachIncident>, ApiError> {
    let actor = ctx.actor()?;
    let decision = VerificationDecision::from_flag(req.approved, req.rejection_reason)?;

    let incident = run(state, move |service| {
        owned_by(service, id, ctx.tenant_id)?;
        service.verify_breach(id, actor, decision)
    })
    .await?;

    Ok(Json(incident))
}

/// POST /breaches/approve-data-principal-notification/{id}
pub async fn approve_data_principal_notification(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<IncidentId>,
) -> Result<Json<BreachIncident>, ApiError> {
    let actor = ctx.actor()?;
    let incident = run(state, move |service| {
        owned_by(service, id, ctx.tenant_id)?;
        service.approve_data_principal_notification(id, actor)
    })
    .await?;

    Ok(Json(incident))
}

/// POST /breaches/send-dpb-notification/{id}
pub async fn send_dpb_notification(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<IncidentId>,
) -> Result<Json<Stakeholder>, ApiError> {
    let actor = ctx.actor()?;
    let stakeholder = run(state, move |service| {
        owned_by(service, id, ctx.tenant_id)?;
        service.send_dpb_notification(id, actor)
    })
    .await?;

    Ok(Json(stakeholder))
}

/// POST /breaches/send-data-principal-notifications/{id}
pub async fn send_data_principal_notifications(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<IncidentId>,
    ApiJson(req): ApiJson<DataPrincipalNotificationRequest>,
) -> Result<Json<FanOutReport>, ApiError> {
    let actor = ctx.actor()?;
    let report = run(state, move |service| {
        owned_by(service, id, ctx.tenant_id)?;
        service.send_data_principal_notifications(id, &req.affected_emails, actor)
    })
    .await?;

    Ok(Json(report))
}

/// GET /breaches/sla-status/{id}
pub async fn sla_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<IncidentId>,
) -> Result<Json<SlaReport>, ApiError> {
    let report = run(state, move |service| {
        owned_by(service, id, ctx.tenant_id)?;
        service.check_sla_compliance(id)
    })
    .await?;

    Ok(Json(report))
}

/// GET /breaches/breach-register
pub async fn breach_register(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<RegisterEntry>>, ApiError> {
    let register = run(state, move |service| {
        service.get_breach_register(ctx.tenant_id)
    })
    .await?;

    Ok(Json(register))
}

/// POST /breaches/escalate-overdue
pub async fn escalate_overdue(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<EscalationReport>, ApiError> {
    let report = run(state, move |service| {
        service.escalate_overdue_breaches(ctx.tenant_id)
    })
    .await?;

    Ok(Json(report))
}

/// GET /breaches/{id}
pub async fn get_breach(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<IncidentId>,
) -> Result<Json<BreachDetail>, ApiError> {
    let detail = run(state, move |service| {
        let incident = owned_by(service, id, ctx.tenant_id)?;
        Ok(BreachDetail {
            stages: service.get_stages(id)?,
            stakeholders: service.get_stakeholders(id)?,
            communications: service.get_communications(id)?,
            incident,
        })
    })
    .await?;

    Ok(Json(detail))
}

/// GET /breaches/{id}/timeline
pub async fn get_timeline(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<IncidentId>,
) -> Result<Json<Vec<TimelineEntry>>, ApiError> {
    let timeline = run(state, move |service| {
        owned_by(service, id, ctx.tenant_id)?;
        service.get_timeline(id)
    })
    .await?;

    Ok(Json(timeline))
}

async fn run<T, F>(state: AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&BreachWorkflowService) -> breachflow_workflow::Result<T> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(move || f(state.service.as_ref())).await??)
}

/// Loads an incident, hiding other tenants' incidents behind not-found.
fn owned_by(
    service: &BreachWorkflowService,
    id: IncidentId,
    tenant_id: TenantId,
) -> breachflow_workflow::Result<BreachIncident> {
    let incident = service.get_incident(id)?;
    if incident.tenant_id != tenant_id {
        return Err(WorkflowError::incident_not_found(id));
    }
    Ok(incident)
}
