//! The six-step stage tracker.
//!
//! Stages are created together when an incident is opened. Only `detection`
//! starts in progress. Every status change goes through
//! [`StageStatus::can_transition_to`], so a finished stage cannot be reopened
//! and a gated stage cannot be completed without an approver.

use std::sync::Arc;

use breachflow_types::{ActorId, IncidentId, StageKind, StageStatus, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};
use crate::store::StageRepository;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStage {
    pub incident_id: IncidentId,
    pub tenant_id: TenantId,
    pub stage: StageKind,
    pub status: StageStatus,
    pub requires_approval: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub approved_by: Option<ActorId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<ActorId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowStage {
    fn new(incident_id: IncidentId, tenant_id: TenantId, stage: StageKind) -> Self {
        Self {
            incident_id,
            tenant_id,
            stage,
            status: StageStatus::Pending,
            requires_approval: stage.requires_approval(),
            started_at: None,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            completed_at: None,
        }
    }

    fn transition(&mut self, next: StageStatus, at: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next, self.requires_approval) {
            return Err(WorkflowError::InvalidTransition(format!(
                "{} stage of incident {} cannot move from {} to {next}",
                self.stage, self.incident_id, self.status
            )));
        }

        self.status = next;
        if next == StageStatus::InProgress {
            self.started_at = Some(at);
        }
        if next.is_finished() {
            self.completed_at = Some(at);
        }
        Ok(())
    }
}

/// Drives stage rows through their legal transitions.
#[derive(Clone)]
pub struct WorkflowStageTracker {
    repo: Arc<dyn StageRepository>,
}

impl WorkflowStageTracker {
    pub fn new(repo: Arc<dyn StageRepository>) -> Self {
        Self { repo }
    }

    /// Creates all six stages with `detection` already in progress.
    pub fn initialize_stages(
        &self,
        incident_id: IncidentId,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkflowStage>> {
        let mut stages: Vec<WorkflowStage> = StageKind::ALL
            .into_iter()
            .map(|kind| WorkflowStage::new(incident_id, tenant_id, kind))
            .collect();
        stages[0].transition(StageStatus::InProgress, now)?;

        self.repo.create_all(&stages)?;

        debug_assert_eq!(
            stages
                .iter()
                .filter(|s| s.status == StageStatus::InProgress)
                .count(),
            1
        );
        Ok(stages)
    }

    pub fn stages(&self, incident_id: IncidentId) -> Result<Vec<WorkflowStage>> {
        Ok(self.repo.list(incident_id)?)
    }

    pub fn stage(&self, incident_id: IncidentId, kind: StageKind) -> Result<WorkflowStage> {
        self.repo
            .list(incident_id)?
            .into_iter()
            .find(|s| s.stage == kind)
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "workflow stage",
                id: format!("{incident_id}/{kind}"),
            })
    }

    /// Moves an ungated stage (or opens any stage) to `status`.
    pub fn update_stage_status(
        &self,
        incident_id: IncidentId,
        kind: StageKind,
        status: StageStatus,
        now: DateTime<Utc>,
    ) -> Result<WorkflowStage> {
        let mut stage = self.stage(incident_id, kind)?;
        stage.transition(status, now)?;
        self.repo.update(&stage)?;
        Ok(stage)
    }

    pub fn approve_stage(
        &self,
        incident_id: IncidentId,
        kind: StageKind,
        approver: ActorId,
        now: DateTime<Utc>,
    ) -> Result<WorkflowStage> {
        let mut stage = self.stage(incident_id, kind)?;
        stage.transition(StageStatus::Approved, now)?;
        stage.approved_by = Some(approver);
        stage.approved_at = Some(now);
        self.repo.update(&stage)?;
        Ok(stage)
    }

    pub fn reject_stage(
        &self,
        incident_id: IncidentId,
        kind: StageKind,
        approver: ActorId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<WorkflowStage> {
        let mut stage = self.stage(incident_id, kind)?;
        stage.transition(StageStatus::Rejected, now)?;
        stage.rejected_by = Some(approver);
        stage.rejected_at = Some(now);
        stage.rejection_reason = Some(reason.to_string());
        self.repo.update(&stage)?;
        Ok(stage)
    }

    /// Completes every unfinished ungated stage that precedes `kind` and opens
    /// `kind`.
    pub fn advance_to(
        &self,
        incident_id: IncidentId,
        kind: StageKind,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let stages = self.repo.list(incident_id)?;

        for mut stage in stages
            .into_iter()
            .filter(|s| s.stage.ordinal() < kind.ordinal() && !s.status.is_finished())
        {
            stage.transition(StageStatus::Completed, now)?;
            self.repo.update(&stage)?;
        }

        self.update_stage_status(incident_id, kind, StageStatus::InProgress, now)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn tracker() -> (WorkflowStageTracker, IncidentId) {
        let tracker = WorkflowStageTracker::new(Arc::new(MemoryStore::new()));
        let id = IncidentId::generate();
        tracker
            .initialize_stages(id, TenantId::generate(), Utc::now())
            .expect("init");
        (tracker, id)
    }

    #[test]
    fn test_initialize_creates_six_stages_with_detection_open() {
        let (tracker, id) = tracker();
        let stages = tracker.stages(id).expect("list");

        assert_eq!(stages.len(), 6);
        assert_eq!(stages[0].stage, StageKind::Detection);
        assert_eq!(stages[0].status, StageStatus::InProgress);
        assert!(stages[1..].iter().all(|s| s.status == StageStatus::Pending));
        assert!(stages[3].requires_approval && stages[4].requires_approval);
    }

    #[test]
    fn test_advance_completes_predecessors() {
        let (tracker, id) = tracker();
        tracker
            .advance_to(id, StageKind::Verification, Utc::now())
            .expect("advance");

        let stages = tracker.stages(id).expect("list");
        for stage in &stages[..3] {
            assert_eq!(stage.status, StageStatus::Completed);
            assert!(stage.completed_at.is_some());
        }
        assert_eq!(stages[3].status, StageStatus::InProgress);
    }

    #[test]
    fn test_gated_stage_cannot_be_completed() {
        let (tracker, id) = tracker();
        let err = tracker
            .update_stage_status(id, StageKind::Verification, StageStatus::Completed, Utc::now())
            .expect_err("gated");
        assert!(matches!(err, WorkflowError::InvalidTransition(_)));
    }

    #[test]
    fn test_approve_requires_in_progress() {
        let (tracker, id) = tracker();
        let approver = ActorId::generate();

        assert!(
            tracker
                .approve_stage(id, StageKind::Verification, approver, Utc::now())
                .is_err(),
            "pending stage cannot be approved"
        );

        tracker
            .advance_to(id, StageKind::Verification, Utc::now())
            .expect("advance");
        let stage = tracker
            .approve_stage(id, StageKind::Verification, approver, Utc::now())
            .expect("approve");
        assert_eq!(stage.status, StageStatus::Approved);
        assert_eq!(stage.approved_by, Some(approver));
        assert!(stage.completed_at.is_some());
    }

    #[test]
    fn test_reject_records_reason() {
        let (tracker, id) = tracker();
        tracker
            .advance_to(id, StageKind::Verification, Utc::now())
            .expect("advance");
        let stage = tracker
            .reject_stage(
                id,
                StageKind::Verification,
                ActorId::generate(),
                "false positive",
                Utc::now(),
            )
            .expect("reject");

        assert_eq!(stage.status, StageStatus::Rejected);
        assert_eq!(stage.rejection_reason.as_deref(), Some("false positive"));
    }
}
