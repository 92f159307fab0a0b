//! Persistence boundary.
//!
//! One repository trait per entity. The workflow never assumes cross-entity
//! transactions: `BreachIncident::status` is the source of truth, and the
//! incident repository enforces an optimistic version on every update.
//!
//! [`MemoryStore`] implements every repository and backs tests and the
//! default server.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use breachflow_types::{IncidentId, StageKind, StakeholderId, TenantId};
use thiserror::Error;

use crate::incident::BreachIncident;
use crate::stage::WorkflowStage;
use crate::stakeholder::{Communication, Stakeholder};
use crate::timeline::TimelineEntry;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer saved the incident after the caller loaded it.
    #[error("incident {id} was modified concurrently (expected version {expected}, found {found})")]
    VersionConflict {
        id: IncidentId,
        expected: u64,
        found: u64,
    },

    #[error("{entity} already exists: {id}")]
    Duplicate { entity: &'static str, id: String },

    #[error("{entity} does not exist: {id}")]
    Missing { entity: &'static str, id: String },

    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub trait IncidentRepository: Send + Sync {
    fn create(&self, incident: &BreachIncident) -> Result<()>;

    fn get(&self, id: IncidentId) -> Result<Option<BreachIncident>>;

    /// Persists `incident` if the stored version still equals
    /// `incident.version()`. Returns the saved copy with its new version.
    fn update(&self, incident: &BreachIncident) -> Result<BreachIncident>;

    fn list_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<BreachIncident>>;
}

pub trait StageRepository: Send + Sync {
    fn create_all(&self, stages: &[WorkflowStage]) -> Result<()>;

    /// Stages of one incident in workflow order.
    fn list(&self, incident_id: IncidentId) -> Result<Vec<WorkflowStage>>;

    fn update(&self, stage: &WorkflowStage) -> Result<()>;
}

pub trait StakeholderRepository: Send + Sync {
    fn create(&self, stakeholder: &Stakeholder) -> Result<()>;

    fn update(&self, stakeholder: &Stakeholder) -> Result<()>;

    /// Stakeholders of one incident in creation order.
    fn list(&self, incident_id: IncidentId) -> Result<Vec<Stakeholder>>;
}

pub trait CommunicationRepository: Send + Sync {
    fn create(&self, communication: &Communication) -> Result<()>;

    fn list(&self, incident_id: IncidentId) -> Result<Vec<Communication>>;
}

/// Append-only: entries are never updated or deleted.
pub trait TimelineRepository: Send + Sync {
    fn append(&self, entry: &TimelineEntry) -> Result<()>;

    /// Entries of one incident ordered by occurrence time. Entries with equal
    /// timestamps keep their append order.
    fn list(&self, incident_id: IncidentId) -> Result<Vec<TimelineEntry>>;
}

/// A backend that provides every repository.
pub trait WorkflowStore:
    IncidentRepository
    + StageRepository
    + StakeholderRepository
    + CommunicationRepository
    + TimelineRepository
{
}

impl<T> WorkflowStore for T where
    T: IncidentRepository
        + StageRepository
        + StakeholderRepository
        + CommunicationRepository
        + TimelineRepository
{
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Mutex-guarded maps. Each table has its own lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    incidents: Mutex<HashMap<IncidentId, BreachIncident>>,
    stages: Mutex<HashMap<IncidentId, Vec<WorkflowStage>>>,
    stakeholders: Mutex<HashMap<IncidentId, Vec<Stakeholder>>>,
    communications: Mutex<HashMap<IncidentId, Vec<Communication>>>,
    timeline: Mutex<HashMap<IncidentId, Vec<TimelineEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl IncidentRepository for MemoryStore {
    fn create(&self, incident: &BreachIncident) -> Result<()> {
        let mut incidents = lock(&self.incidents);
        if incidents.contains_key(&incident.id) {
            return Err(StoreError::Duplicate {
                entity: "breach incident",
                id: incident.id.to_string(),
            });
        }
        incidents.insert(incident.id, incident.clone());
        Ok(())
    }

    fn get(&self, id: IncidentId) -> Result<Option<BreachIncident>> {
        Ok(lock(&self.incidents).get(&id).cloned())
    }

    fn update(&self, incident: &BreachIncident) -> Result<BreachIncident> {
        let mut incidents = lock(&self.incidents);
        let stored = incidents.get_mut(&incident.id).ok_or_else(|| StoreError::Missing {
            entity: "breach incident",
            id: incident.id.to_string(),
        })?;

        if stored.version() != incident.version() {
            return Err(StoreError::VersionConflict {
                id: incident.id,
                expected: incident.version(),
                found: stored.version(),
            });
        }

        let mut saved = incident.clone();
        saved.bump_version();
        *stored = saved.clone();
        Ok(saved)
    }

    fn list_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<BreachIncident>> {
        Ok(lock(&self.incidents)
            .values()
            .filter(|i| i.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

impl StageRepository for MemoryStore {
    fn create_all(&self, stages: &[WorkflowStage]) -> Result<()> {
        let mut table = lock(&self.stages);
        for stage in stages {
            let rows = table.entry(stage.incident_id).or_default();
            if rows.iter().any(|s| s.stage == stage.stage) {
                return Err(StoreError::Duplicate {
                    entity: "workflow stage",
                    id: format!("{}/{}", stage.incident_id, stage.stage),
                });
            }
            rows.push(stage.clone());
        }
        Ok(())
    }

    fn list(&self, incident_id: IncidentId) -> Result<Vec<WorkflowStage>> {
        let mut rows = lock(&self.stages)
            .get(&incident_id)
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|s| s.stage.ordinal());
        Ok(rows)
    }

    fn update(&self, stage: &WorkflowStage) -> Result<()> {
        let mut table = lock(&self.stages);
        let row = table
            .get_mut(&stage.incident_id)
            .and_then(|rows| rows.iter_mut().find(|s| s.stage == stage.stage))
            .ok_or_else(|| missing_stage(stage.incident_id, stage.stage))?;
        *row = stage.clone();
        Ok(())
    }
}

fn missing_stage(incident_id: IncidentId, stage: StageKind) -> StoreError {
    StoreError::Missing {
        entity: "workflow stage",
        id: format!("{incident_id}/{stage}"),
    }
}

impl StakeholderRepository for MemoryStore {
    fn create(&self, stakeholder: &Stakeholder) -> Result<()> {
        lock(&self.stakeholders)
            .entry(stakeholder.incident_id)
            .or_default()
            .push(stakeholder.clone());
        Ok(())
    }

    fn update(&self, stakeholder: &Stakeholder) -> Result<()> {
        let mut table = lock(&self.stakeholders);
        let row = table
            .get_mut(&stakeholder.incident_id)
            .and_then(|rows| rows.iter_mut().find(|s| s.id == stakeholder.id))
            .ok_or_else(|| missing_stakeholder(stakeholder.id))?;
        *row = stakeholder.clone();
        Ok(())
    }

    fn list(&self, incident_id: IncidentId) -> Result<Vec<Stakeholder>> {
        Ok(lock(&self.stakeholders)
            .get(&incident_id)
            .cloned()
            .unwrap_or_default())
    }
}

fn missing_stakeholder(id: StakeholderId) -> StoreError {
    StoreError::Missing {
        entity: "stakeholder",
        id: id.to_string(),
    }
}

impl CommunicationRepository for MemoryStore {
    fn create(&self, communication: &Communication) -> Result<()> {
        lock(&self.communications)
            .entry(communication.incident_id)
            .or_default()
            .push(communication.clone());
        Ok(())
    }

    fn list(&self, incident_id: IncidentId) -> Result<Vec<Communication>> {
        Ok(lock(&self.communications)
            .get(&incident_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl TimelineRepository for MemoryStore {
    fn append(&self, entry: &TimelineEntry) -> Result<()> {
        let mut table = lock(&self.timeline);
        let rows = table.entry(entry.incident_id).or_default();
        if rows.iter().any(|e| e.id == entry.id) {
            return Err(StoreError::Duplicate {
                entity: "timeline entry",
                id: entry.id.to_string(),
            });
        }
        rows.push(entry.clone());
        Ok(())
    }

    fn list(&self, incident_id: IncidentId) -> Result<Vec<TimelineEntry>> {
        let mut rows = lock(&self.timeline)
            .get(&incident_id)
            .cloned()
            .unwrap_or_default();
        // Stable: equal timestamps keep append order.
        rows.sort_by_key(|e| e.occurred_at);
        Ok(rows)
    }
}
