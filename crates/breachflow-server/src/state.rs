//! Shared state for HTTP handlers.

use std::sync::Arc;

use breachflow_config::WorkflowConfig;
use breachflow_workflow::{
    BreachWorkflowService, DpbContact, MemoryStore, Notifier, WorkflowSettings,
};

use crate::notifier::LogNotifier;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BreachWorkflowService>,
}

impl AppState {
    pub fn new(service: Arc<BreachWorkflowService>) -> Self {
        Self { service }
    }

    /// Builds an in-memory service with the given transport.
    pub fn with_notifier(
        config: &WorkflowConfig,
        notifier: Arc<dyn Notifier>,
    ) -> breachflow_workflow::Result<Self> {
        let service = BreachWorkflowService::builder(Arc::new(MemoryStore::new()), notifier)
            .settings(settings_from(config))
            .build()?;

        Ok(Self::new(Arc::new(service)))
    }

    /// In-memory service that logs outbound notices.
    pub fn from_config(config: &WorkflowConfig) -> breachflow_workflow::Result<Self> {
        Self::with_notifier(config, Arc::new(LogNotifier))
    }
}

fn settings_from(config: &WorkflowConfig) -> WorkflowSettings {
    WorkflowSettings {
        dpb: DpbContact {
            name: config.dpb_contact_name.clone(),
            email: config.dpb_contact_email.clone(),
            method: config.notification_method,
        },
        fanout_workers: config.fanout_workers,
    }
}
