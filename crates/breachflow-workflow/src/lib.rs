//! # breachflow-workflow
//!
//! The breach-notification engine: deadlines, the six-stage approval workflow,
//! regulator and data-principal notification, and the append-only timeline.
//!
//! # Architecture
//!
//! ```text
//! BreachWorkflowService
//!   ├── deadline           pure SLA arithmetic
//!   ├── WorkflowStageTracker
//!   ├── StakeholderNotifier ── Notifier (external send)
//!   │                       └─ TemplateStore + TemplateRenderer
//!   ├── TimelineRecorder   append-only
//!   └── WorkflowStore      one repository per entity
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use breachflow_types::{ActorId, Severity, TenantId};
//! use breachflow_workflow::{
//!     BreachWorkflowService, MemoryStore, NewBreachIncident, RecordingNotifier,
//! };
//! use chrono::Utc;
//!
//! let service = BreachWorkflowService::builder(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(RecordingNotifier::new()),
//! )
//! .build()
//! .expect("service");
//!
//! let incident = service
//!     .create_breach_with_workflow(
//!         NewBreachIncident {
//!             tenant_id: TenantId::generate(),
//!             title: "Leaked API keys".into(),
//!             description: String::new(),
//!             breach_type: None,
//!             breach_date: Utc::now(),
//!             detection_date: None,
//!             containment_date: None,
//!             severity: Some(Severity::Critical),
//!             affected_users_count: 0,
//!         },
//!         ActorId::generate(),
//!     )
//!     .expect("created");
//!
//! assert_eq!(service.get_stages(incident.id).expect("stages").len(), 6);
//! ```

pub mod clock;
pub mod deadline;
pub mod error;
pub mod incident;
pub mod notify;
pub mod service;
pub mod sla;
pub mod stage;
pub mod stakeholder;
pub mod store;
pub mod template;
pub mod timeline;

pub use clock::{Clock, ManualClock, SystemClock};
pub use deadline::{Deadlines, compute_deadlines};
pub use error::{ErrorKind, Result, WorkflowError};
pub use incident::{Approval, BreachIncident, NewBreachIncident};
pub use notify::{
    DpbContact, FanOutReport, Notifier, RecipientOutcome, RecordingNotifier, SendError,
    SentMessage, StakeholderNotifier,
};
pub use service::{
    BreachWorkflowService, BreachWorkflowServiceBuilder, DEFAULT_FANOUT_WORKERS,
    EscalationReport, RegisterEntry, VerificationDecision, WorkflowSettings,
};
pub use sla::{SlaReport, TrackSla};
pub use stage::{WorkflowStage, WorkflowStageTracker};
pub use stakeholder::{Communication, Stakeholder};
pub use store::{MemoryStore, StoreError, WorkflowStore};
pub use template::{
    MemoryTemplateStore, NotificationTemplate, PlaceholderRenderer, TemplateContext,
    TemplateError, TemplateRenderer, TemplateStore,
};
pub use timeline::{TimelineEntry, TimelineEventType, TimelineRecorder};
