//! Workflow error taxonomy.
//!
//! Callers (and the auditors reading their logs) must be able to tell "not
//! allowed yet" from "failed to deliver" from "not found". [`WorkflowError::kind`]
//! collapses the variants into that coarse classification.

use breachflow_types::{IncidentId, ParseError};
use thiserror::Error;

use crate::notify::SendError;
use crate::store::StoreError;
use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed input. Nothing was mutated.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The incident is in the wrong workflow state. Nothing was mutated.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The stage or status transition table refused the move.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The outbound send failed. The stakeholder row is already marked failed.
    #[error("failed to deliver notification to {recipient}: {source}")]
    Transport {
        recipient: String,
        #[source]
        source: SendError,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to build notification worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Coarse classification of a [`WorkflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Precondition,
    Transport,
    Conflict,
    Internal,
}

impl WorkflowError {
    pub fn incident_not_found(id: IncidentId) -> Self {
        Self::NotFound {
            entity: "breach incident",
            id: id.to_string(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } | Self::Template(TemplateError::NotFound { .. }) => {
                ErrorKind::NotFound
            }
            Self::Template(TemplateError::SystemTemplate { .. })
            | Self::Precondition(_)
            | Self::InvalidTransition(_) => ErrorKind::Precondition,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Store(StoreError::VersionConflict { .. }) => ErrorKind::Conflict,
            Self::Store(_) | Self::ThreadPool(_) => ErrorKind::Internal,
        }
    }
}

impl From<ParseError> for WorkflowError {
    fn from(err: ParseError) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breachflow_types::RecipientType;

    #[test]
    fn test_error_kinds_are_distinguishable() {
        let id = IncidentId::generate();

        assert_eq!(
            WorkflowError::incident_not_found(id).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            WorkflowError::precondition("must be verified").kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            WorkflowError::Transport {
                recipient: "dpb@example.org".into(),
                source: SendError::Unavailable("smtp down".into()),
            }
            .kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            WorkflowError::from(TemplateError::NotFound {
                name: "missing".into(),
                recipient_type: RecipientType::Dpb,
            })
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            WorkflowError::from(StoreError::VersionConflict {
                id,
                expected: 1,
                found: 2
            })
            .kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn test_parse_errors_become_validation_errors() {
        let err: WorkflowError = "xyz"
            .parse::<IncidentId>()
            .expect_err("malformed id")
            .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
