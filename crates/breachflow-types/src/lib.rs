//! # breachflow-types: Core types for `breachflow`
//!
//! This crate contains shared types used across the breach-notification workflow:
//! - Entity IDs ([`TenantId`], [`IncidentId`], [`ActorId`], [`StakeholderId`],
//!   [`CommunicationId`], [`TimelineEntryId`])
//! - Incident classification ([`Severity`])
//! - Lifecycle states with legal-transition tables ([`IncidentStatus`],
//!   [`StageKind`], [`StageStatus`], [`NotificationStatus`])
//! - Notification routing ([`StakeholderKind`], [`RecipientType`],
//!   [`NotificationMethod`], [`CommunicationStatus`])
//!
//! Status, stage and severity names cross the wire as `snake_case` strings but
//! are compared as enums everywhere inside the workspace.

use std::fmt::{Debug, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors produced when parsing identifiers or enum names from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed {kind} identifier: {value:?}")]
    InvalidId { kind: &'static str, value: String },

    #[error("unknown {kind}: {value:?}")]
    UnknownVariant { kind: &'static str, value: String },
}

// ============================================================================
// Entity IDs - All Copy (16-byte UUIDs)
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| ParseError::InvalidId {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a tenant (data fiduciary organization).
    TenantId,
    "tenant"
);
uuid_id!(
    /// Unique identifier for a breach incident.
    IncidentId,
    "incident"
);
uuid_id!(
    /// Identifier of the person (or system account) performing an operation.
    ActorId,
    "actor"
);
uuid_id!(
    /// Unique identifier for a notified party row.
    StakeholderId,
    "stakeholder"
);
uuid_id!(
    /// Unique identifier for a communication record.
    CommunicationId,
    "communication"
);
uuid_id!(
    /// Unique identifier for a timeline entry.
    TimelineEntryId,
    "timeline entry"
);

// ============================================================================
// String conversions for closed enums
// ============================================================================

macro_rules! str_conversions {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Returns the canonical wire name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ParseError::UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

// ============================================================================
// Severity
// ============================================================================

/// Severity of a breach incident, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

str_conversions!(Severity, "severity", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

impl Severity {
    /// High and critical incidents put affected individuals on the short
    /// notification clock.
    pub fn is_urgent(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

// ============================================================================
// Incident status
// ============================================================================

/// Lifecycle status of a breach incident.
///
/// ```text
/// Draft -> PendingVerification -> Verified -> Notifying -> Notified
///                              -> Rejected      \-----------^
/// ```
///
/// `Rejected` and `Notified` are terminal. `Notified -> Notified` is allowed so
/// that a follow-up batch of data-principal notices can be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Draft,
    PendingVerification,
    Verified,
    Rejected,
    Notifying,
    Notified,
}

str_conversions!(IncidentStatus, "incident status", {
    Draft => "draft",
    PendingVerification => "pending_verification",
    Verified => "verified",
    Rejected => "rejected",
    Notifying => "notifying",
    Notified => "notified",
});

impl IncidentStatus {
    /// Legal-transition table for incident status.
    pub fn can_transition_to(self, next: IncidentStatus) -> bool {
        use IncidentStatus::{Draft, Notified, Notifying, PendingVerification, Rejected, Verified};

        matches!(
            (self, next),
            (Draft, PendingVerification)
                | (PendingVerification, Verified | Rejected)
                | (Verified | Notifying | Notified, Notified)
                | (Verified, Notifying)
        )
    }

    /// Terminal statuses end the verification/notification lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Notified)
    }
}

// ============================================================================
// Workflow stages
// ============================================================================

/// One step of the fixed six-step breach-handling workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Detection,
    Assessment,
    Containment,
    Verification,
    Notification,
    Resolution,
}

str_conversions!(StageKind, "workflow stage", {
    Detection => "detection",
    Assessment => "assessment",
    Containment => "containment",
    Verification => "verification",
    Notification => "notification",
    Resolution => "resolution",
});

impl StageKind {
    /// Every stage, in workflow order.
    pub const ALL: [StageKind; 6] = [
        Self::Detection,
        Self::Assessment,
        Self::Containment,
        Self::Verification,
        Self::Notification,
        Self::Resolution,
    ];

    /// Zero-based position in the workflow.
    pub fn ordinal(self) -> usize {
        match self {
            Self::Detection => 0,
            Self::Assessment => 1,
            Self::Containment => 2,
            Self::Verification => 3,
            Self::Notification => 4,
            Self::Resolution => 5,
        }
    }

    /// Only verification and notification are gated on a named approver.
    pub fn requires_approval(self) -> bool {
        matches!(self, Self::Verification | Self::Notification)
    }
}

/// Status of a single workflow stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    InProgress,
    /// Finished without an approval gate.
    Completed,
    Approved,
    Rejected,
}

str_conversions!(StageStatus, "stage status", {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Approved => "approved",
    Rejected => "rejected",
});

impl StageStatus {
    /// Legal-transition table for a stage.
    ///
    /// Gated stages finish only through approval or rejection of an
    /// in-progress stage; ungated stages finish by completion.
    pub fn can_transition_to(self, next: StageStatus, requires_approval: bool) -> bool {
        use StageStatus::{Approved, Completed, InProgress, Pending, Rejected};

        match (self, next) {
            (Pending, InProgress) => true,
            (Pending | InProgress, Completed) => !requires_approval,
            (InProgress, Approved | Rejected) => requires_approval,
            _ => false,
        }
    }

    /// Whether the stage has reached a final outcome.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Approved | Self::Rejected)
    }
}

// ============================================================================
// Notification routing
// ============================================================================

/// Kind of notified party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeholderKind {
    /// The statutory regulator (Data Protection Board).
    Dpb,
    /// An individual whose personal data was affected.
    AffectedIndividual,
}

str_conversions!(StakeholderKind, "stakeholder kind", {
    Dpb => "dpb",
    AffectedIndividual => "affected_individual",
});

impl StakeholderKind {
    /// Template audience for this kind of stakeholder.
    pub fn recipient_type(self) -> RecipientType {
        match self {
            Self::Dpb => RecipientType::Dpb,
            Self::AffectedIndividual => RecipientType::DataPrincipal,
        }
    }
}

/// Audience a notification template is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientType {
    Dpb,
    DataPrincipal,
}

str_conversions!(RecipientType, "recipient type", {
    Dpb => "dpb",
    DataPrincipal => "data_principal",
});

/// Per-recipient delivery status. Moves only `Pending -> Sent | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

str_conversions!(NotificationStatus, "notification status", {
    Pending => "pending",
    Sent => "sent",
    Failed => "failed",
});

impl NotificationStatus {
    pub fn can_transition_to(self, next: NotificationStatus) -> bool {
        matches!((self, next), (Self::Pending, Self::Sent | Self::Failed))
    }
}

/// Channel a notice is delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationMethod {
    #[default]
    Email,
    Sms,
    Postal,
    Portal,
}

str_conversions!(NotificationMethod, "notification method", {
    Email => "email",
    Sms => "sms",
    Postal => "postal",
    Portal => "portal",
});

/// Outcome recorded on a communication row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStatus {
    Sent,
    Failed,
}

str_conversions!(CommunicationStatus, "communication status", {
    Sent => "sent",
    Failed => "failed",
});
