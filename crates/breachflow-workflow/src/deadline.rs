//! Statutory notification deadlines.
//!
//! Pure functions, no side effects:
//!
//! ```text
//! dpb_deadline            = detected_at + 72h                (any severity)
//! data_principal_deadline = detected_at + 24h                (high, critical)
//!                         = detected_at + 7 * 24h            (low, medium, unset)
//! ```
//!
//! When the detection time is unknown the caller-supplied `now` stands in.

use breachflow_types::Severity;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Regulator notification window, independent of severity.
pub const DPB_DEADLINE_HOURS: i64 = 72;

/// Data-principal window for high and critical incidents.
pub const URGENT_DATA_PRINCIPAL_HOURS: i64 = 24;

/// Data-principal window for everything else.
pub const STANDARD_DATA_PRINCIPAL_HOURS: i64 = 7 * 24;

/// The pair of SLA timestamps attached to an incident at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadlines {
    /// Detection time the deadlines were computed from.
    pub detected_at: DateTime<Utc>,
    pub dpb: DateTime<Utc>,
    pub data_principal: DateTime<Utc>,
}

/// Computes both deadlines for an incident.
pub fn compute_deadlines(
    detected_at: Option<DateTime<Utc>>,
    severity: Option<Severity>,
    now: DateTime<Utc>,
) -> Deadlines {
    let detected_at = detected_at.unwrap_or(now);

    let deadlines = Deadlines {
        detected_at,
        dpb: detected_at + Duration::hours(DPB_DEADLINE_HOURS),
        data_principal: detected_at + data_principal_window(severity),
    };

    debug_assert!(deadlines.data_principal > deadlines.detected_at);
    deadlines
}

/// Time allowed for notifying affected individuals.
pub fn data_principal_window(severity: Option<Severity>) -> Duration {
    match severity {
        Some(s) if s.is_urgent() => Duration::hours(URGENT_DATA_PRINCIPAL_HOURS),
        _ => Duration::hours(STANDARD_DATA_PRINCIPAL_HOURS),
    }
}

/// Derived overdue flag: the regulator deadline passed without a report.
pub fn is_dpb_overdue(now: DateTime<Utc>, dpb_deadline: DateTime<Utc>, dpb_reported: bool) -> bool {
    now > dpb_deadline && !dpb_reported
}
