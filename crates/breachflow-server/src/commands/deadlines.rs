//! `breachflow deadlines`: print the statutory deadlines for an incident.

use anyhow::{Context, Result};
use breachflow_types::Severity;
use breachflow_workflow::compute_deadlines;
use chrono::{DateTime, Utc};

pub fn run(severity: Option<&str>, detected_at: Option<&str>) -> Result<()> {
    let severity = severity
        .map(str::parse::<Severity>)
        .transpose()
        .context("invalid --severity")?;
    let detected_at = detected_at
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|at| at.with_timezone(&Utc))
                .with_context(|| format!("invalid --detected-at {raw:?} (expected RFC 3339)"))
        })
        .transpose()?;

    let deadlines = compute_deadlines(detected_at, severity, Utc::now());

    println!("detected:                {}", deadlines.detected_at.to_rfc3339());
    println!("DPB deadline:            {}", deadlines.dpb.to_rfc3339());
    println!(
        "data principal deadline: {}",
        deadlines.data_principal.to_rfc3339()
    );
    Ok(())
}
