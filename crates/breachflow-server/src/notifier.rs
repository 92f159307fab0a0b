//! Outbound transport used by the standalone server.
//!
//! Delivery to a real mail gateway lives outside this service. The server
//! writes each message to the log so operators can pick it up.

use breachflow_workflow::{Notifier, SendError};
use tracing::info;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SendError> {
        if !to.contains('@') {
            return Err(SendError::Rejected(format!("{to:?} is not an email address")));
        }

        info!(
            recipient = to,
            subject,
            body_bytes = body.len(),
            "notification dispatched"
        );
        Ok(())
    }
}
