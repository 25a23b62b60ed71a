use std::sync::Arc;

use chrono::Utc;

use super::{BroadcastMessage, SubmissionSink};
use crate::errors::Result;
use crate::leads::Lead;

/// Current server clock in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Builds broadcast messages for committed leads and hands them to a sink.
///
/// Must only be called after the lead's insert has committed, so every id
/// seen by a subscriber already exists in storage.
#[derive(Clone)]
pub struct Publisher {
    sink: Arc<dyn SubmissionSink>,
}

impl Publisher {
    pub fn new(sink: Arc<dyn SubmissionSink>) -> Self {
        Self { sink }
    }

    /// Captures the broadcast timestamp for a lead about to be published.
    pub fn broadcast_timestamp(&self) -> i64 {
        now_millis()
    }

    /// Snapshots `lead` and publishes it. Uses the lead's stamped broadcast
    /// time when present, the current clock otherwise.
    pub fn publish(&self, lead: &Lead) -> Result<BroadcastMessage> {
        let broadcast_at = lead.server_broadcast_at.unwrap_or_else(now_millis);
        let message = BroadcastMessage::from_lead(lead, broadcast_at)?;
        self.sink.publish(message.clone());
        Ok(message)
    }
}
