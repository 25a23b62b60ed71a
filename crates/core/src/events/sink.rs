//! Submission sink trait and implementations.

use std::sync::{Arc, Mutex};

use super::BroadcastMessage;

/// Receiver of broadcast messages built by the [`super::Publisher`].
///
/// # Design Rules
///
/// - `publish()` must return without waiting on any consumer
/// - There is no acknowledgment; delivery is best-effort
pub trait SubmissionSink: Send + Sync {
    fn publish(&self, message: BroadcastMessage);
}

/// Mock sink for testing - collects published messages.
#[derive(Clone, Default)]
pub struct MockSubmissionSink {
    messages: Arc<Mutex<Vec<BroadcastMessage>>>,
}

impl MockSubmissionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected messages.
    pub fn messages(&self) -> Vec<BroadcastMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

impl SubmissionSink for MockSubmissionSink {
    fn publish(&self, message: BroadcastMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }
}
