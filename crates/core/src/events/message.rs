//! Broadcast message type.

use std::sync::Arc;

use serde::Serialize;

use crate::constants::SUBMISSION_EVENT;
use crate::errors::Result;
use crate::leads::Lead;

/// Wire shape of a broadcast lead. Latency fields are intentionally absent:
/// they are measured by the receivers of this message.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionPayload<'a> {
    id: i64,
    name: &'a str,
    email: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_submit_at: Option<i64>,
    server_broadcast_at: i64,
}

/// Immutable, already-serialized snapshot of a lead.
///
/// Cloning shares the serialized body, so fanning out to many subscribers
/// does not re-serialize. Later latency updates to the stored lead never
/// reach a message that was already built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastMessage {
    lead_id: i64,
    server_broadcast_at: i64,
    data: Arc<str>,
}

impl BroadcastMessage {
    pub fn from_lead(lead: &Lead, server_broadcast_at: i64) -> Result<Self> {
        let payload = SubmissionPayload {
            id: lead.id,
            name: &lead.name,
            email: &lead.email,
            message: &lead.message,
            client_submit_at: lead.client_submit_at,
            server_broadcast_at,
        };
        let data = serde_json::to_string(&payload)?;
        Ok(Self {
            lead_id: lead.id,
            server_broadcast_at,
            data: Arc::from(data),
        })
    }

    pub fn event_name(&self) -> &'static str {
        SUBMISSION_EVENT
    }

    pub fn lead_id(&self) -> i64 {
        self.lead_id
    }

    pub fn server_broadcast_at(&self) -> i64 {
        self.server_broadcast_at
    }

    /// Serialized JSON body.
    pub fn data(&self) -> &str {
        &self.data
    }
}
